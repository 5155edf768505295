//! Browser engines and the polling wait layer built on top of them
//!
//! Automation code never talks to a concrete browser. It goes through the
//! [`BrowserEngine`] trait, wrapped by a [`Driver`] that hands out
//! [`Locator`]s with bounded, polling waits.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::Timeouts;
use crate::errors::AutomationError;
use crate::selector::Selector;

pub mod chrome;
mod locator;

pub use chrome::ChromeEngine;
pub use locator::Locator;

/// Snapshot of an element's state at probe time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
pub struct ElementState {
    /// Attached to the document
    pub present: bool,
    /// Rendered with a non-empty box and not hidden by style
    pub visible: bool,
    /// Not disabled
    pub enabled: bool,
}

impl ElementState {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn clickable(&self) -> bool {
        self.present && self.visible && self.enabled
    }
}

/// Keys the workflow needs to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Tab,
}

impl Key {
    pub fn name(&self) -> &'static str {
        match self {
            Key::Enter => "Enter",
            Key::Tab => "Tab",
        }
    }
}

/// The common trait that all browser engines must implement
///
/// Element operations resolve the selector at call time; they do not wait.
/// A missing element yields [`AutomationError::ElementNotFound`] and a node
/// that was re-rendered underneath the call yields
/// [`AutomationError::StaleElement`].
#[async_trait::async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Navigate the tab to a URL
    async fn goto(&self, url: &str) -> Result<(), AutomationError>;

    /// URL of the current document
    async fn current_url(&self) -> Result<String, AutomationError>;

    /// Presence, visibility and enablement of the first match
    async fn probe(&self, selector: &Selector) -> Result<ElementState, AutomationError>;

    async fn click(&self, selector: &Selector) -> Result<(), AutomationError>;

    /// Empty an input's value
    async fn clear(&self, selector: &Selector) -> Result<(), AutomationError>;

    /// Type text into an input, appending to its current value
    async fn type_text(&self, selector: &Selector, text: &str) -> Result<(), AutomationError>;

    async fn press_key(&self, selector: &Selector, key: Key) -> Result<(), AutomationError>;

    /// Rendered text content
    async fn text(&self, selector: &Selector) -> Result<String, AutomationError>;

    /// Form value (`value` property, falling back to the attribute)
    async fn value(&self, selector: &Selector) -> Result<String, AutomationError>;

    /// Select the `<option>` whose trimmed text equals `option_text`
    async fn select_option(
        &self,
        selector: &Selector,
        option_text: &str,
    ) -> Result<(), AutomationError>;

    async fn scroll_into_view(&self, selector: &Selector) -> Result<(), AutomationError>;

    /// PNG bytes of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError>;

    /// Tear the browser down. Must be safe to call more than once.
    async fn close(&self) -> Result<(), AutomationError>;
}

/// The entry point for page interaction
#[derive(Clone)]
pub struct Driver {
    engine: Arc<dyn BrowserEngine>,
    timeouts: Timeouts,
}

impl Driver {
    pub fn new(engine: Arc<dyn BrowserEngine>, timeouts: Timeouts) -> Self {
        Self { engine, timeouts }
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    #[instrument(level = "debug", skip(self, selector))]
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(
            self.engine.clone(),
            selector.into(),
            self.timeouts.default_wait,
            self.timeouts.poll_interval,
        )
    }

    pub async fn goto(&self, url: &str) -> Result<(), AutomationError> {
        debug!("Navigating to {}", url);
        self.engine.goto(url).await
    }

    pub async fn current_url(&self) -> Result<String, AutomationError> {
        self.engine.current_url().await
    }

    /// Poll until the current URL contains `fragment`.
    pub async fn wait_for_url_contains(
        &self,
        fragment: &str,
        timeout: Duration,
    ) -> Result<String, AutomationError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let url = self.engine.current_url().await?;
            if url.contains(fragment) {
                return Ok(url);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "URL did not contain '{fragment}' within {timeout:?} (last: {url})"
                )));
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        self.engine.screenshot().await
    }

    pub async fn close(&self) -> Result<(), AutomationError> {
        self.engine.close().await
    }
}

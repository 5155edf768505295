use tracing::{debug, instrument};

use super::{BrowserEngine, ElementState, Key};
use crate::errors::AutomationError;
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A high-level handle for finding and interacting with one element
///
/// Every wait polls the engine until the condition holds or the timeout
/// elapses. If no timeout is passed, the locator's default is used.
#[derive(Clone)]
pub struct Locator {
    engine: Arc<dyn BrowserEngine>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
    poll_interval: Duration,
}

impl Locator {
    pub(crate) fn new(
        engine: Arc<dyn BrowserEngine>,
        selector: Selector,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            engine,
            selector,
            timeout,
            poll_interval,
        }
    }

    fn check_valid(&self) -> Result<(), AutomationError> {
        match &self.selector {
            Selector::Invalid(reason) => Err(AutomationError::InvalidSelector(reason.clone())),
            _ => Ok(()),
        }
    }

    /// Poll the element state until `condition` accepts it.
    async fn wait_until<F>(
        &self,
        timeout: Option<Duration>,
        what: &str,
        condition: F,
    ) -> Result<ElementState, AutomationError>
    where
        F: Fn(&ElementState) -> bool,
    {
        self.check_valid()?;
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + effective_timeout;
        loop {
            let state = match self.engine.probe(&self.selector).await {
                Ok(state) => state,
                // A node swapped out mid-probe is just "not there yet"
                Err(AutomationError::StaleElement(_)) => ElementState::absent(),
                Err(e) => return Err(e),
            };
            if condition(&state) {
                return Ok(state);
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for {} to be {what} (last state: {state:?})",
                    self.selector
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_present(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.wait_until(timeout, "present", |s| s.present)
            .await
            .map(|_| ())
    }

    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_visible(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.wait_until(timeout, "visible", |s| s.present && s.visible)
            .await
            .map(|_| ())
    }

    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_clickable(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.wait_until(timeout, "clickable", ElementState::clickable)
            .await
            .map(|_| ())
    }

    /// Wait until the element is absent or hidden.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_gone(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.wait_until(timeout, "gone", |s| !(s.present && s.visible))
            .await
            .map(|_| ())
    }

    /// Returns whether the element became visible within `timeout`, without
    /// treating absence as an error.
    pub async fn is_visible_within(&self, timeout: Duration) -> Result<bool, AutomationError> {
        match self.wait_visible(Some(timeout)).await {
            Ok(()) => Ok(true),
            Err(AutomationError::Timeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Poll until the element's text contains `expected`.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_text_contains(
        &self,
        expected: &str,
        timeout: Option<Duration>,
    ) -> Result<String, AutomationError> {
        self.check_valid()?;
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + effective_timeout;
        loop {
            let last = match self.engine.text(&self.selector).await {
                Ok(text) if text.contains(expected) => return Ok(text),
                Ok(text) => text,
                Err(e) if e.is_transient() => String::new(),
                Err(e) => return Err(e),
            };
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for {} to contain '{expected}' (last text: '{last}')",
                    self.selector
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait until clickable, then click.
    pub async fn click(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.wait_clickable(timeout).await?;
        debug!("Clicking {}", self.selector);
        self.engine.click(&self.selector).await
    }

    /// Wait until visible, clear, then type `text`.
    pub async fn fill(&self, text: &str, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.wait_visible(timeout).await?;
        self.engine.clear(&self.selector).await?;
        self.engine.type_text(&self.selector, text).await
    }

    pub async fn press(&self, key: Key) -> Result<(), AutomationError> {
        self.check_valid()?;
        self.engine.press_key(&self.selector, key).await
    }

    pub async fn text(&self) -> Result<String, AutomationError> {
        self.check_valid()?;
        self.engine.text(&self.selector).await
    }

    pub async fn value(&self) -> Result<String, AutomationError> {
        self.check_valid()?;
        self.engine.value(&self.selector).await
    }

    /// Wait until visible, then pick the option with matching text.
    pub async fn select_option(
        &self,
        option_text: &str,
        timeout: Option<Duration>,
    ) -> Result<(), AutomationError> {
        self.wait_visible(timeout).await?;
        self.engine.select_option(&self.selector, option_text).await
    }

    pub async fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.check_valid()?;
        self.engine.scroll_into_view(&self.selector).await
    }
}

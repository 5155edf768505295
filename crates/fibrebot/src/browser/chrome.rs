//! Chromium engine over the DevTools protocol
//!
//! Element lookups run as small in-page scripts so that every locator kind
//! (ids with dots, XPath, link text) resolves the same way. Input that the
//! application's key handlers need to see (typing, Enter, Tab) goes through
//! real CDP input events whenever the selector has a CSS form.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserEngine, ElementState, Key};
use crate::errors::AutomationError;
use crate::selector::Selector;

/// Launch options for the headless browser.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub executable: Option<std::path::PathBuf>,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            executable: None,
        }
    }
}

// Flags needed to run inside CI containers
const CHROME_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-web-security",
    "--disable-extensions",
    "--disable-default-apps",
];

pub struct ChromeEngine {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ChromeEngine {
    pub async fn launch(options: &ChromeOptions) -> Result<Self, AutomationError> {
        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .args(CHROME_ARGS.iter().copied());
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| AutomationError::Browser(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AutomationError::Browser(format!("failed to launch Chromium: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(map_cdp_error)?;

        info!("Chromium launched (headless: {})", options.headless);
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler: Mutex::new(Some(handler_task)),
        })
    }

    async fn eval<T: serde::de::DeserializeOwned>(
        &self,
        script: String,
    ) -> Result<T, AutomationError> {
        self.page
            .evaluate(script)
            .await
            .map_err(map_cdp_error)?
            .into_value::<T>()
            .map_err(|e| AutomationError::Browser(format!("unexpected script result: {e}")))
    }

    /// Run `body` against the resolved element `el`. The body returns
    /// `{ok: bool, value?: string, error?: string}`.
    async fn with_element(
        &self,
        selector: &Selector,
        body: &str,
    ) -> Result<Option<String>, AutomationError> {
        let result: ScriptOutcome = self.eval(element_script(selector, body)?).await?;
        if result.ok {
            return Ok(result.value);
        }
        let reason = result.error.unwrap_or_default();
        if reason == "not_found" {
            Err(AutomationError::ElementNotFound(selector.to_string()))
        } else {
            Err(AutomationError::Browser(format!("{selector}: {reason}")))
        }
    }

    async fn native_element(
        &self,
        selector: &Selector,
    ) -> Result<Option<chromiumoxide::Element>, AutomationError> {
        match selector.to_css() {
            Some(css) => match self.page.find_element(css).await {
                Ok(element) => Ok(Some(element)),
                Err(e) => Err(map_element_error(selector, e)),
            },
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    ok: bool,
    value: Option<String>,
    error: Option<String>,
}

/// Build an IIFE that resolves `selector` into `el` and runs `body`.
fn element_script(selector: &Selector, body: &str) -> Result<String, AutomationError> {
    let kind = selector
        .kind()
        .ok_or_else(|| AutomationError::InvalidSelector(selector.value().to_string()))?;
    let kind = serde_json::to_string(kind.as_str())?;
    let value = serde_json::to_string(selector.value())?;
    Ok(format!(
        r#"(() => {{
  const kind = {kind};
  const value = {value};
  let el = null;
  try {{
    if (kind === "id") el = document.getElementById(value);
    else if (kind === "css") el = document.querySelector(value);
    else if (kind === "xpath") el = document.evaluate(value, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    else if (kind === "link") el = Array.from(document.querySelectorAll("a")).find(a => (a.textContent || "").trim() === value) || null;
  }} catch (e) {{
    return {{ ok: false, error: "bad selector: " + e.message }};
  }}
  if (!el) return {{ ok: false, error: "not_found" }};
  {body}
}})()"#
    ))
}

const PROBE_BODY: &str = r#"
  const style = window.getComputedStyle(el);
  const rect = el.getBoundingClientRect();
  const visible = style.visibility !== "hidden" && style.display !== "none" && rect.width > 0 && rect.height > 0;
  return { ok: true, value: JSON.stringify({ present: true, visible: visible, enabled: !el.disabled }) };
"#;

const CLICK_BODY: &str = r#"
  el.scrollIntoView({ block: "center" });
  el.click();
  return { ok: true };
"#;

const CLEAR_BODY: &str = r#"
  el.value = "";
  el.dispatchEvent(new Event("input", { bubbles: true }));
  return { ok: true };
"#;

const TEXT_BODY: &str = r#"
  return { ok: true, value: (el.innerText !== undefined ? el.innerText : el.textContent) || "" };
"#;

const VALUE_BODY: &str = r#"
  const v = (el.value !== undefined && el.value !== null) ? el.value : el.getAttribute("value");
  return { ok: true, value: v || "" };
"#;

const SCROLL_BODY: &str = r#"
  el.scrollIntoView(true);
  return { ok: true };
"#;

fn type_body(text: &str) -> Result<String, AutomationError> {
    let text = serde_json::to_string(text)?;
    Ok(format!(
        r#"
  el.focus();
  el.value = (el.value || "") + {text};
  el.dispatchEvent(new Event("input", {{ bubbles: true }}));
  el.dispatchEvent(new Event("change", {{ bubbles: true }}));
  return {{ ok: true }};
"#
    ))
}

fn select_body(option_text: &str) -> Result<String, AutomationError> {
    let option_text = serde_json::to_string(option_text)?;
    Ok(format!(
        r#"
  const wanted = {option_text};
  const opt = Array.from(el.options || []).find(o => (o.text || "").trim() === wanted);
  if (!opt) return {{ ok: false, error: "no option '" + wanted + "'" }};
  el.value = opt.value;
  opt.selected = true;
  el.dispatchEvent(new Event("change", {{ bubbles: true }}));
  return {{ ok: true, value: opt.value }};
"#
    ))
}

fn key_body(key: Key) -> String {
    let (name, code) = match key {
        Key::Enter => ("Enter", 13),
        Key::Tab => ("Tab", 9),
    };
    format!(
        r#"
  el.focus();
  for (const type of ["keydown", "keypress", "keyup"]) {{
    el.dispatchEvent(new KeyboardEvent(type, {{ key: "{name}", keyCode: {code}, which: {code}, bubbles: true }}));
  }}
  if ("{name}" === "Tab") el.blur();
  return {{ ok: true }};
"#
    )
}

fn map_cdp_error(err: CdpError) -> AutomationError {
    AutomationError::Browser(err.to_string())
}

fn map_element_error(selector: &Selector, err: CdpError) -> AutomationError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("no node") || lower.contains("could not find node") {
        AutomationError::ElementNotFound(format!("{selector}: {msg}"))
    } else if lower.contains("not attached") || lower.contains("detached") {
        AutomationError::StaleElement(format!("{selector}: {msg}"))
    } else {
        AutomationError::Browser(format!("{selector}: {msg}"))
    }
}

#[async_trait]
impl BrowserEngine for ChromeEngine {
    async fn goto(&self, url: &str) -> Result<(), AutomationError> {
        self.page.goto(url).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(map_cdp_error)?
            .unwrap_or_default())
    }

    async fn probe(&self, selector: &Selector) -> Result<ElementState, AutomationError> {
        match self.with_element(selector, PROBE_BODY).await {
            Ok(Some(json)) => serde_json::from_str(&json)
                .map_err(|e| AutomationError::Browser(format!("bad probe result: {e}"))),
            Ok(None) => Ok(ElementState::absent()),
            Err(AutomationError::ElementNotFound(_)) => Ok(ElementState::absent()),
            Err(e) => Err(e),
        }
    }

    async fn click(&self, selector: &Selector) -> Result<(), AutomationError> {
        if let Some(element) = self.native_element(selector).await? {
            element
                .click()
                .await
                .map_err(|e| map_element_error(selector, e))?;
            return Ok(());
        }
        self.with_element(selector, CLICK_BODY).await.map(|_| ())
    }

    async fn clear(&self, selector: &Selector) -> Result<(), AutomationError> {
        self.with_element(selector, CLEAR_BODY).await.map(|_| ())
    }

    async fn type_text(&self, selector: &Selector, text: &str) -> Result<(), AutomationError> {
        if let Some(element) = self.native_element(selector).await? {
            element
                .click()
                .await
                .map_err(|e| map_element_error(selector, e))?
                .type_str(text)
                .await
                .map_err(|e| map_element_error(selector, e))?;
            return Ok(());
        }
        self.with_element(selector, &type_body(text)?)
            .await
            .map(|_| ())
    }

    async fn press_key(&self, selector: &Selector, key: Key) -> Result<(), AutomationError> {
        if let Some(element) = self.native_element(selector).await? {
            element
                .press_key(key.name())
                .await
                .map_err(|e| map_element_error(selector, e))?;
            return Ok(());
        }
        self.with_element(selector, &key_body(key)).await.map(|_| ())
    }

    async fn text(&self, selector: &Selector) -> Result<String, AutomationError> {
        Ok(self
            .with_element(selector, TEXT_BODY)
            .await?
            .unwrap_or_default())
    }

    async fn value(&self, selector: &Selector) -> Result<String, AutomationError> {
        Ok(self
            .with_element(selector, VALUE_BODY)
            .await?
            .unwrap_or_default())
    }

    async fn select_option(
        &self,
        selector: &Selector,
        option_text: &str,
    ) -> Result<(), AutomationError> {
        self.with_element(selector, &select_body(option_text)?)
            .await
            .map(|_| ())
    }

    async fn scroll_into_view(&self, selector: &Selector) -> Result<(), AutomationError> {
        self.with_element(selector, SCROLL_BODY).await.map(|_| ())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(map_cdp_error)
    }

    async fn close(&self) -> Result<(), AutomationError> {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if let Err(e) = browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("Waiting for browser exit failed: {}", e);
            }
            info!("Browser closed");
        }
        if let Some(handle) = self.handler.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

//! Login and navigation from the landing page to one sample's record
//!
//! Every step fails closed: an `Err` means the browser is somewhere
//! unknown and the invocation should stop using it.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::browser::{Driver, Key};
use crate::config::AutomationConfig;
use crate::diagnostics::Screenshots;
use crate::dom;
use crate::errors::AutomationError;
use crate::retry::RetryPolicy;

static DIGIT_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Whether the echoed project field names `project`. The application
/// renders it as `<prefix>-<number>`.
pub fn echo_matches(echo: &str, project: u64) -> bool {
    echo.rsplit('-')
        .next()
        .map(|last| last.trim() == project.to_string())
        .unwrap_or(false)
}

/// Whether `text` carries `sample` as a whole number, so that sample 1 is
/// not found inside "Sample 12".
pub fn contains_sample_number(text: &str, sample: u32) -> bool {
    DIGIT_RUNS
        .find_iter(text)
        .any(|m| m.as_str().parse::<u32>().ok() == Some(sample))
}

/// Parse the record counter. Anything but plain digits is a counting error.
pub fn parse_record_count(text: &str) -> Option<usize> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

/// A logged-in walk through the lab module.
pub struct LabSession<'a> {
    driver: &'a Driver,
    config: &'a AutomationConfig,
    screenshots: &'a Screenshots,
}

impl<'a> LabSession<'a> {
    pub fn new(
        driver: &'a Driver,
        config: &'a AutomationConfig,
        screenshots: &'a Screenshots,
    ) -> Self {
        Self {
            driver,
            config,
            screenshots,
        }
    }

    #[instrument(skip(self), fields(user = %self.config.username))]
    pub async fn login(&self) -> Result<(), AutomationError> {
        let t = self.driver.timeouts();
        self.driver.goto(&self.config.base_url).await?;

        let username = self.driver.locator(dom::LOGIN_USERNAME);
        let password = self.driver.locator(dom::LOGIN_PASSWORD);
        let submit = self.driver.locator(dom::LOGIN_SUBMIT);

        username.wait_visible(Some(t.default_wait)).await?;
        password.wait_visible(Some(t.default_wait)).await?;
        submit.wait_clickable(Some(t.default_wait)).await?;

        username.fill(&self.config.username, None).await?;
        password.fill(&self.config.password, None).await?;
        submit.click(None).await?;

        match self
            .driver
            .wait_for_url_contains(dom::POST_LOGIN_URL_FRAGMENT, t.login_redirect)
            .await
        {
            Ok(url) => {
                info!("Logged in, landed on {}", url);
                self.screenshots.capture(self.driver, "after_login").await;
                Ok(())
            }
            Err(e) => {
                warn!("Login did not reach the main menu: {}", e);
                self.screenshots.capture(self.driver, "login_failed").await;
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn open_lab_project_list(&self) -> Result<(), AutomationError> {
        let t = self.driver.timeouts();
        self.driver
            .locator(dom::LAB_BUTTON)
            .click(Some(t.default_wait))
            .await?;
        self.wait_for_idle().await;
        self.driver
            .locator(dom::LAB_PROJECT_LIST_BUTTON)
            .click(Some(t.default_wait))
            .await?;
        self.wait_for_idle().await;
        info!("Lab Project List open");
        Ok(())
    }

    /// Wait for the UI lock overlay to clear. Best effort: a lingering
    /// overlay shows up as a failure of whatever comes next.
    pub async fn wait_for_idle(&self) {
        let overlay_clear = self.driver.timeouts().overlay_clear;
        if let Err(e) = self
            .driver
            .locator(dom::UI_LOCK_OVERLAY)
            .wait_gone(Some(overlay_clear))
            .await
        {
            warn!("UI lock overlay still present: {}", e);
        }
    }

    /// Search for `project`, returning the echoed project field.
    #[instrument(skip(self))]
    pub async fn search_project(&self, project: u64) -> Result<String, AutomationError> {
        let policy = RetryPolicy::search(self.driver.timeouts().search_retry_base);
        let echo = policy
            .run("project search", AutomationError::is_transient, |attempt| {
                self.search_once(project, attempt)
            })
            .await?;
        info!("Project search echoed '{}'", echo.trim());
        Ok(echo)
    }

    async fn search_once(&self, project: u64, attempt: u32) -> Result<String, AutomationError> {
        let t = self.driver.timeouts();
        let wanted = project.to_string();
        debug!("Searching for project {} (attempt {})", project, attempt);

        self.wait_for_idle().await;
        if let Err(e) = self
            .driver
            .locator(dom::CLEAR_SEARCH_LINK)
            .click(Some(t.popup_probe))
            .await
        {
            debug!("No search criteria to clear: {}", e);
        } else {
            self.wait_for_idle().await;
        }

        let input = self.driver.locator(dom::PROJECT_SEARCH_INPUT);
        input.fill(&wanted, Some(t.default_wait)).await?;
        self.driver
            .locator(dom::PROJECT_SEARCH_BUTTON)
            .click(Some(t.default_wait))
            .await?;

        let echo = self.driver.locator(dom::PROJECT_ECHO);
        match echo.wait_text_contains(&wanted, Some(t.search_echo)).await {
            Ok(text) => Ok(text),
            Err(AutomationError::Timeout(_)) => {
                debug!("Search button gave no result, pressing Enter instead");
                input.press(Key::Enter).await?;
                echo.wait_text_contains(&wanted, Some(t.search_echo)).await
            }
            Err(e) => Err(e),
        }
    }

    pub fn verify_project_echo(&self, echo: &str, project: u64) -> Result<(), AutomationError> {
        if echo_matches(echo, project) {
            info!("Project number verified: {}", project);
            Ok(())
        } else {
            Err(AutomationError::VerificationFailed(format!(
                "searched for project {project} but the list shows '{}'",
                echo.trim()
            )))
        }
    }

    #[instrument(skip(self))]
    pub async fn open_fibre_analysis(&self) -> Result<(), AutomationError> {
        let t = self.driver.timeouts();
        let button = self.driver.locator(dom::VIEW_FIBRE_ANALYSIS_BUTTON);
        button.wait_visible(Some(t.fibre_button)).await?;
        button.scroll_into_view().await?;
        button.click(Some(t.fibre_button)).await?;

        let loader = self.driver.locator(dom::CREATING_RECORDS_INDICATOR);
        loader.wait_visible(Some(t.loader_appear)).await?;
        debug!("Records are being created");
        loader.wait_gone(Some(t.loader_disappear)).await?;
        self.wait_for_idle().await;

        info!("Fibre analysis records open");
        self.screenshots
            .capture(self.driver, "fibre_analysis_open")
            .await;
        Ok(())
    }

    /// Number of records the application created for the open project.
    pub async fn record_count(&self) -> Result<usize, AutomationError> {
        let counter = self.driver.locator(dom::RECORD_COUNT);
        counter
            .wait_present(Some(self.driver.timeouts().record_count))
            .await?;
        let text = counter.text().await?;
        parse_record_count(&text).ok_or_else(|| {
            AutomationError::VerificationFailed(format!(
                "record count is not a number: '{}'",
                text.trim()
            ))
        })
    }

    /// Compare the application's record count with the sheet's.
    #[instrument(skip(self))]
    pub async fn verify_sample_count(
        &self,
        project: u64,
        expected: usize,
    ) -> Result<(), AutomationError> {
        let actual = self
            .record_count()
            .await
            .map_err(|e| AutomationError::SampleCountMismatch {
                project,
                reason: format!("error counting samples on website: {e}"),
            })?;
        if actual == expected {
            info!("Sample counts match: {}", actual);
            Ok(())
        } else {
            Err(AutomationError::SampleCountMismatch {
                project,
                reason: format!("spreadsheet has {expected}, website has {actual}"),
            })
        }
    }

    /// Step from the first record to `sample` with the Next control and
    /// check that the record shown is the right one.
    #[instrument(skip(self))]
    pub async fn goto_sample(&self, sample: u32) -> Result<(), AutomationError> {
        let t = self.driver.timeouts();
        let next = self.driver.locator(dom::NEXT_RECORD);
        for step in 1..sample {
            next.click(Some(t.default_wait)).await.map_err(|e| {
                AutomationError::ElementNotFound(format!(
                    "Next click {step} of {} failed: {e}",
                    sample - 1
                ))
            })?;
            self.wait_for_idle().await;
        }
        self.verify_open_sample(sample, t.default_wait).await?;
        info!("On sample {}", sample);
        Ok(())
    }

    async fn verify_open_sample(&self, sample: u32, timeout: Duration) -> Result<(), AutomationError> {
        let poll = self.driver.timeouts().poll_interval;
        let deadline = Instant::now() + timeout;
        let mut seen = Vec::new();
        loop {
            seen.clear();
            for candidate in dom::SAMPLE_ID_CANDIDATES {
                match self.driver.locator(*candidate).text().await {
                    Ok(text) if contains_sample_number(&text, sample) => {
                        debug!("{} shows '{}'", candidate, text.trim());
                        return Ok(());
                    }
                    Ok(text) => seen.push(text.trim().to_string()),
                    Err(e) if e.is_transient() => {}
                    Err(e) => return Err(e),
                }
            }
            if Instant::now() >= deadline {
                self.screenshots
                    .capture(self.driver, &format!("wrong_sample_{sample}"))
                    .await;
                return Err(AutomationError::VerificationFailed(format!(
                    "expected sample {sample} to be open, record shows {seen:?}"
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }
}

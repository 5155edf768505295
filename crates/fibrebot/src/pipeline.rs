//! The fixed edit sequence applied to one open fibre analysis record
//!
//! Stages run strictly in order. The first failing stage ends the record
//! without saving; the caller records the failure and moves on.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Local, Utc};
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::actions::{ActionKind, ActionTables, Branch, UiAction, ACTION_TABLE_VERSION};
use crate::browser::{Driver, Key};
use crate::clock::Clock;
use crate::config::AutomationConfig;
use crate::dataset::WorkItem;
use crate::diagnostics::Screenshots;
use crate::dom;
use crate::errors::AutomationError;
use crate::guard::StepInterceptor;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStage {
    NotStarted,
    SizeSet,
    TimesSet,
    AssessmentCopied,
    AnalysisTabOpen,
    CategoryHandled,
    Saved,
    Failed(String),
}

impl fmt::Display for RecordStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStage::NotStarted => f.write_str("not started"),
            RecordStage::SizeSet => f.write_str("sample size set"),
            RecordStage::TimesSet => f.write_str("times set"),
            RecordStage::AssessmentCopied => f.write_str("assessment copied"),
            RecordStage::AnalysisTabOpen => f.write_str("analysis tab open"),
            RecordStage::CategoryHandled => f.write_str("category handled"),
            RecordStage::Saved => f.write_str("saved"),
            RecordStage::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// How one record went.
#[derive(Debug)]
pub struct RecordOutcome {
    /// Last stage completed
    pub reached: RecordStage,
    pub result: Result<(), AutomationError>,
    /// Branch actions that kept failing and were passed over
    pub skipped_actions: Vec<String>,
}

impl RecordOutcome {
    pub fn is_saved(&self) -> bool {
        self.result.is_ok() && self.reached == RecordStage::Saved
    }

    /// `Saved`, or `Failed` with the reason.
    pub fn stage(&self) -> RecordStage {
        match &self.result {
            Ok(()) => self.reached.clone(),
            Err(e) => RecordStage::Failed(self.failure_reason(e)),
        }
    }

    fn failure_reason(&self, error: &AutomationError) -> String {
        format!("{error} (after: {})", self.reached)
    }

    /// Reason to store for a failed record.
    pub fn reason(&self) -> Option<String> {
        self.result.as_ref().err().map(|e| self.failure_reason(e))
    }
}

/// Format a timestamp for the record's time fields, in local time.
pub fn format_field_time(at: DateTime<Utc>, format: &str) -> String {
    at.with_timezone(&Local).format(format).to_string()
}

pub struct RecordPipeline<'a> {
    driver: &'a Driver,
    config: &'a AutomationConfig,
    tables: &'a ActionTables,
    clock: &'a dyn Clock,
    interceptor: &'a dyn StepInterceptor,
    screenshots: &'a Screenshots,
}

impl<'a> RecordPipeline<'a> {
    pub fn new(
        driver: &'a Driver,
        config: &'a AutomationConfig,
        tables: &'a ActionTables,
        clock: &'a dyn Clock,
        interceptor: &'a dyn StepInterceptor,
        screenshots: &'a Screenshots,
    ) -> Self {
        Self {
            driver,
            config,
            tables,
            clock,
            interceptor,
            screenshots,
        }
    }

    #[instrument(skip(self, item, rng), fields(project = item.project_number, sample = item.sample_number))]
    pub async fn run<R: Rng + Send>(&self, item: &WorkItem, rng: &mut R) -> RecordOutcome {
        let mut outcome = RecordOutcome {
            reached: RecordStage::NotStarted,
            result: Ok(()),
            skipped_actions: Vec::new(),
        };
        if let Err(e) = self.run_stages(item, rng, &mut outcome).await {
            warn!(
                "Record for sample {} failed after '{}': {}",
                item.sample_number, outcome.reached, e
            );
            self.screenshots
                .capture(
                    self.driver,
                    &format!("error_p{}_s{}", item.project_number, item.sample_number),
                )
                .await;
            outcome.result = Err(e);
        }
        outcome
    }

    async fn run_stages<R: Rng + Send>(
        &self,
        item: &WorkItem,
        rng: &mut R,
        outcome: &mut RecordOutcome,
    ) -> Result<(), AutomationError> {
        // Resolved first so an unclassifiable sample leaves the record untouched
        let branch = Branch::for_category(&item.analysis_category)?;

        self.guarded("sample size", self.set_sample_size()).await?;
        outcome.reached = RecordStage::SizeSet;

        let jitter = if self.config.start_jitter_secs > 0 {
            rng.gen_range(-self.config.start_jitter_secs..=self.config.start_jitter_secs)
        } else {
            0
        };
        self.guarded("start time", self.set_start_time(jitter)).await?;
        self.set_end_time().await?;
        outcome.reached = RecordStage::TimesSet;

        self.guarded("lab assessment", self.copy_assessment()).await?;
        outcome.reached = RecordStage::AssessmentCopied;

        self.guarded("analysis tab", self.open_analysis_tab()).await?;
        outcome.reached = RecordStage::AnalysisTabOpen;

        let mut skipped = Vec::new();
        self.guarded("category actions", self.replay_branch(branch, &mut skipped))
            .await?;
        outcome.skipped_actions = skipped;
        outcome.reached = RecordStage::CategoryHandled;

        self.save().await?;
        outcome.reached = RecordStage::Saved;
        info!(
            "Sample {} of project {} saved",
            item.sample_number, item.project_number
        );
        Ok(())
    }

    async fn guarded<F>(&self, step: &str, fut: F) -> Result<(), AutomationError>
    where
        F: Future<Output = Result<(), AutomationError>>,
    {
        let outcome = fut.await;
        self.interceptor.after_step(self.driver, step, outcome).await
    }

    /// Fill a text field and leave it so the application commits the value.
    async fn fill_and_commit(&self, selector: &str, text: &str) -> Result<(), AutomationError> {
        let field = self.driver.locator(selector);
        field.fill(text, None).await?;
        field.press(Key::Tab).await
    }

    async fn set_sample_size(&self) -> Result<(), AutomationError> {
        let wanted = self.config.sample_size_value.as_str();
        let policy = RetryPolicy::new(2, self.driver.timeouts().click_retry_delay, 1.0);
        policy
            .run("sample size", |_| true, |_| async move {
                self.fill_and_commit(dom::SAMPLE_SIZE_FIELD, wanted).await?;
                let echoed = self.driver.locator(dom::SAMPLE_SIZE_FIELD).value().await?;
                if echoed.trim().eq_ignore_ascii_case(wanted) {
                    debug!("Sample size set to '{}'", echoed.trim());
                    Ok(())
                } else {
                    Err(AutomationError::VerificationFailed(format!(
                        "sample size shows '{}' instead of '{wanted}'",
                        echoed.trim()
                    )))
                }
            })
            .await
    }

    async fn set_start_time(&self, jitter_secs: i64) -> Result<(), AutomationError> {
        let start =
            self.clock.now() - self.config.analysis_lead + chrono::Duration::seconds(jitter_secs);
        let text = format_field_time(start, &self.config.timestamp_format);
        debug!("Start time {} (jitter {}s)", text, jitter_secs);
        self.fill_and_commit(dom::START_TIME_FIELD, &text).await
    }

    async fn set_end_time(&self) -> Result<(), AutomationError> {
        let text = format_field_time(self.clock.now(), &self.config.timestamp_format);
        debug!("End time {}", text);
        self.fill_and_commit(dom::END_TIME_FIELD, &text).await
    }

    async fn copy_assessment(&self) -> Result<(), AutomationError> {
        let source = self.driver.locator(dom::SURVEYOR_ASSESSMENT_FIELD);
        source.wait_visible(None).await?;
        let mut assessment = source.text().await?;
        if assessment.trim().is_empty() {
            assessment = source.value().await?;
        }
        let assessment = assessment.trim();
        if assessment.is_empty() {
            return Err(AutomationError::VerificationFailed(
                "surveyor assessment is empty".to_string(),
            ));
        }
        self.driver
            .locator(dom::LAB_ASSESSMENT_SELECT)
            .select_option(assessment, None)
            .await?;
        debug!("Lab assessment set to '{}'", assessment);
        Ok(())
    }

    async fn open_analysis_tab(&self) -> Result<(), AutomationError> {
        self.driver.locator(dom::ANALYSIS_TAB).click(None).await?;
        self.driver
            .locator(dom::ANALYSIS_TAB_BODY)
            .wait_visible(None)
            .await
    }

    /// Replay the branch. Actions that keep failing are logged, collected
    /// in `skipped` and passed over.
    async fn replay_branch(
        &self,
        branch: Branch,
        skipped: &mut Vec<String>,
    ) -> Result<(), AutomationError> {
        let actions = self.tables.branch(branch);
        info!(
            "Replaying {} branch: {} actions (tables v{})",
            branch,
            actions.len(),
            ACTION_TABLE_VERSION
        );
        let policy = RetryPolicy::click(self.driver.timeouts().click_retry_delay);
        for (i, action) in actions.iter().enumerate() {
            let label = format!("{branch} action {}", i + 1);
            let result = policy
                .run(&label, AutomationError::is_transient, |_| self.perform(action))
                .await;
            match result {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!("Skipping {} ({}): {}", label, action, e);
                    skipped.push(format!("{label}: {action}"));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn perform(&self, action: &UiAction) -> Result<(), AutomationError> {
        let locator = self.driver.locator(action.selector.clone());
        match &action.kind {
            ActionKind::Click => locator.click(None).await,
            ActionKind::Select(option) => locator.select_option(option, None).await,
        }
    }

    async fn save(&self) -> Result<(), AutomationError> {
        let t = self.driver.timeouts();
        self.driver.locator(dom::SAVE_RECORD).click(None).await?;
        self.driver
            .locator(dom::UI_LOCK_OVERLAY)
            .wait_gone(Some(t.save_idle))
            .await?;
        self.screenshots.capture(self.driver, "record_saved").await;
        Ok(())
    }
}

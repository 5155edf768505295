//! One invocation end to end
//!
//! Gate on the scheduler, pick the next sample, drive the browser to it,
//! apply the record edits and fold the outcome back into the run state.
//! The state is written and the browser closed whichever way this goes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::actions::{ActionTables, ACTION_TABLE_VERSION};
use crate::browser::chrome::ChromeOptions;
use crate::browser::{BrowserEngine, ChromeEngine, Driver};
use crate::clock::{Clock, SystemClock};
use crate::config::AutomationConfig;
use crate::dataset::{DataSource, WorkItem};
use crate::diagnostics::Screenshots;
use crate::errors::AutomationError;
use crate::guard::{PopupGuard, StepInterceptor};
use crate::pipeline::RecordPipeline;
use crate::scheduler::should_process_now;
use crate::session::LabSession;
use crate::state::{RunState, StateSession, StateStore};
use crate::work::{advance, next_work_item};

/// Starts a browser for one invocation.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(
        &self,
        config: &AutomationConfig,
    ) -> Result<Arc<dyn BrowserEngine>, AutomationError>;
}

/// Launches a local Chromium.
#[derive(Debug, Default, Clone)]
pub struct ChromeLauncher {
    pub executable: Option<std::path::PathBuf>,
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(
        &self,
        config: &AutomationConfig,
    ) -> Result<Arc<dyn BrowserEngine>, AutomationError> {
        let options = ChromeOptions {
            headless: config.headless,
            executable: self.executable.clone(),
            ..Default::default()
        };
        let engine = ChromeEngine::launch(&options).await?;
        Ok(Arc::new(engine))
    }
}

/// What an invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationReport {
    /// Not due yet
    Skipped,
    /// No unfinished project left
    AllComplete,
    Processed { project: u64, sample: u32 },
    /// The record was reached but not saved; the cursor moved on
    RecordFailed {
        project: u64,
        sample: u32,
        reason: String,
    },
    /// The project was abandoned (count mismatch, wrong search result)
    ProjectSkipped { project: u64, reason: String },
    /// Navigation broke before the project view opened; the same sample is
    /// tried again
    Aborted {
        project: u64,
        sample: u32,
        reason: String,
    },
}

impl fmt::Display for InvocationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationReport::Skipped => f.write_str("not due yet, skipped"),
            InvocationReport::AllComplete => f.write_str("all projects complete"),
            InvocationReport::Processed { project, sample } => {
                write!(f, "processed project {project} sample {sample}")
            }
            InvocationReport::RecordFailed {
                project,
                sample,
                reason,
            } => write!(f, "project {project} sample {sample} failed: {reason}"),
            InvocationReport::ProjectSkipped { project, reason } => {
                write!(f, "project {project} skipped: {reason}")
            }
            InvocationReport::Aborted {
                project,
                sample,
                reason,
            } => write!(
                f,
                "aborted before reaching project {project} sample {sample}: {reason}"
            ),
        }
    }
}

pub struct Invocation {
    config: AutomationConfig,
    store: Arc<dyn StateStore>,
    source: Arc<dyn DataSource>,
    launcher: Arc<dyn BrowserLauncher>,
    clock: Arc<dyn Clock>,
    interceptor: Arc<dyn StepInterceptor>,
    force: bool,
    seed: Option<u64>,
}

impl Invocation {
    pub fn new(
        config: AutomationConfig,
        store: Arc<dyn StateStore>,
        source: Arc<dyn DataSource>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            config,
            store,
            source,
            launcher,
            clock: Arc::new(SystemClock),
            interceptor: Arc::new(PopupGuard),
            force: false,
            seed: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn StepInterceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }

    /// Ignore the scheduler and do work now.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Fix the random source (interval draws, start time jitter).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub async fn run(&self) -> Result<InvocationReport, AutomationError> {
        let run_id = Uuid::new_v4();
        self.run_inner()
            .instrument(info_span!("invocation", %run_id))
            .await
    }

    async fn run_inner(&self) -> Result<InvocationReport, AutomationError> {
        let tables = ActionTables::load()?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut state = StateSession::open(self.store.clone())?;

        let due = should_process_now(&mut state, self.clock.now(), &mut rng);
        if !due {
            if self.force {
                info!("Not due yet, running anyway (forced)");
            } else {
                state.flush()?;
                return Ok(InvocationReport::Skipped);
            }
        }

        let dataset = self.source.fetch().await?;
        let Some(item) = next_work_item(&dataset, &mut state) else {
            info!("No work left");
            state.flush()?;
            return Ok(InvocationReport::AllComplete);
        };
        let expected = dataset.sample_count(item.project_number);
        info!(
            "Processing project {} sample {} ({}), {}/{} in project, action tables v{}",
            item.project_number,
            item.sample_number,
            item.analysis_category,
            state.current_sample_index + 1,
            expected,
            ACTION_TABLE_VERSION
        );

        let engine = self.launcher.launch(&self.config).await?;
        let driver = Driver::new(engine, self.config.timeouts.clone());
        let report = self
            .process(&driver, &tables, &item, expected, &mut state, &mut rng)
            .await;
        if let Err(e) = driver.close().await {
            warn!("Failed to close browser: {}", e);
        }

        state.flush()?;
        info!("Invocation finished: {}", report);
        Ok(report)
    }

    async fn process(
        &self,
        driver: &Driver,
        tables: &ActionTables,
        item: &WorkItem,
        expected: usize,
        state: &mut RunState,
        rng: &mut StdRng,
    ) -> InvocationReport {
        let screenshots = Screenshots::new(self.config.screenshot_dir.clone());
        let session = LabSession::new(driver, &self.config, &screenshots);
        let project = item.project_number;
        let sample = item.sample_number;

        let navigation = async {
            session.login().await?;
            session.open_lab_project_list().await?;
            session.search_project(project).await
        }
        .await;
        let echo = match navigation {
            Ok(echo) => echo,
            Err(e) => return self.navigation_failed(state, item, e),
        };

        if let Err(e) = session.verify_project_echo(&echo, project) {
            error!("{}", e);
            return self.abandon_project(state, item, expected, e);
        }

        if let Err(e) = session.open_fibre_analysis().await {
            return self.navigation_failed(state, item, e);
        }

        if state.current_sample_index == 0 && !state.is_completed(project) {
            if let Err(e) = session.verify_sample_count(project, expected).await {
                error!("{}", e);
                return self.abandon_project(state, item, expected, e);
            }
        }

        // The project is open from here on, so a record that cannot be
        // reached is that record's failure and the cursor moves past it
        if let Err(e) = session.goto_sample(sample).await {
            return self.record_unreachable(state, item, e);
        }

        let pipeline = RecordPipeline::new(
            driver,
            &self.config,
            tables,
            self.clock.as_ref(),
            self.interceptor.as_ref(),
            &screenshots,
        );
        let outcome = pipeline.run(item, rng).await;
        if !outcome.skipped_actions.is_empty() {
            warn!(
                "{} branch actions were skipped: {:?}",
                outcome.skipped_actions.len(),
                outcome.skipped_actions
            );
        }

        let now = self.clock.now();
        let report = match outcome.reason() {
            None if outcome.is_saved() => {
                state.record_success(project, sample, now);
                InvocationReport::Processed { project, sample }
            }
            None => {
                let reason = format!("record stopped at '{}'", outcome.reached);
                state.record_failure(project, sample, reason.clone(), now);
                InvocationReport::RecordFailed {
                    project,
                    sample,
                    reason,
                }
            }
            Some(reason) => {
                state.record_failure(project, sample, reason.clone(), now);
                InvocationReport::RecordFailed {
                    project,
                    sample,
                    reason,
                }
            }
        };
        advance(state);
        report
    }

    /// Record the failure but keep the cursor, so the sample is retried.
    fn navigation_failed(
        &self,
        state: &mut RunState,
        item: &WorkItem,
        e: AutomationError,
    ) -> InvocationReport {
        error!(
            "Navigation to project {} sample {} failed: {}",
            item.project_number, item.sample_number, e
        );
        let reason = format!("navigation failed: {e}");
        state.record_failure(
            item.project_number,
            item.sample_number,
            reason.clone(),
            self.clock.now(),
        );
        InvocationReport::Aborted {
            project: item.project_number,
            sample: item.sample_number,
            reason,
        }
    }

    /// Fail the record the project view could not bring up, and move on.
    fn record_unreachable(
        &self,
        state: &mut RunState,
        item: &WorkItem,
        e: AutomationError,
    ) -> InvocationReport {
        error!(
            "Could not reach sample {} of project {}: {}",
            item.sample_number, item.project_number, e
        );
        let reason = format!("sample not reached: {e}");
        state.record_failure(
            item.project_number,
            item.sample_number,
            reason.clone(),
            self.clock.now(),
        );
        advance(state);
        InvocationReport::RecordFailed {
            project: item.project_number,
            sample: item.sample_number,
            reason,
        }
    }

    /// Close the project without processing any more of its samples.
    fn abandon_project(
        &self,
        state: &mut RunState,
        item: &WorkItem,
        expected: usize,
        e: AutomationError,
    ) -> InvocationReport {
        let reason = e.to_string();
        state.record_failure(
            item.project_number,
            item.sample_number,
            reason.clone(),
            self.clock.now(),
        );
        state.mark_completed(item.project_number);
        state.current_sample_index = expected;
        InvocationReport::ProjectSkipped {
            project: item.project_number,
            reason,
        }
    }
}

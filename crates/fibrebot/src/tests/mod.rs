mod invocation_tests;
mod pipeline_tests;

use std::sync::Arc;

use crate::browser::Driver;
use crate::config::{AutomationConfig, Timeouts};
use crate::dataset::{AnalysisCategory, Dataset, WorkItem};
use crate::diagnostics::Screenshots;
use crate::session::LabSession;

use fake_browser::FakeAlphaTracker;

pub const TEST_USER: &str = "ryan";
pub const TEST_PASSWORD: &str = "correct-horse";

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> AutomationConfig {
    AutomationConfig {
        base_url: "https://alphatracker.test/".to_string(),
        username: TEST_USER.to_string(),
        password: TEST_PASSWORD.to_string(),
        screenshot_dir: None,
        timeouts: Timeouts::fast(),
        ..Default::default()
    }
}

pub fn fake_app() -> FakeAlphaTracker {
    FakeAlphaTracker::new(TEST_USER, TEST_PASSWORD)
}

/// Rows of `(project, sample, category)` in sheet order.
pub fn dataset_of(rows: &[(u64, u32, &str)]) -> Dataset {
    Dataset::new(
        rows.iter()
            .map(|&(project_number, sample_number, category)| WorkItem {
                project_number,
                sample_number,
                analysis_category: AnalysisCategory::parse(category),
            })
            .collect(),
    )
}

pub fn driver_for(app: &FakeAlphaTracker, config: &AutomationConfig) -> Driver {
    Driver::new(Arc::new(app.clone()), config.timeouts.clone())
}

/// Walk the fake application up to `sample`'s record.
pub async fn open_record(
    app: &FakeAlphaTracker,
    config: &AutomationConfig,
    project: u64,
    sample: u32,
) -> Driver {
    let driver = driver_for(app, config);
    let shots = Screenshots::disabled();
    let session = LabSession::new(&driver, config, &shots);
    session.login().await.unwrap();
    session.open_lab_project_list().await.unwrap();
    let echo = session.search_project(project).await.unwrap();
    session.verify_project_echo(&echo, project).unwrap();
    session.open_fibre_analysis().await.unwrap();
    session.goto_sample(sample).await.unwrap();
    driver
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use super::fake_browser::{FakeAlphaTracker, FakeLauncher, ProjectFixture};
use super::*;
use crate::clock::ManualClock;
use crate::dataset::{DataSource, StaticSource};
use crate::dom;
use crate::errors::AutomationError;
use crate::guard::StepInterceptor;
use crate::runner::{Invocation, InvocationReport};
use crate::state::{FileStateStore, MemoryStateStore, StateStore};

struct Harness {
    app: FakeAlphaTracker,
    launcher: Arc<FakeLauncher>,
    store: Arc<MemoryStateStore>,
    clock: Arc<ManualClock>,
    source: Arc<dyn DataSource>,
}

impl Harness {
    fn new(app: FakeAlphaTracker, dataset: Dataset) -> Self {
        Self {
            launcher: Arc::new(FakeLauncher::new(app.clone())),
            app,
            store: Arc::new(MemoryStateStore::new()),
            clock: Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
            )),
            source: Arc::new(StaticSource(dataset)),
        }
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(
            test_config(),
            self.store.clone(),
            self.source.clone(),
            self.launcher.clone(),
        )
        .with_clock(self.clock.clone())
        .with_seed(17)
    }

    async fn run(&self) -> InvocationReport {
        self.invocation().run().await.unwrap()
    }

    fn state(&self) -> crate::state::RunState {
        self.store.snapshot().unwrap()
    }

    /// Long enough for any drawn interval to be due.
    fn wait_out_interval(&self) {
        self.clock.advance(Duration::minutes(20));
    }
}

#[tokio::test]
async fn three_samples_over_three_invocations_then_complete() {
    init_tracing();
    let h = Harness::new(
        fake_app().with_project(101, ProjectFixture::new(101, 3)),
        dataset_of(&[(101, 1, "NAD"), (101, 2, "Chrysotile"), (101, 3, "NAD")]),
    );

    for sample in 1..=3 {
        assert_eq!(
            h.run().await,
            InvocationReport::Processed {
                project: 101,
                sample
            }
        );
        h.wait_out_interval();
    }
    assert_eq!(h.run().await, InvocationReport::AllComplete);

    let saved: Vec<_> = h.app.saved().iter().map(|r| r.sample).collect();
    assert_eq!(saved, vec![1, 2, 3]);

    let state = h.state();
    assert_eq!(state.completed_projects, vec![101]);
    assert_eq!(state.total_samples_processed, 3);
    assert_eq!(state.processed_samples.len(), 3);
    assert!(state.failed_samples.is_empty());
    assert_eq!(h.launcher.launches(), 3);
    assert_eq!(h.app.closes(), 3);
}

#[tokio::test]
async fn invocation_before_the_interval_is_skipped() {
    init_tracing();
    let h = Harness::new(
        fake_app().with_project(101, ProjectFixture::new(101, 2)),
        dataset_of(&[(101, 1, "NAD"), (101, 2, "NAD")]),
    );

    h.run().await;
    let after_first = h.state();
    h.clock.advance(Duration::minutes(5));

    assert_eq!(h.run().await, InvocationReport::Skipped);
    assert_eq!(h.launcher.launches(), 1);
    let state = h.state();
    assert_eq!(state.current_sample_index, 1);
    assert_eq!(state.last_sample_time, after_first.last_sample_time);
    assert!(state.current_interval_minutes.is_some());
}

#[tokio::test]
async fn clock_stepping_backwards_does_not_open_the_gate() {
    init_tracing();
    let h = Harness::new(
        fake_app().with_project(101, ProjectFixture::new(101, 2)),
        dataset_of(&[(101, 1, "NAD"), (101, 2, "NAD")]),
    );

    h.run().await;
    h.clock.set(Utc.with_ymd_and_hms(2025, 4, 1, 7, 0, 0).unwrap());

    assert_eq!(h.run().await, InvocationReport::Skipped);
    assert_eq!(h.launcher.launches(), 1);
    assert_eq!(h.state().current_sample_index, 1);
}

#[tokio::test]
async fn forced_invocation_ignores_the_interval() {
    init_tracing();
    let h = Harness::new(
        fake_app().with_project(101, ProjectFixture::new(101, 2)),
        dataset_of(&[(101, 1, "NAD"), (101, 2, "NAD")]),
    );

    h.run().await;
    h.clock.advance(Duration::minutes(1));
    let report = h.invocation().force(true).run().await.unwrap();

    assert_eq!(
        report,
        InvocationReport::Processed {
            project: 101,
            sample: 2
        }
    );
}

#[tokio::test]
async fn sample_count_mismatch_abandons_the_project() {
    init_tracing();
    let mut fixture = ProjectFixture::new(7, 10);
    fixture.record_count_text = "9".to_string();
    let rows: Vec<(u64, u32, &str)> = (1..=10)
        .map(|s| (7, s, "NAD"))
        .chain([(8, 1, "NAD")])
        .collect();
    let h = Harness::new(
        fake_app()
            .with_project(7, fixture)
            .with_project(8, ProjectFixture::new(8, 1)),
        dataset_of(&rows),
    );

    match h.run().await {
        InvocationReport::ProjectSkipped { project, reason } => {
            assert_eq!(project, 7);
            assert!(reason.contains("spreadsheet has 10, website has 9"), "{reason}");
        }
        other => panic!("expected project 7 to be skipped, got {other:?}"),
    }
    let state = h.state();
    assert_eq!(state.completed_projects, vec![7]);
    assert!(state.processed_samples.is_empty());
    assert_eq!(state.failed_samples.len(), 1);
    assert!(state.last_sample_time.is_none());
    assert!(h.app.saved().is_empty());

    // Nothing was saved, so the next trigger may act straight away
    assert_eq!(
        h.run().await,
        InvocationReport::Processed {
            project: 8,
            sample: 1
        }
    );
}

#[tokio::test]
async fn unrecognised_category_fails_the_record_and_moves_on() {
    init_tracing();
    let h = Harness::new(
        fake_app().with_project(5, ProjectFixture::new(5, 2)),
        dataset_of(&[(5, 1, "Tremolite"), (5, 2, "NAD")]),
    );

    match h.run().await {
        InvocationReport::RecordFailed {
            project,
            sample,
            reason,
        } => {
            assert_eq!((project, sample), (5, 1));
            assert!(reason.contains("Unrecognised analysis category 'Tremolite'"));
        }
        other => panic!("expected a record failure, got {other:?}"),
    }
    let state = h.state();
    assert_eq!(state.current_sample_index, 1);
    assert!(state.last_sample_time.is_none());
    assert_eq!(state.failed_samples[0].sample, 1);

    assert_eq!(
        h.run().await,
        InvocationReport::Processed {
            project: 5,
            sample: 2
        }
    );
}

#[tokio::test]
async fn popup_during_assessment_fails_the_record() {
    init_tracing();
    let h = Harness::new(
        fake_app()
            .with_project(33, ProjectFixture::new(33, 2))
            .popup_after(dom::LAB_ASSESSMENT_SELECT),
        dataset_of(&[(33, 1, "NAD"), (33, 2, "NAD")]),
    );

    match h.run().await {
        InvocationReport::RecordFailed { reason, .. } => {
            assert!(reason.contains("Unexpected popup"), "{reason}");
            assert!(reason.contains("lab assessment"), "{reason}");
        }
        other => panic!("expected a record failure, got {other:?}"),
    }
    assert_eq!(h.app.popups_dismissed(), 1);
    assert!(h.app.saved().is_empty());
    assert_eq!(h.state().current_sample_index, 1);
}

#[tokio::test]
async fn wrong_project_in_search_result_abandons_the_project() {
    init_tracing();
    let mut fixture = ProjectFixture::new(101, 1);
    fixture.echo = "CE-1015".to_string();
    let h = Harness::new(
        fake_app().with_project(101, fixture),
        dataset_of(&[(101, 1, "NAD")]),
    );

    assert!(matches!(
        h.run().await,
        InvocationReport::ProjectSkipped { project: 101, .. }
    ));
    assert!(h.state().is_completed(101));
    assert_eq!(h.run().await, InvocationReport::AllComplete);
}

#[tokio::test]
async fn navigation_failure_keeps_the_cursor() {
    init_tracing();
    let h = Harness::new(
        fake_app()
            .with_project(42, ProjectFixture::new(42, 1))
            .without_loader(),
        dataset_of(&[(42, 1, "NAD")]),
    );

    assert!(matches!(
        h.run().await,
        InvocationReport::Aborted {
            project: 42,
            sample: 1,
            ..
        }
    ));
    let state = h.state();
    assert_eq!(state.current_project, Some(42));
    assert_eq!(state.current_sample_index, 0);
    assert_eq!(state.failed_samples.len(), 1);
    assert!(state.failed_samples[0].reason.starts_with("navigation failed"));
    assert_eq!(h.app.closes(), 1);

    // Still the first sample next time
    assert!(matches!(
        h.run().await,
        InvocationReport::Aborted { sample: 1, .. }
    ));
}

#[tokio::test]
async fn sample_missing_from_the_record_set_fails_and_moves_on() {
    init_tracing();
    // The application skips sample 2, so stepping once lands on sample 3
    let mut fixture = ProjectFixture::new(61, 2);
    fixture.samples = vec![1, 3];
    let h = Harness::new(
        fake_app()
            .with_project(61, fixture)
            .with_project(62, ProjectFixture::new(62, 1)),
        dataset_of(&[(61, 1, "NAD"), (61, 2, "NAD"), (62, 1, "NAD")]),
    );

    assert_eq!(
        h.run().await,
        InvocationReport::Processed {
            project: 61,
            sample: 1
        }
    );
    h.wait_out_interval();

    match h.run().await {
        InvocationReport::RecordFailed {
            project,
            sample,
            reason,
        } => {
            assert_eq!((project, sample), (61, 2));
            assert!(reason.starts_with("sample not reached"), "{reason}");
            assert!(reason.contains("Sample 3"), "{reason}");
        }
        other => panic!("expected a record failure, got {other:?}"),
    }
    let state = h.state();
    assert_eq!(state.current_sample_index, 2);
    assert_eq!(state.failed_samples.len(), 1);

    // The failed record does not hold up the next project
    assert_eq!(
        h.run().await,
        InvocationReport::Processed {
            project: 62,
            sample: 1
        }
    );
    let state = h.state();
    assert_eq!(state.completed_projects, vec![61]);
    assert_eq!(state.failed_samples.len(), 1);
    assert_eq!(state.total_samples_processed, 2);
}

struct UnreachableSheet;

#[async_trait]
impl DataSource for UnreachableSheet {
    async fn fetch(&self) -> Result<Dataset, AutomationError> {
        Err(AutomationError::DataSource(
            "failed to fetch sheet data: HTTP 503".into(),
        ))
    }
}

#[tokio::test]
async fn data_source_failure_is_an_error_and_state_is_still_written() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("automation_state.json");
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(&path));
    let launcher = Arc::new(FakeLauncher::new(fake_app()));

    let result = Invocation::new(
        test_config(),
        store.clone(),
        Arc::new(UnreachableSheet),
        launcher.clone(),
    )
    .with_seed(3)
    .run()
    .await;

    assert!(matches!(result, Err(AutomationError::DataSource(_))));
    assert_eq!(launcher.launches(), 0);
    assert!(path.exists());
    assert_eq!(store.load().unwrap(), crate::state::RunState::default());
}

#[tokio::test]
async fn state_survives_on_disk_between_invocations() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("automation_state.json");
    let app = fake_app().with_project(9, ProjectFixture::new(9, 2));
    let launcher = Arc::new(FakeLauncher::new(app.clone()));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
    ));
    let source: Arc<dyn DataSource> = Arc::new(StaticSource(dataset_of(&[
        (9, 1, "Amosite"),
        (9, 2, "Crocidolite"),
    ])));

    for expected in 1..=2 {
        let report = Invocation::new(
            test_config(),
            Arc::new(FileStateStore::new(&path)),
            source.clone(),
            launcher.clone(),
        )
        .with_clock(clock.clone())
        .with_seed(expected.into())
        .run()
        .await
        .unwrap();
        assert_eq!(
            report,
            InvocationReport::Processed {
                project: 9,
                sample: expected
            }
        );
        clock.advance(Duration::minutes(20));
    }

    let state = FileStateStore::new(&path).load().unwrap();
    assert_eq!(state.total_samples_processed, 2);
    assert_eq!(state.current_sample_index, 2);
}

/// Records the name of every guarded step it sees.
#[derive(Default)]
struct StepLog(std::sync::Mutex<Vec<String>>);

#[async_trait]
impl StepInterceptor for StepLog {
    async fn after_step(
        &self,
        _driver: &Driver,
        step: &str,
        outcome: Result<(), AutomationError>,
    ) -> Result<(), AutomationError> {
        self.0.lock().unwrap().push(step.to_string());
        outcome
    }
}

#[tokio::test]
async fn guarded_steps_run_through_the_configured_interceptor() {
    init_tracing();
    let h = Harness::new(
        fake_app().with_project(11, ProjectFixture::new(11, 1)),
        dataset_of(&[(11, 1, "Chrysotile")]),
    );
    let log = Arc::new(StepLog::default());

    let report = h
        .invocation()
        .with_interceptor(log.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(
        report,
        InvocationReport::Processed {
            project: 11,
            sample: 1
        }
    );
    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            "sample size",
            "start time",
            "lab assessment",
            "analysis tab",
            "category actions"
        ]
    );
}

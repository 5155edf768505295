use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::fake_browser::{ProjectFixture, LAB_ASSESSMENT_OPTIONS};
use super::*;
use crate::actions::{ActionTables, Branch};
use crate::clock::{Clock, ManualClock};
use crate::dom::{self, analysis_field};
use crate::errors::AutomationError;
use crate::guard::{NoopInterceptor, PopupGuard, StepInterceptor};
use crate::pipeline::{format_field_time, RecordPipeline, RecordStage};

fn item(project: u64, sample: u32, category: &str) -> WorkItem {
    WorkItem {
        project_number: project,
        sample_number: sample,
        analysis_category: AnalysisCategory::parse(category),
    }
}

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 5, 20, 10, 30, 0).unwrap())
}

#[tokio::test]
async fn nad_record_is_filled_and_saved() {
    init_tracing();
    let config = test_config();
    let app = fake_app().with_project(101, ProjectFixture::new(101, 3));
    let driver = open_record(&app, &config, 101, 2).await;
    let tables = ActionTables::load().unwrap();
    let clock = clock();
    let shots = Screenshots::disabled();
    let pipeline =
        RecordPipeline::new(&driver, &config, &tables, &clock, &PopupGuard, &shots);

    let outcome = pipeline
        .run(&item(101, 2, "NAD"), &mut StdRng::seed_from_u64(5))
        .await;

    assert!(outcome.is_saved(), "{:?}", outcome.result);
    assert_eq!(outcome.stage(), RecordStage::Saved);
    let saved = app.saved();
    assert_eq!(saved.len(), 1);
    let record = &saved[0];
    assert_eq!((record.project, record.sample), (101, 2));
    assert_eq!(record.field(dom::SAMPLE_SIZE_FIELD), Some("sufficient"));
    assert_eq!(
        record.field(dom::LAB_ASSESSMENT_SELECT),
        Some(LAB_ASSESSMENT_OPTIONS[0])
    );
    assert_eq!(
        record.field(dom::END_TIME_FIELD).map(str::to_string),
        Some(format_field_time(clock.now(), &config.timestamp_format))
    );
    assert_eq!(record.analysis.len(), tables.branch(Branch::Nad).len());
    assert_eq!(record.analysis[0], "select No Asbestos Detected RESULT");
}

#[tokio::test]
async fn start_time_lies_sixteen_minutes_back_within_jitter() {
    init_tracing();
    let config = test_config();
    let app = fake_app().with_project(101, ProjectFixture::new(101, 1));
    let driver = open_record(&app, &config, 101, 1).await;
    let tables = ActionTables::load().unwrap();
    let clock = clock();
    let shots = Screenshots::disabled();
    let pipeline =
        RecordPipeline::new(&driver, &config, &tables, &clock, &NoopInterceptor, &shots);

    pipeline
        .run(&item(101, 1, "NAD"), &mut StdRng::seed_from_u64(11))
        .await
        .result
        .unwrap();

    let start = app.saved()[0]
        .field(dom::START_TIME_FIELD)
        .unwrap()
        .to_string();
    let allowed: Vec<String> = (-30..=30)
        .map(|jitter| {
            let at = clock.now() - chrono::Duration::minutes(16)
                + chrono::Duration::seconds(jitter);
            format_field_time(at, &config.timestamp_format)
        })
        .collect();
    assert!(allowed.contains(&start), "unexpected start time {start}");
}

#[tokio::test]
async fn each_branch_replays_its_own_table() {
    init_tracing();
    let config = test_config();
    let tables = ActionTables::load().unwrap();
    let clock = clock();
    let shots = Screenshots::disabled();

    for (category, branch) in [
        ("Chrysotile", Branch::Chrysotile),
        ("amosite", Branch::Amosite),
        ("CROCIDOLITE", Branch::Crocidolite),
    ] {
        let app = fake_app().with_project(9, ProjectFixture::new(9, 1));
        let driver = open_record(&app, &config, 9, 1).await;
        let pipeline =
            RecordPipeline::new(&driver, &config, &tables, &clock, &NoopInterceptor, &shots);
        let outcome = pipeline
            .run(&item(9, 1, category), &mut StdRng::seed_from_u64(1))
            .await;
        assert!(outcome.is_saved(), "{category}: {:?}", outcome.result);
        assert_eq!(
            app.saved()[0].analysis.len(),
            tables.branch(branch).len(),
            "{category}"
        );
    }
}

#[tokio::test]
async fn unknown_category_fails_before_touching_the_record() {
    init_tracing();
    let config = test_config();
    let app = fake_app().with_project(5, ProjectFixture::new(5, 1));
    let driver = open_record(&app, &config, 5, 1).await;
    let tables = ActionTables::load().unwrap();
    let clock = clock();
    let shots = Screenshots::disabled();
    let pipeline =
        RecordPipeline::new(&driver, &config, &tables, &clock, &PopupGuard, &shots);

    let outcome = pipeline
        .run(&item(5, 1, "Tremolite"), &mut StdRng::seed_from_u64(1))
        .await;

    assert!(matches!(
        outcome.result,
        Err(AutomationError::Classification(ref raw)) if raw == "Tremolite"
    ));
    assert_eq!(outcome.reached, RecordStage::NotStarted);
    assert!(outcome.reason().unwrap().contains("Tremolite"));
    assert!(app.saved().is_empty());
}

#[tokio::test]
async fn sample_size_is_retried_once() {
    init_tracing();
    let config = test_config();
    let app = fake_app()
        .with_project(2, ProjectFixture::new(2, 1))
        .rejecting_first_sample_size();
    let driver = open_record(&app, &config, 2, 1).await;
    let tables = ActionTables::load().unwrap();
    let clock = clock();
    let shots = Screenshots::disabled();
    let pipeline =
        RecordPipeline::new(&driver, &config, &tables, &clock, &PopupGuard, &shots);

    let outcome = pipeline
        .run(&item(2, 1, "NAD"), &mut StdRng::seed_from_u64(1))
        .await;

    assert!(outcome.is_saved(), "{:?}", outcome.result);
    assert_eq!(
        app.saved()[0].field(dom::SAMPLE_SIZE_FIELD),
        Some("sufficient")
    );
}

#[tokio::test]
async fn missing_branch_control_is_skipped_not_fatal() {
    init_tracing();
    let config = test_config();
    let app = fake_app()
        .with_project(2, ProjectFixture::new(2, 1))
        .without_element(analysis_field!("MMMF.CHECKBOX"));
    let driver = open_record(&app, &config, 2, 1).await;
    let tables = ActionTables::load().unwrap();
    let clock = clock();
    let shots = Screenshots::disabled();
    let pipeline =
        RecordPipeline::new(&driver, &config, &tables, &clock, &NoopInterceptor, &shots);

    let outcome = pipeline
        .run(&item(2, 1, "NAD"), &mut StdRng::seed_from_u64(1))
        .await;

    assert!(outcome.is_saved(), "{:?}", outcome.result);
    assert_eq!(outcome.skipped_actions.len(), 1);
    assert!(outcome.skipped_actions[0].contains("MMMF.CHECKBOX"));
    assert_eq!(
        app.saved()[0].analysis.len(),
        tables.branch(Branch::Nad).len() - 1
    );
}

#[tokio::test]
async fn popup_on_a_guarded_step_aborts_without_saving() {
    init_tracing();
    let config = test_config();
    let app = fake_app()
        .with_project(2, ProjectFixture::new(2, 1))
        .popup_after(dom::START_TIME_FIELD);
    let driver = open_record(&app, &config, 2, 1).await;
    let tables = ActionTables::load().unwrap();
    let clock = clock();
    let shots = Screenshots::disabled();
    let pipeline =
        RecordPipeline::new(&driver, &config, &tables, &clock, &PopupGuard, &shots);

    let outcome = pipeline
        .run(&item(2, 1, "NAD"), &mut StdRng::seed_from_u64(1))
        .await;

    assert!(matches!(
        outcome.result,
        Err(AutomationError::UnexpectedPopup(ref step)) if step == "start time"
    ));
    assert_eq!(outcome.reached, RecordStage::SizeSet);
    assert_eq!(app.popups_dismissed(), 1);
    assert!(app.saved().is_empty());
}

#[tokio::test]
async fn assessment_without_matching_option_fails_the_record() {
    init_tracing();
    let config = test_config();
    let mut fixture = ProjectFixture::new(2, 1);
    fixture.surveyor_assessment = "Presumed asbestos".to_string();
    let app = fake_app().with_project(2, fixture);
    let driver = open_record(&app, &config, 2, 1).await;
    let tables = ActionTables::load().unwrap();
    let clock = clock();
    let shots = Screenshots::disabled();
    let pipeline =
        RecordPipeline::new(&driver, &config, &tables, &clock, &PopupGuard, &shots);

    let outcome = pipeline
        .run(&item(2, 1, "NAD"), &mut StdRng::seed_from_u64(1))
        .await;

    assert!(matches!(outcome.result, Err(AutomationError::Browser(_))));
    assert_eq!(outcome.reached, RecordStage::TimesSet);
    assert!(app.saved().is_empty());
}

#[tokio::test]
async fn popup_guard_passes_clean_outcomes_through() {
    init_tracing();
    let config = test_config();
    let app = fake_app();
    let driver = driver_for(&app, &config);

    let ok = PopupGuard.after_step(&driver, "noop", Ok(())).await;
    assert!(ok.is_ok());

    let failed = PopupGuard
        .after_step(
            &driver,
            "noop",
            Err(AutomationError::Timeout("slow".into())),
        )
        .await;
    assert!(matches!(failed, Err(AutomationError::Timeout(_))));
    assert_eq!(app.popups_dismissed(), 0);
}

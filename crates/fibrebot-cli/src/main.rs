//! fibrebot CLI
//!
//! Meant to be fired by an external scheduler every few minutes. Each
//! `run` processes at most one sample and exits.
//!
//! Usage:
//!   fibrebot run              # one invocation, honouring the rolling interval
//!   fibrebot run --force      # one invocation, now
//!   fibrebot status [--json]  # what the state file says
//!   fibrebot validate --fetch # check action tables and preview the sheet

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fibrebot::actions::{Branch, ACTION_TABLE_VERSION};
use fibrebot::config::{self, AutomationConfig};
use fibrebot::{
    ActionTables, AnalysisCategory, ChromeLauncher, DataSource, FileStateStore, HttpCsvSource,
    Invocation, StateStore,
};
use tracing::info;

mod logging;

#[derive(Parser, Debug)]
#[command(
    name = "fibrebot",
    author,
    version,
    about = "Enters fibre analysis results into AlphaTracker, one sample per run"
)]
struct Cli {
    /// Path of the persisted run state
    #[arg(long, global = true, env = "FIBREBOT_STATE_FILE", default_value = config::DEFAULT_STATE_FILE)]
    state_file: PathBuf,

    /// CSV export of the tracking sheet
    #[arg(long, global = true, env = "FIBREBOT_SHEET_URL", default_value = config::DEFAULT_SHEET_URL)]
    sheet_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Process a sample even if the rolling interval has not elapsed
    #[arg(long)]
    force: bool,

    /// AlphaTracker landing page
    #[arg(long, env = "ALPHATRACKER_URL", default_value = config::DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "ALPHATRACKER_USERNAME", default_value = config::DEFAULT_USERNAME)]
    username: String,

    #[arg(long, env = "ALPHATRACKER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Where diagnostic screenshots go
    #[arg(long, env = "FIBREBOT_SCREENSHOT_DIR", default_value = "screenshots")]
    screenshot_dir: PathBuf,

    /// Do not write screenshots
    #[arg(long)]
    no_screenshots: bool,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Chromium binary to launch instead of the one found on PATH
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    /// Print the raw state as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Also download the sheet and print the project plan
    #[arg(long)]
    fetch: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one invocation
    Run(RunArgs),
    /// Summarise the persisted run state
    Status(StatusArgs),
    /// Check the action tables (and optionally the sheet)
    Validate(ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging()?;

    match cli.command {
        Commands::Run(ref args) => run(&cli, args).await,
        Commands::Status(ref args) => status(&cli, args),
        Commands::Validate(ref args) => validate(&cli, args).await,
    }
}

async fn run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let password = args
        .password
        .clone()
        .context("ALPHATRACKER_PASSWORD is not set (env, .env file or --password)")?;

    let config = AutomationConfig {
        base_url: args.base_url.clone(),
        sheet_url: cli.sheet_url.clone(),
        username: args.username.clone(),
        password,
        state_path: cli.state_file.clone(),
        screenshot_dir: (!args.no_screenshots).then(|| args.screenshot_dir.clone()),
        headless: !args.headed,
        ..Default::default()
    };
    info!("Starting invocation with {:?}", config);

    let invocation = Invocation::new(
        config,
        Arc::new(FileStateStore::new(&cli.state_file)),
        Arc::new(HttpCsvSource::new(&cli.sheet_url)),
        Arc::new(ChromeLauncher {
            executable: args.chrome_path.clone(),
        }),
    )
    .force(args.force);

    let report = invocation.run().await.context("invocation failed")?;
    println!("{report}");
    Ok(())
}

fn status(cli: &Cli, args: &StatusArgs) -> Result<()> {
    let store = FileStateStore::new(&cli.state_file);
    let state = store
        .load()
        .with_context(|| format!("failed to load {}", cli.state_file.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!("State file:        {}", store.path().display());
    match state.current_project {
        Some(project) => println!(
            "Current project:   {} (next index {})",
            project, state.current_sample_index
        ),
        None => println!("Current project:   none"),
    }
    println!(
        "Completed:         {} {:?}",
        state.completed_projects.len(),
        state.completed_projects
    );
    println!("Samples processed: {}", state.total_samples_processed);
    println!("Samples failed:    {}", state.failed_samples.len());
    match state.last_sample_time {
        Some(at) => println!("Last sample:       {}", at.to_rfc3339()),
        None => println!("Last sample:       never"),
    }
    if let Some(minutes) = state.current_interval_minutes {
        println!("Next interval:     {minutes} minutes");
    }

    let recent: Vec<_> = state.failed_samples.iter().rev().take(5).collect();
    if !recent.is_empty() {
        println!("\nRecent failures:");
        for failure in recent {
            println!(
                "  {} project {} sample {}: {}",
                failure.timestamp.to_rfc3339(),
                failure.project,
                failure.sample,
                failure.reason
            );
        }
    }
    Ok(())
}

async fn validate(cli: &Cli, args: &ValidateArgs) -> Result<()> {
    let tables = ActionTables::load().context("action tables are invalid")?;
    println!("Action tables v{ACTION_TABLE_VERSION}");
    for branch in Branch::ALL {
        println!("  {:<12} {} actions", branch, tables.branch(branch).len());
    }
    let selectors = tables.selectors();
    println!("  {} distinct controls:", selectors.len());
    for selector in selectors {
        println!("    {selector}");
    }

    if !args.fetch {
        return Ok(());
    }

    let dataset = HttpCsvSource::new(&cli.sheet_url)
        .fetch()
        .await
        .context("failed to load the sheet")?;
    println!("\nSheet: {} samples", dataset.items().len());
    for project in dataset.projects() {
        let samples = dataset.samples_for(project);
        let mut categories: BTreeMap<String, usize> = BTreeMap::new();
        for item in &samples {
            *categories
                .entry(item.analysis_category.to_string())
                .or_default() += 1;
        }
        let unknown = samples
            .iter()
            .filter(|item| matches!(item.analysis_category, AnalysisCategory::Unknown(_)))
            .count();
        println!(
            "  project {:<8} {:>3} samples {:?}{}",
            project,
            samples.len(),
            categories,
            if unknown > 0 {
                format!("  ({unknown} will fail classification)")
            } else {
                String::new()
            }
        );
    }
    Ok(())
}

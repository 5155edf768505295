//! Work items from the spreadsheet export
//!
//! The sheet only fills `Project Number` on the first row of each block, so
//! blank project cells inherit the value above them.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::errors::AutomationError;

pub const COL_PROJECT: &str = "Project Number";
pub const COL_SAMPLE: &str = "Sample No.";
pub const COL_STEREO_START: &str = "Stereo Binocular Start Time";
pub const COL_ANALYSIS: &str = "Analysis 1";

/// Outcome of the fibre analysis as entered in the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisCategory {
    Nad,
    Chrysotile,
    Amosite,
    Crocidolite,
    /// Anything else, kept verbatim for failure reports
    Unknown(String),
}

impl AnalysisCategory {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_lowercase().as_str() {
            "nad" => AnalysisCategory::Nad,
            "chrysotile" => AnalysisCategory::Chrysotile,
            "amosite" => AnalysisCategory::Amosite,
            "crocidolite" => AnalysisCategory::Crocidolite,
            _ => AnalysisCategory::Unknown(trimmed.to_string()),
        }
    }
}

impl fmt::Display for AnalysisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisCategory::Nad => f.write_str("NAD"),
            AnalysisCategory::Chrysotile => f.write_str("Chrysotile"),
            AnalysisCategory::Amosite => f.write_str("Amosite"),
            AnalysisCategory::Crocidolite => f.write_str("Crocidolite"),
            AnalysisCategory::Unknown(raw) => write!(f, "Unknown({raw})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub project_number: u64,
    pub sample_number: u32,
    pub analysis_category: AnalysisCategory,
}

/// All work items of one fetch, in sheet order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    items: Vec<WorkItem>,
}

impl Dataset {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Distinct project numbers in order of first appearance.
    pub fn projects(&self) -> Vec<u64> {
        let mut seen = Vec::new();
        for item in &self.items {
            if !seen.contains(&item.project_number) {
                seen.push(item.project_number);
            }
        }
        seen
    }

    /// A project's samples in sheet order (not sorted by sample number).
    pub fn samples_for(&self, project: u64) -> Vec<&WorkItem> {
        self.items
            .iter()
            .filter(|item| item.project_number == project)
            .collect()
    }

    pub fn sample_count(&self, project: u64) -> usize {
        self.items
            .iter()
            .filter(|item| item.project_number == project)
            .count()
    }
}

/// Parse a numeric cell that may have been exported as a float (`"101.0"`).
fn parse_integer_cell(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<u64>() {
        return Some(n);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => Some(f as u64),
        _ => None,
    }
}

/// Parse the CSV export into a dataset.
pub fn parse_csv(text: &str) -> Result<Dataset, AutomationError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &str| -> Result<usize, AutomationError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AutomationError::DataSource(format!("'{name}' column not found")))
    };
    let project_col = column(COL_PROJECT)?;
    let sample_col = column(COL_SAMPLE)?;
    // Only its presence is checked; the values are not used
    column(COL_STEREO_START)?;
    let analysis_col = column(COL_ANALYSIS)?;

    let mut items = Vec::new();
    let mut last_project: Option<u64> = None;
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 2; // 1-based, after the header line
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let project_raw = cell(project_col);
        let project = if project_raw.trim().is_empty() {
            last_project
        } else {
            Some(parse_integer_cell(project_raw).ok_or_else(|| {
                AutomationError::DataSource(format!(
                    "row {row}: project number '{project_raw}' is not an integer"
                ))
            })?)
        };
        let Some(project) = project else {
            return Err(AutomationError::DataSource(format!(
                "row {row}: no project number to forward-fill from"
            )));
        };
        last_project = Some(project);

        let sample_raw = cell(sample_col);
        let Some(sample) = parse_integer_cell(sample_raw).and_then(|n| u32::try_from(n).ok())
        else {
            warn!(
                "Skipping row {} of project {}: sample number '{}' is not usable",
                row, project, sample_raw
            );
            continue;
        };

        items.push(WorkItem {
            project_number: project,
            sample_number: sample,
            analysis_category: AnalysisCategory::parse(cell(analysis_col)),
        });
    }

    debug!("Parsed {} work items", items.len());
    Ok(Dataset::new(items))
}

/// Where work items come from.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self) -> Result<Dataset, AutomationError>;
}

/// The published CSV export of the lab's tracking sheet.
pub struct HttpCsvSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCsvSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl DataSource for HttpCsvSource {
    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<Dataset, AutomationError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AutomationError::DataSource(format!(
                "failed to fetch sheet data: HTTP {status}"
            )));
        }
        let body = response.text().await?;
        let dataset = parse_csv(&body)?;
        info!(
            "Loaded {} samples across {} projects",
            dataset.items().len(),
            dataset.projects().len()
        );
        Ok(dataset)
    }
}

/// A fixed dataset, for dry runs and tests.
pub struct StaticSource(pub Dataset);

#[async_trait]
impl DataSource for StaticSource {
    async fn fetch(&self) -> Result<Dataset, AutomationError> {
        Ok(self.0.clone())
    }
}

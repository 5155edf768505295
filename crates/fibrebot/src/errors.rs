use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Element is detached from DOM: {0}")]
    StaleElement(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Sample count mismatch for project {project}: {reason}")]
    SampleCountMismatch { project: u64, reason: String },

    #[error("Unrecognised analysis category '{0}'")]
    Classification(String),

    #[error("Unexpected popup dismissed during {0}")]
    UnexpectedPopup(String),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("State store error: {0}")]
    State(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl AutomationError {
    /// Races with the page (re-rendered nodes, slow loads) that are worth
    /// another attempt in place.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AutomationError::StaleElement(_)
                | AutomationError::Timeout(_)
                | AutomationError::ElementNotFound(_)
                | AutomationError::ElementNotEnabled(_)
        )
    }
}

impl From<std::io::Error> for AutomationError {
    fn from(err: std::io::Error) -> Self {
        AutomationError::State(err.to_string())
    }
}

impl From<serde_json::Error> for AutomationError {
    fn from(err: serde_json::Error) -> Self {
        AutomationError::State(format!("serialization failed: {err}"))
    }
}

impl From<reqwest::Error> for AutomationError {
    fn from(err: reqwest::Error) -> Self {
        AutomationError::DataSource(err.to_string())
    }
}

impl From<csv::Error> for AutomationError {
    fn from(err: csv::Error) -> Self {
        AutomationError::DataSource(format!("malformed CSV: {err}"))
    }
}

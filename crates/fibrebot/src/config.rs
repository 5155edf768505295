use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://crucial-enviro.alphatracker.online/";
pub const DEFAULT_SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/1cK7Agui9UMlPr2p1K2jI3jtZxyJuYtm7jP5hi9g4i4Q/export?format=csv&gid=433984109";
pub const DEFAULT_USERNAME: &str = "ryan";
pub const DEFAULT_STATE_FILE: &str = "automation_state.json";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Bounded waits used across the workflow.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Delay between condition polls
    pub poll_interval: Duration,
    /// Fallback for waits that have no dedicated timeout
    pub default_wait: Duration,
    pub login_redirect: Duration,
    pub search_echo: Duration,
    pub fibre_button: Duration,
    pub loader_appear: Duration,
    pub loader_disappear: Duration,
    pub record_count: Duration,
    pub overlay_clear: Duration,
    pub popup_probe: Duration,
    pub save_idle: Duration,
    /// First delay of the project search retry; doubled per attempt
    pub search_retry_base: Duration,
    /// Pause between in-place retries of a single click
    pub click_retry_delay: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            default_wait: Duration::from_secs(10),
            login_redirect: Duration::from_secs(10),
            search_echo: Duration::from_secs(10),
            fibre_button: Duration::from_secs(15),
            loader_appear: Duration::from_secs(15),
            loader_disappear: Duration::from_secs(30),
            record_count: Duration::from_secs(15),
            overlay_clear: Duration::from_secs(10),
            popup_probe: Duration::from_secs(5),
            save_idle: Duration::from_secs(30),
            search_retry_base: Duration::from_secs(5),
            click_retry_delay: Duration::from_millis(500),
        }
    }
}

impl Timeouts {
    /// Every wait scaled down to a few milliseconds, for driving fakes.
    pub fn fast() -> Self {
        let ms = Duration::from_millis;
        Self {
            poll_interval: ms(1),
            default_wait: ms(40),
            login_redirect: ms(40),
            search_echo: ms(40),
            fibre_button: ms(40),
            loader_appear: ms(40),
            loader_disappear: ms(40),
            record_count: ms(40),
            overlay_clear: ms(40),
            popup_probe: ms(5),
            save_idle: ms(40),
            search_retry_base: ms(1),
            click_retry_delay: ms(1),
        }
    }
}

/// Everything one invocation needs to know about its environment.
#[derive(Clone)]
pub struct AutomationConfig {
    pub base_url: String,
    pub sheet_url: String,
    pub username: String,
    pub password: String,
    pub state_path: PathBuf,
    /// `None` disables diagnostic screenshots
    pub screenshot_dir: Option<PathBuf>,
    /// chrono format used for the start/end time fields
    pub timestamp_format: String,
    /// Literal written into the sample size field
    pub sample_size_value: String,
    /// How far before "now" the analysis is recorded as starting
    pub analysis_lead: chrono::Duration,
    /// Upper bound of the random jitter applied to the start time
    pub start_jitter_secs: i64,
    pub headless: bool,
    pub timeouts: Timeouts,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            sheet_url: DEFAULT_SHEET_URL.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            state_path: PathBuf::from(DEFAULT_STATE_FILE),
            screenshot_dir: Some(PathBuf::from("screenshots")),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            sample_size_value: "sufficient".to_string(),
            analysis_lead: chrono::Duration::minutes(16),
            start_jitter_secs: 30,
            headless: true,
            timeouts: Timeouts::default(),
        }
    }
}

impl fmt::Debug for AutomationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomationConfig")
            .field("base_url", &self.base_url)
            .field("sheet_url", &self.sheet_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("state_path", &self.state_path)
            .field("screenshot_dir", &self.screenshot_dir)
            .field("timestamp_format", &self.timestamp_format)
            .field("headless", &self.headless)
            .finish_non_exhaustive()
    }
}

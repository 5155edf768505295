//! Scheduled data entry of fibre analysis results into AlphaTracker
//!
//! Each invocation reads the lab's tracking sheet and the persisted run
//! state, and, when the rolling interval allows, drives a headless
//! Chromium through one sample's fibre analysis record.

pub mod actions;
pub mod browser;
pub mod clock;
pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod dom;
pub mod errors;
pub mod guard;
pub mod pipeline;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod selector;
pub mod session;
pub mod state;
#[cfg(test)]
mod tests;
pub mod work;

pub use actions::{ActionTables, Branch, UiAction};
pub use browser::{BrowserEngine, ChromeEngine, Driver, Locator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AutomationConfig, Timeouts};
pub use dataset::{AnalysisCategory, DataSource, Dataset, HttpCsvSource, StaticSource, WorkItem};
pub use errors::AutomationError;
pub use guard::{PopupGuard, StepInterceptor};
pub use runner::{BrowserLauncher, ChromeLauncher, Invocation, InvocationReport};
pub use selector::Selector;
pub use state::{FileStateStore, MemoryStateStore, RunState, StateSession, StateStore};

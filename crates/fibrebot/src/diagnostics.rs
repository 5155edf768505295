use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::browser::Driver;

const MAX_NAME_LEN: usize = 80;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

/// Turn free text into a file-name fragment.
pub fn sanitize_filename(context: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(context.trim(), "_");
    let trimmed = replaced.trim_matches('_');
    let name: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    if name.is_empty() {
        "screenshot".to_string()
    } else {
        name
    }
}

/// Numbered PNG captures of the page at notable points of a run.
///
/// Capturing is best effort: a failure is logged and otherwise ignored.
#[derive(Debug)]
pub struct Screenshots {
    dir: Option<PathBuf>,
    counter: AtomicUsize,
}

impl Screenshots {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Next file name for `context`, e.g. `003_after_login.png`.
    pub fn next_name(&self, context: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{n:03}_{}.png", sanitize_filename(context))
    }

    /// Capture the page; returns the written path, if any.
    pub async fn capture(&self, driver: &Driver, context: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(self.next_name(context));

        let bytes = match driver.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not take screenshot '{}': {}", context, e);
                return None;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("Could not create screenshot dir {}: {}", dir.display(), e);
            return None;
        }
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                debug!("Screenshot saved: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not write screenshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

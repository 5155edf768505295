//! Interception of record steps that may trip the application's modal
//!
//! The application sometimes answers an edit with a generic "OK" dialog.
//! Left open it swallows every following click, so guarded steps look for
//! it afterwards, dismiss it, and fail the step.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::browser::Driver;
use crate::dom;
use crate::errors::AutomationError;

/// Hook run after each guarded step with the step's own outcome.
#[async_trait]
pub trait StepInterceptor: Send + Sync {
    async fn after_step(
        &self,
        driver: &Driver,
        step: &str,
        outcome: Result<(), AutomationError>,
    ) -> Result<(), AutomationError>;
}

/// Passes outcomes through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInterceptor;

#[async_trait]
impl StepInterceptor for NoopInterceptor {
    async fn after_step(
        &self,
        _driver: &Driver,
        _step: &str,
        outcome: Result<(), AutomationError>,
    ) -> Result<(), AutomationError> {
        outcome
    }
}

/// Dismisses the modal and reports [`AutomationError::UnexpectedPopup`]
/// whenever one is showing after a step, whatever the step returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct PopupGuard;

#[async_trait]
impl StepInterceptor for PopupGuard {
    async fn after_step(
        &self,
        driver: &Driver,
        step: &str,
        outcome: Result<(), AutomationError>,
    ) -> Result<(), AutomationError> {
        let ok_button = driver.locator(dom::POPUP_OK_BUTTON);
        let probe = driver.timeouts().popup_probe;

        match ok_button.is_visible_within(probe).await {
            Ok(false) => {
                debug!("No popup after '{}'", step);
                outcome
            }
            Ok(true) => {
                warn!("Popup appeared during '{}', dismissing it", step);
                if let Err(e) = ok_button.click(Some(probe)).await {
                    warn!("Failed to dismiss popup after '{}': {}", step, e);
                }
                if let Err(e) = &outcome {
                    debug!("'{}' had also failed on its own: {}", step, e);
                }
                Err(AutomationError::UnexpectedPopup(step.to_string()))
            }
            Err(e) => {
                warn!("Popup probe after '{}' failed: {}", step, e);
                outcome
            }
        }
    }
}

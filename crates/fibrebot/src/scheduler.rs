//! Rolling-interval gate
//!
//! The external trigger fires far more often than work should happen. Each
//! cycle waits a randomly drawn 17-19 minutes after the last confirmed
//! save, so entries do not land on a fixed beat.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

use crate::state::RunState;

pub const INTERVAL_MINUTES: RangeInclusive<u32> = 17..=19;

/// One minute of slack against trigger jitter.
const GRACE_MINUTES: i64 = 1;

fn draw_interval(rng: &mut impl Rng) -> u32 {
    rng.gen_range(INTERVAL_MINUTES)
}

/// Decide whether this invocation should do work, updating the interval
/// bookkeeping in `state`.
pub fn should_process_now(state: &mut RunState, now: DateTime<Utc>, rng: &mut impl Rng) -> bool {
    state.last_checked_time = Some(now);

    let Some(last) = state.last_sample_time else {
        info!("No sample processed yet, proceeding");
        return true;
    };

    let elapsed_minutes = (now - last).num_minutes().max(0);
    let interval = match state.current_interval_minutes {
        Some(minutes) => minutes,
        None => {
            let minutes = draw_interval(rng);
            state.current_interval_minutes = Some(minutes);
            minutes
        }
    };

    if elapsed_minutes >= i64::from(interval) - GRACE_MINUTES {
        let next = draw_interval(rng);
        state.current_interval_minutes = Some(next);
        info!(
            "{} minutes since last sample (interval {}), proceeding. Next interval: {} minutes",
            elapsed_minutes, interval, next
        );
        true
    } else {
        debug!(
            "{} minutes since last sample, waiting for {} minutes",
            elapsed_minutes, interval
        );
        false
    }
}

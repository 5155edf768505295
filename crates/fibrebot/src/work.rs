//! Picks the next (project, sample) pair from the dataset and run state

use tracing::{debug, info};

use crate::dataset::{Dataset, WorkItem};
use crate::state::RunState;

/// The work item at the state's cursor, moving the cursor on to the next
/// unfinished project when the current one is exhausted or completed.
///
/// Calling this again without [`advance`] returns the same item.
pub fn next_work_item(dataset: &Dataset, state: &mut RunState) -> Option<WorkItem> {
    let projects = dataset.projects();

    loop {
        let project = match state.current_project {
            Some(project) => project,
            None => {
                let next = first_open_project(&projects, state)?;
                info!("Starting project {}", next);
                state.current_project = Some(next);
                state.current_sample_index = 0;
                next
            }
        };

        let samples = dataset.samples_for(project);
        let exhausted = state.current_sample_index >= samples.len();
        if exhausted || state.is_completed(project) {
            if exhausted {
                info!(
                    "Project {} finished ({} samples)",
                    project,
                    samples.len()
                );
            }
            state.mark_completed(project);
            state.current_project = None;
            state.current_sample_index = 0;
            continue;
        }

        let item = samples[state.current_sample_index].clone();
        debug!(
            "Next work item: project {} sample {} ({}), index {}",
            item.project_number,
            item.sample_number,
            item.analysis_category,
            state.current_sample_index
        );
        return Some(item);
    }
}

fn first_open_project(projects: &[u64], state: &RunState) -> Option<u64> {
    let next = projects.iter().copied().find(|p| !state.is_completed(*p));
    if next.is_none() {
        info!("All {} projects completed", projects.len());
    }
    next
}

/// Move the cursor past the current sample.
pub fn advance(state: &mut RunState) {
    state.current_sample_index += 1;
}

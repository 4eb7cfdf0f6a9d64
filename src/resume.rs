use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::error::PersistResult;
use crate::frontier::Frontier;
use crate::model::WorkItem;

/// Where a run starts from.
pub enum ResumePlan {
    /// The input list was empty.
    NothingRequested,
    /// Every requested item is already complete.
    NothingToDo { completed: usize },
    Pending {
        frontier: Frontier,
        completed: usize,
    },
}

/// Read the input artifact: a JSON array of work items.
pub fn read_input(path: &Path) -> Result<Vec<WorkItem>> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let items = serde_json::from_str(&raw).with_context(|| format!("Malformed input {:?}", path))?;
    Ok(items)
}

/// Reconcile the raw input against what the checkpoint already holds and
/// store the resulting frontier.
///
/// The frontier is always recomputed as input minus completed, so a stored
/// frontier from a previous run can never bring back a finished item.
pub fn plan(store: &CheckpointStore, raw: Vec<WorkItem>) -> PersistResult<ResumePlan> {
    if raw.is_empty() {
        return Ok(ResumePlan::NothingRequested);
    }

    let done = store.completed_links()?;
    let requested = raw.len();
    let frontier = Frontier::load(raw, &done);
    store.replace_frontier(&frontier)?;

    info!(
        "Resume: {} requested, {} already complete, {} pending",
        requested,
        done.len(),
        frontier.len()
    );

    if frontier.is_empty() {
        return Ok(ResumePlan::NothingToDo {
            completed: done.len(),
        });
    }
    Ok(ResumePlan::Pending {
        frontier,
        completed: done.len(),
    })
}

// Persisted blob: the serialized form of the whole task list

use crate::task::{Task, TaskId};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Storage key the task list is saved under
pub const TASKS_KEY: &str = "@tasks";

/// One entry of the persisted array
///
/// Field names are part of the storage contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTask {
    pub text: String,
    pub completed: bool,
    #[serde(rename = "isEditing", default)]
    pub is_editing: bool,
}

/// Serialize the list, marking `editing` (if any) with `isEditing = true`
pub fn encode(tasks: &[Task], editing: Option<TaskId>) -> Result<String> {
    let stored: Vec<StoredTask> = tasks
        .iter()
        .map(|task| StoredTask {
            text: task.text.clone(),
            completed: task.completed,
            is_editing: editing == Some(task.id),
        })
        .collect();

    serde_json::to_string(&stored).context("Failed to serialize task list")
}

/// Parse a persisted blob back into its entries, in list order
pub fn decode(raw: &str) -> Result<Vec<StoredTask>> {
    serde_json::from_str(raw).context("Failed to deserialize task list")
}

// Task store: in-memory task list kept in sync with key-value storage

use crate::blob::{self, TASKS_KEY};
use crate::kv::KvStore;
use crate::task::{Task, TaskId};
use crate::writer::WriteQueue;
use eyre::{Result, eyre};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What `TaskStore::add` did with the submitted text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new task was appended
    Appended(TaskId),
    /// The task being edited got the new text and left edit mode
    Saved(TaskId),
    /// The text was blank; nothing changed
    Rejected,
}

/// Ordered task list plus the single task being edited, if any
///
/// Every mutation saves the whole list through the write queue. Saving never
/// blocks and never fails the mutation; failures are logged by the writer.
pub struct TaskStore {
    tasks: Vec<Task>,
    editing: Option<TaskId>,
    next_id: u64,
    kv: Arc<dyn KvStore>,
    writer: WriteQueue,
}

impl TaskStore {
    /// Create an empty store that persists under `TASKS_KEY`
    ///
    /// Call `load` to hydrate it from storage.
    pub fn new(kv: Arc<dyn KvStore>) -> Result<Self> {
        let writer = WriteQueue::spawn(Arc::clone(&kv))?;
        Ok(Self {
            tasks: Vec::new(),
            editing: None,
            next_id: 1,
            kv,
            writer,
        })
    }

    /// Create a store and load whatever is already saved
    pub fn open(kv: Arc<dyn KvStore>) -> Result<Self> {
        let mut store = Self::new(kv)?;
        store.load();
        Ok(store)
    }

    /// Replace in-memory state with the persisted list
    ///
    /// An absent key leaves the list empty. Unreadable or malformed data is
    /// logged and also leaves the list empty.
    pub fn load(&mut self) {
        self.tasks.clear();
        self.editing = None;

        let raw = match self.kv.get(TASKS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = TASKS_KEY, "No saved tasks yet");
                return;
            }
            Err(e) => {
                warn!(key = TASKS_KEY, error = ?e, "Failed to read saved tasks, starting empty");
                return;
            }
        };

        let stored = match blob::decode(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = TASKS_KEY, error = ?e, "Saved tasks are malformed, starting empty");
                return;
            }
        };

        for entry in stored {
            let id = self.allocate_id();
            if entry.is_editing {
                if self.editing.is_none() {
                    self.editing = Some(id);
                } else {
                    warn!(key = TASKS_KEY, text = %entry.text, "Dropping extra edit flag");
                }
            }
            self.tasks.push(Task {
                id,
                text: entry.text,
                completed: entry.completed,
            });
        }

        info!(key = TASKS_KEY, count = self.tasks.len(), "Loaded tasks");
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a task, or save the task being edited
    ///
    /// `text` is trimmed; blank text is rejected without touching storage.
    pub fn add(&mut self, text: &str) -> AddOutcome {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring blank task text");
            return AddOutcome::Rejected;
        }

        let outcome = match self.editing.take().and_then(|id| self.position(id)) {
            Some(index) => {
                let task = &mut self.tasks[index];
                task.text = text.to_string();
                AddOutcome::Saved(task.id)
            }
            None => {
                let id = self.allocate_id();
                self.tasks.push(Task::new(id, text));
                AddOutcome::Appended(id)
            }
        };

        debug!(?outcome, "add");
        self.save();
        outcome
    }

    /// Put `id` in edit mode, ending any other edit
    pub fn begin_edit(&mut self, id: TaskId) -> Result<()> {
        self.require(id)?;
        self.editing = Some(id);
        self.save();
        Ok(())
    }

    /// Flip the completion flag of `id`, returning the new value
    pub fn toggle_complete(&mut self, id: TaskId) -> Result<bool> {
        let index = self.require(id)?;
        let task = &mut self.tasks[index];
        task.completed = !task.completed;
        let completed = task.completed;
        self.save();
        Ok(completed)
    }

    /// Remove `id` from the list, returning the removed task
    pub fn delete(&mut self, id: TaskId) -> Result<Task> {
        let index = self.require(id)?;
        let task = self.tasks.remove(index);
        if self.editing == Some(id) {
            self.editing = None;
        }
        self.save();
        Ok(task)
    }

    /// Remove every completed task, keeping the rest in order
    ///
    /// Returns how many tasks were removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| !task.completed);
        if let Some(id) = self.editing
            && self.position(id).is_none()
        {
            self.editing = None;
        }
        let removed = before - self.tasks.len();
        debug!(removed, "clear_completed");
        self.save();
        removed
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Id of the task at zero-based `position`
    pub fn id_at(&self, position: usize) -> Option<TaskId> {
        self.tasks.get(position).map(|task| task.id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Id of the task currently in edit mode
    pub fn editing(&self) -> Option<TaskId> {
        self.editing
    }

    /// The task currently in edit mode
    pub fn editing_task(&self) -> Option<&Task> {
        self.editing.and_then(|id| self.get(id))
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.completed).count()
    }

    /// Wait for queued saves to reach storage
    pub fn flush(&self) {
        self.writer.flush();
    }

    /// Number of saves that failed during this session
    pub fn failed_saves(&self) -> u64 {
        self.writer.failed_writes()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    fn require(&self, id: TaskId) -> Result<usize> {
        self.position(id).ok_or_else(|| eyre!("Task not found: {}", id))
    }

    fn save(&self) {
        match blob::encode(&self.tasks, self.editing) {
            Ok(raw) => self.writer.submit(TASKS_KEY, raw),
            Err(e) => warn!(key = TASKS_KEY, error = ?e, "Failed to encode tasks, change not persisted"),
        }
    }
}

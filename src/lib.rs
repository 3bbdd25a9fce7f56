// tasklist - to-do list state with key-value persistence

pub mod blob;
pub mod config;
pub mod kv;
pub mod nav;
pub mod store;
pub mod task;
pub mod writer;

// Re-export main types for convenience
pub use blob::TASKS_KEY;
pub use config::Config;
pub use kv::{Backend, KvStore, open_backend};
pub use nav::{Navigator, Screen};
pub use store::{AddOutcome, TaskStore};
pub use task::{Task, TaskId};

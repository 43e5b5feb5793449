//! BackHub - Mirror git repositories with a live terminal display
//!
//! A pool of workers clones or refreshes bare mirrors while a shared
//! [`OutputManager`] repaints their progress in place and prints a summary
//! with a results table at the end.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

pub mod backup;
pub mod log;
pub mod output;

// Re-export commonly used types
pub use backup::{BackupConfig, BackupOptions, BackupRunner, GitClient, SyncOutcome};
pub use output::{OutputManager, SharedTable, Summary, Table, TaskStatus};

//! Repository mirroring
//!
//! Configuration loading, git plumbing and the worker pool that ties them to
//! the output manager.

pub mod config;
pub mod git;
pub mod runner;

pub use config::{BackupConfig, ConfigSource, DEFAULT_CONFIG_FILE};
pub use git::{GitClient, SyncOutcome};
pub use runner::{BackupOptions, BackupRunner, Settings, LOGISTICS, RESULTS_TABLE};

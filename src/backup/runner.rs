//! Backup run orchestration
//!
//! One `logistics` task narrates setup, then a fixed pool of workers pulls
//! repositories off a bounded channel and mirrors each one, reporting into
//! the shared [`OutputManager`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::config::{BackupConfig, ConfigSource};
use super::git::GitClient;
use crate::output::style::format_duration;
use crate::output::{OutputManager, SharedTable, Summary, TaskStatus};

/// Name of the task narrating setup and teardown
pub const LOGISTICS: &str = "logistics";

/// Name of the global results table
pub const RESULTS_TABLE: &str = "Backup Results";

/// Columns of the results table
pub const RESULTS_HEADERS: [&str; 3] = ["Repository", "Action", "Duration"];

/// Workers used when neither the flag nor the config sets one
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Appended to failures when no token is configured
const AUTH_HINT: &str = "repository might be private and require authentication";

/// Task name for a repository identifier
#[must_use]
pub fn task_name(repo: &str) -> String {
    format!("repo-{repo}")
}

/// Command-line overrides; `None` falls back to the config file, then to the
/// built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Worker count
    pub concurrency: Option<usize>,
    /// Stream lines kept per task
    pub max_stream_lines: Option<usize>,
    /// Mirror destination
    pub output_dir: Option<PathBuf>,
    /// Markdown file receiving the results table
    pub report: Option<PathBuf>,
}

/// Effective settings after merging flags, config and defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Worker count
    pub concurrency: usize,
    /// Stream lines kept per task, if overridden
    pub max_stream_lines: Option<usize>,
    /// Mirror destination
    pub output_dir: PathBuf,
}

impl BackupOptions {
    /// Merge with a loaded config
    #[must_use]
    pub fn resolve(&self, config: &BackupConfig) -> Settings {
        Settings {
            concurrency: self
                .concurrency
                .or(config.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY)
                .max(1),
            max_stream_lines: self.max_stream_lines.or(config.max_stream_lines),
            output_dir: self
                .output_dir
                .clone()
                .or_else(|| config.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// Drives one backup run
pub struct BackupRunner {
    manager: OutputManager,
    git: GitClient,
    options: BackupOptions,
}

impl BackupRunner {
    /// Runner reporting into `manager`
    #[must_use]
    pub const fn new(manager: OutputManager, git: GitClient, options: BackupOptions) -> Self {
        Self {
            manager,
            git,
            options,
        }
    }

    /// The manager this runner reports into
    #[must_use]
    pub const fn manager(&self) -> &OutputManager {
        &self.manager
    }

    /// Back up every repository named by `source` (a config path or a direct
    /// repository identifier).
    ///
    /// Individual repository failures are recorded in the summary, not
    /// returned. Errors are returned only when setup fails or the report
    /// cannot be written; the display is stopped either way.
    pub async fn run(&self, source: &str) -> Result<Summary> {
        self.setup();
        self.check_token();

        let config = match self.load_config(source) {
            Ok(config) => config,
            Err(err) => {
                self.manager.report_error(LOGISTICS, format!("{err:#}"));
                self.stop().await;
                return Err(err);
            }
        };

        let settings = self.options.resolve(&config);
        if let Some(max_lines) = settings.max_stream_lines {
            self.manager.set_max_stream_lines(max_lines);
        }
        self.manager
            .set_message(LOGISTICS, "Backup logistics completed");

        let results = self.manager.register_table(RESULTS_TABLE, RESULTS_HEADERS);
        self.execute(config.repos, &settings, &results).await;

        if let Some(path) = &self.options.report {
            if let Err(err) = write_report(&results, path) {
                self.manager.report_error(LOGISTICS, format!("{err:#}"));
                self.stop().await;
                return Err(err);
            }
            self.manager
                .add_stream_line(LOGISTICS, format!("Report written to {}", path.display()));
        }

        self.manager.set_message(LOGISTICS, "Backup process completed");
        self.manager.complete(LOGISTICS);
        self.stop().await;

        let summary = self.manager.summary();
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "backup run finished"
        );
        Ok(summary)
    }

    fn setup(&self) {
        self.manager.register(LOGISTICS);
        self.manager.set_message(LOGISTICS, "Setting up BackHub");
        self.manager.start_display();
    }

    fn check_token(&self) {
        if self.git.has_token() {
            self.manager.set_status(LOGISTICS, TaskStatus::Pending);
            self.manager.add_stream_line(LOGISTICS, "GitHub token is set");
        } else {
            self.manager
                .add_stream_line(LOGISTICS, "proceeding without GitHub token");
            self.manager.set_status(LOGISTICS, TaskStatus::Warning);
        }
    }

    fn load_config(&self, source: &str) -> Result<BackupConfig> {
        self.manager.add_stream_line(
            LOGISTICS,
            format!("Loading configuration from '{source}'"),
        );
        let (config, origin) = BackupConfig::load(source).inspect_err(|_| {
            self.manager
                .add_stream_line(LOGISTICS, "Failed to load configuration");
        })?;
        if let ConfigSource::Direct(_) = origin {
            self.manager.add_stream_line(
                LOGISTICS,
                "Direct repo specified, using it as configuration",
            );
        }
        self.manager.add_stream_line(
            LOGISTICS,
            format!("Loaded {} repositories", config.repos.len()),
        );
        debug!(?origin, repos = config.repos.len(), "configuration loaded");
        Ok(config)
    }

    async fn execute(&self, repos: Vec<String>, settings: &Settings, results: &SharedTable) {
        let count = repos.len();
        self.manager
            .set_message(LOGISTICS, format!("Processing {count} repositories"));

        let (tx, rx) = mpsc::channel::<String>(settings.concurrency);
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();

        workers.spawn(async move {
            for repo in repos {
                if tx.send(repo).await.is_err() {
                    break;
                }
            }
        });

        for id in 0..settings.concurrency.min(count) {
            let worker = Worker {
                manager: self.manager.clone(),
                git: self.git.clone(),
                output_dir: settings.output_dir.clone(),
                results: results.clone(),
                has_token: self.git.has_token(),
            };
            let rx = Arc::clone(&rx);
            workers.spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(repo) = next else {
                        break;
                    };
                    debug!(worker = id, %repo, "picked up repository");
                    worker.process(&repo).await;
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "backup worker panicked");
            }
        }
    }

    async fn stop(&self) {
        let manager = self.manager.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || manager.stop_display()).await {
            warn!(error = %err, "display shutdown panicked");
        }
    }
}

fn write_report(results: &SharedTable, path: &Path) -> Result<()> {
    results.write_markdown_table_to_file(path)?;
    info!(path = %path.display(), "report written");
    Ok(())
}

struct Worker {
    manager: OutputManager,
    git: GitClient,
    output_dir: PathBuf,
    results: SharedTable,
    has_token: bool,
}

impl Worker {
    async fn process(&self, repo: &str) {
        let task = task_name(repo);
        self.manager.register(&task);
        self.manager.set_message(&task, format!("Processing {repo}"));
        self.manager.set_status(&task, TaskStatus::Active);

        let start = Instant::now();
        let manager = self.manager.clone();
        let name = task.clone();
        let outcome = self
            .git
            .sync(repo, &self.output_dir, move |line: &str| {
                manager.add_stream_line(&name, line);
            })
            .await;
        let duration = format_duration(start.elapsed());

        match outcome {
            Ok(outcome) => {
                self.manager
                    .set_message(&task, format!("{repo} backed up successfully"));
                self.manager.complete(&task);
                self.results.add_row([repo, outcome.as_str(), duration.as_str()]);
            }
            Err(err) => {
                let error = if self.has_token {
                    format!("{err:#}")
                } else {
                    format!("{err:#} ({AUTH_HINT})")
                };
                warn!(%repo, %error, "backup failed");
                self.manager.report_error(&task, error);
                self.results.add_row([repo, "failed", duration.as_str()]);
            }
        }
    }
}

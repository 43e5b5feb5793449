//! BackHub - Mirror git repositories with a live terminal display
//!
//! CLI entry point.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

use backhub::backup::DEFAULT_CONFIG_FILE;
use backhub::output::DEFAULT_TICK;
use backhub::{BackupOptions, BackupRunner, GitClient, OutputManager};

/// Environment variable holding the access token
const TOKEN_VAR: &str = "GH_TOKEN";

/// Mirror git repositories listed in a config file
///
/// Each repository is cloned with `--mirror` on first run and fetched on
/// later runs. Set `GH_TOKEN` to reach private repositories.
#[derive(Parser, Debug)]
#[command(name = "backhub", version, about)]
struct Cli {
    /// Config file, or a single repository such as github.com/owner/name
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    source: String,

    /// Repositories processed at once [default: 5]
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Stream lines kept per repository [default: 15]
    #[arg(short = 'n', long = "max-lines")]
    max_lines: Option<usize>,

    /// Directory receiving the mirrors [default: .]
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,

    /// Keep every output line and list all errors at the end
    #[arg(short = 'u', long)]
    unlimited: bool,

    /// Display refresh interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Write the results table to this Markdown file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write diagnostic logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn validate(&self) -> Result<()> {
        if self.concurrency == Some(0) {
            bail!("--concurrency must be at least 1");
        }
        if self.max_lines == Some(0) {
            bail!("--max-lines must be at least 1");
        }
        if self.tick_ms == Some(0) {
            bail!("--tick-ms must be at least 1");
        }
        Ok(())
    }

    fn tick(&self) -> Duration {
        self.tick_ms.map_or(DEFAULT_TICK, Duration::from_millis)
    }

    fn options(&self) -> BackupOptions {
        BackupOptions {
            concurrency: self.concurrency,
            max_stream_lines: self.max_lines,
            output_dir: self.output_dir.clone(),
            report: self.report.clone(),
        }
    }
}

/// Read the token, treating an empty value as absent.
fn read_token() -> Option<String> {
    std::env::var(TOKEN_VAR).ok().filter(|t| !t.is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate()?;
    backhub::log::init(cli.log_file.as_deref())?;

    let manager = OutputManager::new(cli.max_lines.unwrap_or(0));
    manager.set_unlimited_output(cli.unlimited);
    manager.set_update_interval(cli.tick());

    let runner = BackupRunner::new(manager, GitClient::new(read_token()), cli.options());
    runner.run(&cli.source).await?;
    Ok(())
}

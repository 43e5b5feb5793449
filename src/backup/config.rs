//! Backup configuration
//!
//! Parses `.backhub.yaml` (or a `.toml` equivalent) into a list of repository
//! identifiers plus optional tuning knobs. A bare `host/owner/name` argument
//! is accepted in place of a file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;

/// Config file looked up when no source is given
pub const DEFAULT_CONFIG_FILE: &str = ".backhub.yaml";

/// Parsed backup configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Repository identifiers, e.g. `github.com/owner/name`
    pub repos: Vec<String>,
    /// Number of repositories processed at once
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Stream lines kept per task in bounded mode
    #[serde(default)]
    pub max_stream_lines: Option<usize>,
    /// Directory the mirrors are written to
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// Where the repository list came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from a config file
    File(PathBuf),
    /// A single repository given directly
    Direct(String),
}

fn direct_repo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.-]+\.[A-Za-z]{2,}/[^/\s]+/[^/\s]+$")
            .unwrap_or_else(|err| unreachable!("static pattern is valid: {err}"))
    })
}

/// Whether `source` looks like `host/owner/name`
#[must_use]
pub fn is_direct_repo(source: &str) -> bool {
    direct_repo_pattern().is_match(source)
}

impl BackupConfig {
    /// Resolve a source argument: an existing file is parsed, otherwise a
    /// direct repository identifier is accepted.
    pub fn load(source: &str) -> Result<(Self, ConfigSource)> {
        let path = Path::new(source);
        if path.is_file() {
            let config = Self::from_path(path)?;
            return Ok((config, ConfigSource::File(path.to_path_buf())));
        }
        if is_direct_repo(source) {
            return Ok((Self::single(source), ConfigSource::Direct(source.to_string())));
        }
        bail!("Config file not found and not a repository identifier: '{source}'")
    }

    /// Load and validate a config file, choosing the format by extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            Self::parse_toml(&content)
        } else {
            Self::parse_yaml(&content)
        };
        parsed.with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate YAML content
    pub fn parse_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
        config.validate()
    }

    /// Parse and validate TOML content
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate()
    }

    /// Configuration holding one repository and no overrides
    #[must_use]
    pub fn single(repo: &str) -> Self {
        Self {
            repos: vec![repo.to_string()],
            ..Self::default()
        }
    }

    /// Check the knobs and drop duplicate repositories, keeping the first.
    pub fn validate(mut self) -> Result<Self> {
        if self.repos.is_empty() {
            bail!("No repositories configured");
        }

        let mut seen = HashSet::new();
        let mut repos = Vec::with_capacity(self.repos.len());
        for repo in self.repos {
            let repo = repo.trim().to_string();
            if repo.is_empty() {
                bail!("Repository identifier cannot be empty");
            }
            if seen.insert(repo.clone()) {
                repos.push(repo);
            }
        }
        self.repos = repos;

        if self.concurrency == Some(0) {
            bail!("concurrency must be at least 1");
        }
        if self.max_stream_lines == Some(0) {
            bail!("max_stream_lines must be at least 1");
        }
        Ok(self)
    }
}

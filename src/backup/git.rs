//! Git mirror operations
//!
//! Builds `git` commands for cloning and refreshing bare mirrors and runs them
//! with their output streamed line by line to a callback.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;
use tracing::debug;

/// User name paired with the token in the basic auth header
const AUTH_USER: &str = "backhub";

/// Output lines kept for the error message of a failed command
const ERROR_TAIL: usize = 3;

/// What a sync did to the local mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Fresh mirror clone
    Cloned,
    /// Existing mirror fetched new refs
    Updated,
    /// Existing mirror had nothing to fetch
    UpToDate,
}

impl SyncOutcome {
    /// Lowercase label used in the results table
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cloned => "cloned",
            Self::Updated => "updated",
            Self::UpToDate => "up to date",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs git on behalf of the backup workers
#[derive(Debug, Clone, Default)]
pub struct GitClient {
    token: Option<String>,
}

impl GitClient {
    /// Client sending `token` (if any) as HTTP basic auth
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Whether a token is configured
    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Remote URL for an identifier: `https://<id>` unless it already has a
    /// scheme.
    #[must_use]
    pub fn remote_url(repo: &str) -> String {
        if repo.contains("://") {
            repo.to_string()
        } else {
            format!("https://{repo}")
        }
    }

    /// Local mirror folder: `<output_dir>/<last segment>.git`
    #[must_use]
    pub fn mirror_dir(output_dir: &Path, repo: &str) -> PathBuf {
        let last = repo
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(repo);
        let name = last.strip_suffix(".git").unwrap_or(last);
        output_dir.join(format!("{name}.git"))
    }

    /// `git` with prompts disabled and the auth header attached
    fn base_command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.stdin(Stdio::null());
        if let Some(token) = &self.token {
            let credentials = STANDARD.encode(format!("{AUTH_USER}:{token}"));
            cmd.arg("-c")
                .arg(format!("http.extraHeader=Authorization: Basic {credentials}"));
        }
        cmd
    }

    /// `git clone --mirror <url> <dir>`
    #[must_use]
    pub fn clone_command(&self, url: &str, dir: &Path) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("clone").arg("--mirror").arg(url).arg(dir);
        cmd
    }

    /// `git -C <dir> fetch --prune origin`
    #[must_use]
    pub fn fetch_command(&self, dir: &Path) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("-C").arg(dir).arg("fetch").arg("--prune").arg("origin");
        cmd
    }

    /// Clone `repo` into `output_dir`, or refresh the mirror already there.
    ///
    /// Progress lines are handed to `on_line` as they happen.
    pub async fn sync<F>(&self, repo: &str, output_dir: &Path, mut on_line: F) -> Result<SyncOutcome>
    where
        F: FnMut(&str) + Send,
    {
        let url = Self::remote_url(repo);
        let folder = Self::mirror_dir(output_dir, repo);

        if !folder.exists() {
            std::fs::create_dir_all(output_dir).with_context(|| {
                format!("Failed to create output directory: {}", output_dir.display())
            })?;
            on_line(&format!("Cloning {url} to {}", folder.display()));
            if let Err(err) = run_git(self.clone_command(&url, &folder), &mut on_line).await {
                on_line(&format!("Failed to clone repository: {err}"));
                return Err(err.context(format!("Failed to clone {url}")));
            }
            on_line("Clone completed successfully");
            return Ok(SyncOutcome::Cloned);
        }

        on_line(&format!("Updating existing repository at {}", folder.display()));
        let output = match run_git(self.fetch_command(&folder), &mut on_line).await {
            Ok(output) => output,
            Err(err) => {
                on_line(&format!("Failed to fetch updates: {err}"));
                return Err(err.context(format!("Failed to update {}", folder.display())));
            }
        };
        if output.is_empty() {
            on_line("Repository already up to date");
            Ok(SyncOutcome::UpToDate)
        } else {
            on_line("Repository updated successfully");
            Ok(SyncOutcome::Updated)
        }
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        // keep only the last carriage-return segment of progress output
        let line = line.rsplit('\r').next().unwrap_or_default().trim_end();
        if !line.is_empty() && tx.send(line.to_string()).is_err() {
            break;
        }
    }
}

/// Run a git command, forwarding stdout and stderr lines to `on_line` and
/// returning them. A non-zero exit is an error carrying the last few lines.
pub async fn run_git<F>(cmd: Command, on_line: &mut F) -> Result<Vec<String>>
where
    F: FnMut(&str) + Send,
{
    let mut tokio_cmd = TokioCommand::from(cmd);
    tokio_cmd.stdout(Stdio::piped());
    tokio_cmd.stderr(Stdio::piped());
    tokio_cmd.kill_on_drop(true);

    let mut child = tokio_cmd.spawn().context("Failed to spawn git")?;
    let child_stdout = child.stdout.take().context("Failed to capture stdout")?;
    let child_stderr = child.stderr.take().context("Failed to capture stderr")?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let stdout_handle = tokio::spawn(forward_lines(child_stdout, tx.clone()));
    let stderr_handle = tokio::spawn(forward_lines(child_stderr, tx));

    let mut captured = Vec::new();
    while let Some(line) = rx.recv().await {
        on_line(&line);
        captured.push(line);
    }

    let status = child.wait().await.context("Failed waiting for git")?;
    stdout_handle.await.context("stdout reader panicked")?;
    stderr_handle.await.context("stderr reader panicked")?;
    debug!(code = ?status.code(), lines = captured.len(), "git finished");

    if !status.success() {
        let code = status
            .code()
            .map_or_else(|| "unknown".to_string(), |c| c.to_string());
        let tail = captured[captured.len().saturating_sub(ERROR_TAIL)..].join("; ");
        if tail.is_empty() {
            bail!("git exited with code {code}");
        }
        bail!("git exited with code {code}: {tail}");
    }
    Ok(captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_remote_url_adds_https() {
        assert_eq!(
            GitClient::remote_url("github.com/a/b"),
            "https://github.com/a/b"
        );
    }

    #[test]
    fn test_remote_url_keeps_scheme() {
        assert_eq!(
            GitClient::remote_url("file:///tmp/src.git"),
            "file:///tmp/src.git"
        );
    }

    #[test]
    fn test_mirror_dir_uses_last_segment() {
        let dir = GitClient::mirror_dir(Path::new("/backups"), "github.com/owner/name");
        assert_eq!(dir, PathBuf::from("/backups/name.git"));
    }

    #[test]
    fn test_mirror_dir_does_not_double_suffix() {
        let dir = GitClient::mirror_dir(Path::new("."), "file:///tmp/src.git/");
        assert_eq!(dir, PathBuf::from("./src.git"));
    }

    #[test]
    fn test_clone_command_without_token() {
        let client = GitClient::new(None);
        let cmd = client.clone_command("https://github.com/a/b", Path::new("b.git"));
        assert_eq!(cmd.get_program(), "git");
        assert_eq!(
            args(&cmd),
            vec!["clone", "--mirror", "https://github.com/a/b", "b.git"]
        );
    }

    #[test]
    fn test_token_goes_in_header_not_url() {
        let client = GitClient::new(Some("s3cret".to_string()));
        let cmd = client.clone_command("https://github.com/a/b", Path::new("b.git"));
        let args = args(&cmd);
        let expected = format!(
            "http.extraHeader=Authorization: Basic {}",
            STANDARD.encode("backhub:s3cret")
        );
        assert_eq!(args[0], "-c");
        assert_eq!(args[1], expected);
        assert!(args.iter().all(|a| !a.contains("s3cret")));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let client = GitClient::new(Some("  ".to_string()));
        assert!(!client.has_token());
    }

    #[test]
    fn test_fetch_command_args() {
        let client = GitClient::new(None);
        let cmd = client.fetch_command(Path::new("/m/b.git"));
        assert_eq!(args(&cmd), vec!["-C", "/m/b.git", "fetch", "--prune", "origin"]);
    }

    #[test]
    fn test_sync_outcome_labels() {
        assert_eq!(SyncOutcome::Cloned.to_string(), "cloned");
        assert_eq!(SyncOutcome::Updated.to_string(), "updated");
        assert_eq!(SyncOutcome::UpToDate.to_string(), "up to date");
    }

    #[tokio::test]
    async fn test_run_git_streams_lines() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err >&2");
        let mut seen = Vec::new();
        let lines = run_git(cmd, &mut |l: &str| seen.push(l.to_string()))
            .await
            .unwrap();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["err", "out"]);
        assert_eq!(seen, lines);
    }

    #[tokio::test]
    async fn test_run_git_failure_includes_tail() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo 'fatal: repository not found' >&2; exit 128");
        let err = run_git(cmd, &mut |_: &str| {}).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("128"));
        assert!(msg.contains("repository not found"));
    }
}

//! Task records tracked by the output manager

use std::collections::{BTreeMap, VecDeque};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use super::table::SharedTable;

/// Status of a tracked task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Registered, nothing reported yet
    Pending,
    /// Working, no particular overlay
    Active,
    /// Working, with a warning overlay
    Warning,
    /// Finished successfully
    Success,
    /// Finished with an error
    Error,
}

impl TaskStatus {
    /// Lowercase name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Warning => "warning",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Infallible;

    /// Unknown names map to [`TaskStatus::Active`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "warning" | "warn" => Self::Warning,
            "success" | "pass" => Self::Success,
            "error" | "fail" => Self::Error,
            _ => Self::Active,
        })
    }
}

/// Render grouping of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Has a status or message, not complete
    Active,
    /// Pending status and no message yet
    Pending,
    /// Terminal (success or error)
    Completed,
}

/// Internal record of one task. Only the manager holds these.
#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub(crate) name: String,
    pub(crate) status: TaskStatus,
    pub(crate) message: String,
    pub(crate) lines: VecDeque<String>,
    pub(crate) complete: bool,
    pub(crate) start_time: Instant,
    pub(crate) last_updated: Instant,
    pub(crate) index: u64,
    pub(crate) tables: BTreeMap<String, SharedTable>,
}

impl TaskRecord {
    pub(crate) fn new(name: String, index: u64) -> Self {
        let now = Instant::now();
        Self {
            name,
            status: TaskStatus::Pending,
            message: String::new(),
            lines: VecDeque::new(),
            complete: false,
            start_time: now,
            last_updated: now,
            index,
            tables: BTreeMap::new(),
        }
    }

    pub(crate) fn bucket(&self) -> Bucket {
        if self.complete {
            Bucket::Completed
        } else if self.status == TaskStatus::Pending && self.message.is_empty() {
            Bucket::Pending
        } else {
            Bucket::Active
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Instant::now();
    }

    /// Append lines, evicting the oldest beyond `bound` (None = unlimited).
    pub(crate) fn push_lines<I>(&mut self, lines: I, bound: Option<usize>)
    where
        I: IntoIterator<Item = String>,
    {
        self.lines.extend(lines);
        if let Some(max) = bound {
            let excess = self.lines.len().saturating_sub(max);
            self.lines.drain(..excess);
        }
    }

    /// Running time for live tasks, total duration for completed ones.
    pub(crate) fn elapsed(&self) -> Duration {
        if self.complete {
            self.last_updated.duration_since(self.start_time)
        } else {
            self.start_time.elapsed()
        }
    }

    pub(crate) fn view(&self) -> TaskView {
        TaskView {
            name: self.name.clone(),
            status: self.status,
            message: self.message.clone(),
            lines: self.lines.iter().cloned().collect(),
            complete: self.complete,
            elapsed: self.elapsed(),
            index: self.index,
        }
    }
}

/// Point-in-time copy of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskView {
    /// Registry key
    pub name: String,
    /// Status at snapshot time
    pub status: TaskStatus,
    /// Headline message
    pub message: String,
    /// Retained stream lines, oldest first
    pub lines: Vec<String>,
    /// Whether the task reached a terminal state
    pub complete: bool,
    /// Time since start (live) or total duration (completed)
    pub elapsed: Duration,
    /// Registration sequence number
    pub index: u64,
}

/// Snapshot of all tasks split into render buckets, each in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets {
    /// Tasks in progress
    pub active: Vec<TaskView>,
    /// Tasks waiting for their first update
    pub pending: Vec<TaskView>,
    /// Finished tasks
    pub completed: Vec<TaskView>,
}

impl Buckets {
    pub(crate) fn collect<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a TaskRecord>,
    {
        let mut records: Vec<&TaskRecord> = records.into_iter().collect();
        records.sort_by_key(|r| r.index);

        let mut buckets = Self::default();
        for record in records {
            let view = record.view();
            match record.bucket() {
                Bucket::Active => buckets.active.push(view),
                Bucket::Pending => buckets.pending.push(view),
                Bucket::Completed => buckets.completed.push(view),
            }
        }
        buckets
    }

    /// Total number of tasks across buckets
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len() + self.pending.len() + self.completed.len()
    }

    /// Whether no task is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names in render order: active, pending, completed
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.active
            .iter()
            .chain(&self.pending)
            .chain(&self.completed)
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// One entry of the run-wide error log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Task that reported the error
    pub task: String,
    /// Rendered error text
    pub error: String,
    /// When it was reported
    pub time: DateTime<Local>,
}

/// Aggregate counts for the end-of-run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Every tracked task
    pub total: usize,
    /// Tasks with success status
    pub succeeded: usize,
    /// Tasks with error status
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(record: &TaskRecord) -> Vec<&str> {
        record.lines.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_status_from_str_aliases() {
        assert_eq!("pass".parse::<TaskStatus>().unwrap(), TaskStatus::Success);
        assert_eq!("fail".parse::<TaskStatus>().unwrap(), TaskStatus::Error);
        assert_eq!("Warning".parse::<TaskStatus>().unwrap(), TaskStatus::Warning);
        assert_eq!("pending".parse::<TaskStatus>().unwrap(), TaskStatus::Pending);
        assert_eq!("cloning".parse::<TaskStatus>().unwrap(), TaskStatus::Active);
    }

    #[test]
    fn test_status_display_round_trips() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Active,
            TaskStatus::Warning,
            TaskStatus::Success,
            TaskStatus::Error,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_new_record_is_pending_bucket() {
        let record = TaskRecord::new("a".to_string(), 1);
        assert_eq!(record.bucket(), Bucket::Pending);
    }

    #[test]
    fn test_message_moves_record_to_active() {
        let mut record = TaskRecord::new("a".to_string(), 1);
        record.message = "working".to_string();
        assert_eq!(record.bucket(), Bucket::Active);
    }

    #[test]
    fn test_status_moves_record_to_active() {
        let mut record = TaskRecord::new("a".to_string(), 1);
        record.status = TaskStatus::Warning;
        assert_eq!(record.bucket(), Bucket::Active);
    }

    #[test]
    fn test_complete_wins_over_pending() {
        let mut record = TaskRecord::new("a".to_string(), 1);
        record.complete = true;
        assert_eq!(record.bucket(), Bucket::Completed);
    }

    #[test]
    fn test_push_lines_keeps_most_recent() {
        let mut record = TaskRecord::new("a".to_string(), 1);
        for n in 1..=5 {
            record.push_lines([n.to_string()], Some(3));
            assert!(record.lines.len() <= 3);
        }
        assert_eq!(lines(&record), vec!["3", "4", "5"]);
    }

    #[test]
    fn test_push_lines_batch_larger_than_bound() {
        let mut record = TaskRecord::new("a".to_string(), 1);
        record.push_lines(["x".to_string()], Some(2));
        record.push_lines(["1", "2", "3"].map(String::from), Some(2));
        assert_eq!(lines(&record), vec!["2", "3"]);
    }

    #[test]
    fn test_push_lines_unbounded() {
        let mut record = TaskRecord::new("a".to_string(), 1);
        record.push_lines((0..100).map(|n| n.to_string()), None);
        assert_eq!(record.lines.len(), 100);
    }

    #[test]
    fn test_buckets_sorted_by_index() {
        let mut c = TaskRecord::new("c".to_string(), 3);
        c.message = "busy".to_string();
        let a = TaskRecord::new("a".to_string(), 1);
        let mut b = TaskRecord::new("b".to_string(), 2);
        b.message = "busy".to_string();

        let buckets = Buckets::collect([&c, &a, &b]);
        assert_eq!(buckets.names(), vec!["b", "c", "a"]);
        assert_eq!(buckets.len(), 3);
    }
}

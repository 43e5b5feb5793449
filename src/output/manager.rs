//! Concurrent output manager
//!
//! A registry of named tasks that any number of threads can update, plus one
//! background loop that repaints the aggregate state in place. Callers never
//! write to the terminal themselves; every write goes through the shared
//! [`Terminal`] so two writers can't interleave.
//!
//! Writes to a task that already completed (or failed) are ignored, so the
//! final state seen in the summary is the state at completion.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::io::Write;
use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Local;
use tracing::{debug, trace};

use super::render::{self, TaskTables};
use super::style::{debug_message, progress_bar, PROGRESS_BAR_WIDTH};
use super::table::{SharedTable, Table};
use super::task::{Buckets, ErrorReport, Summary, TaskRecord, TaskStatus};
use super::terminal::Terminal;

/// Stream lines kept per task unless told otherwise
pub const DEFAULT_MAX_STREAM_LINES: usize = 15;

/// Repaint interval of the display loop
pub const DEFAULT_TICK: Duration = Duration::from_millis(200);

#[derive(Debug)]
struct State {
    tasks: HashMap<String, TaskRecord>,
    tables: BTreeMap<String, SharedTable>,
    errors: Vec<ErrorReport>,
    registered: u64,
    max_lines: usize,
    unlimited: bool,
    tables_displayed: bool,
}

impl State {
    const fn line_bound(&self) -> Option<usize> {
        if self.unlimited {
            None
        } else {
            Some(self.max_lines)
        }
    }

    /// Mutable access to a task that is still live.
    fn live_task(&mut self, name: &str) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(name).filter(|task| !task.complete)
    }
}

#[derive(Debug)]
struct Control {
    tick: Duration,
    running: bool,
    paused: bool,
    /// The loop has seen `paused` and is idle
    parked: bool,
    stopping: bool,
    /// Final output has been (or is being) produced
    finished: bool,
}

struct Shared {
    state: RwLock<State>,
    terminal: Mutex<Terminal>,
    control: Mutex<Control>,
    wake: Condvar,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Thread-safe registry of tasks with a live terminal display.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct OutputManager {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OutputManager {
    /// Manager drawing to standard output, keeping `max_lines` stream lines
    /// per task (zero selects the default).
    #[must_use]
    pub fn new(max_lines: usize) -> Self {
        Self::with_terminal(max_lines, Terminal::stdout())
    }

    /// Manager drawing to an arbitrary writer
    #[must_use]
    pub fn with_writer<W: Write + Send + 'static>(max_lines: usize, writer: W) -> Self {
        Self::with_terminal(max_lines, Terminal::new(Box::new(writer)))
    }

    /// Manager drawing to a prepared terminal
    #[must_use]
    pub fn with_terminal(max_lines: usize, terminal: Terminal) -> Self {
        let max_lines = if max_lines == 0 {
            DEFAULT_MAX_STREAM_LINES
        } else {
            max_lines
        };
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State {
                    tasks: HashMap::new(),
                    tables: BTreeMap::new(),
                    errors: Vec::new(),
                    registered: 0,
                    max_lines,
                    unlimited: false,
                    tables_displayed: false,
                }),
                terminal: Mutex::new(terminal),
                control: Mutex::new(Control {
                    tick: DEFAULT_TICK,
                    running: false,
                    paused: false,
                    parked: false,
                    stopping: false,
                    finished: false,
                }),
                wake: Condvar::new(),
                handle: Mutex::new(None),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn terminal(&self) -> MutexGuard<'_, Terminal> {
        lock(&self.shared.terminal)
    }

    // --- settings ---

    /// Keep every stream line and enable the detailed end-of-run dump
    pub fn set_unlimited_output(&self, unlimited: bool) {
        self.write().unlimited = unlimited;
    }

    /// Whether unlimited-output mode is on
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.read().unlimited
    }

    /// Change the per-task stream line bound. Zero is ignored.
    ///
    /// Existing rings shrink on their next append.
    pub fn set_max_stream_lines(&self, max_lines: usize) {
        if max_lines > 0 {
            self.write().max_lines = max_lines;
        }
    }

    /// Repaint interval for display loops started after this call
    pub fn set_update_interval(&self, interval: Duration) {
        lock(&self.shared.control).tick = interval;
    }

    // --- task lifecycle ---

    /// Start tracking `name` as a fresh pending task.
    ///
    /// An existing task with the same name is replaced, history included.
    pub fn register(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.write();
        state.registered += 1;
        let index = state.registered;
        trace!(task = %name, index, "register");
        state
            .tasks
            .insert(name.clone(), TaskRecord::new(name, index));
    }

    /// Replace the headline message of a task
    pub fn set_message(&self, name: &str, message: impl Into<String>) {
        let mut state = self.write();
        if let Some(task) = state.live_task(name) {
            task.message = message.into();
            task.touch();
        }
    }

    /// Set the status of a live task.
    ///
    /// `Success` finishes it like [`complete`](Self::complete). `Error`
    /// finishes it like [`report_error`](Self::report_error), reporting the
    /// current message.
    pub fn set_status(&self, name: &str, status: TaskStatus) {
        match status {
            TaskStatus::Success => self.complete(name),
            TaskStatus::Error => {
                let Some(message) = self.live_message(name) else {
                    return;
                };
                let error = if message.is_empty() { "failed".to_string() } else { message };
                self.report_error(name, error);
            }
            _ => {
                let mut state = self.write();
                if let Some(task) = state.live_task(name) {
                    task.status = status;
                    task.touch();
                }
            }
        }
    }

    fn live_message(&self, name: &str) -> Option<String> {
        self.write().live_task(name).map(|task| task.message.clone())
    }

    /// Mark a task as successfully finished.
    ///
    /// Stream lines are dropped unless unlimited mode is on.
    pub fn complete(&self, name: &str) {
        let mut state = self.write();
        let unlimited = state.unlimited;
        if let Some(task) = state.live_task(name) {
            if !unlimited {
                task.lines.clear();
            }
            task.complete = true;
            task.status = TaskStatus::Success;
            task.touch();
        }
    }

    /// Mark a task as failed and record the error in the run's error log.
    ///
    /// Stream lines are kept.
    pub fn report_error(&self, name: &str, err: impl Display) {
        let error = err.to_string();
        let mut state = self.write();
        let Some(task) = state.live_task(name) else {
            return;
        };
        task.complete = true;
        task.status = TaskStatus::Error;
        task.message = format!("Error: {error}");
        task.touch();
        debug!(task = name, %error, "task failed");
        state.errors.push(ErrorReport {
            task: name.to_string(),
            error,
            time: Local::now(),
        });
    }

    /// Append stream lines, evicting the oldest beyond the bound
    pub fn update_stream_output<I, S>(&self, name: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.write();
        let bound = state.line_bound();
        if let Some(task) = state.live_task(name) {
            task.push_lines(lines.into_iter().map(Into::into), bound);
            task.touch();
        }
    }

    /// Append one stream line
    pub fn add_stream_line(&self, name: &str, line: impl Into<String>) {
        self.update_stream_output(name, [line.into()]);
    }

    /// Replace a task's stream lines with a single progress bar.
    ///
    /// `percentage` is clamped to 0..=100.
    pub fn add_progress_bar(&self, name: &str, percentage: f64, text: &str) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = percentage.clamp(0.0, 100.0).round() as u64;
        let line = debug_message(&format!(
            "{} - {text}",
            progress_bar(percent, 100, PROGRESS_BAR_WIDTH)
        ));
        let mut state = self.write();
        if let Some(task) = state.live_task(name) {
            task.lines.clear();
            task.lines.push_back(line);
            task.touch();
        }
    }

    /// Empty the message and stream lines of a live task
    pub fn clear_task(&self, name: &str) {
        let mut state = self.write();
        if let Some(task) = state.live_task(name) {
            task.message.clear();
            task.lines.clear();
            task.touch();
        }
    }

    /// [`clear_task`](Self::clear_task) for every live task
    pub fn clear_all(&self) {
        let mut state = self.write();
        for task in state.tasks.values_mut().filter(|t| !t.complete) {
            task.message.clear();
            task.lines.clear();
            task.touch();
        }
    }

    /// Stop tracking a task
    pub fn remove(&self, name: &str) {
        self.write().tasks.remove(name);
    }

    /// Stop tracking every finished task
    pub fn remove_completed(&self) {
        self.write().tasks.retain(|_, task| !task.complete);
    }

    // --- queries ---

    /// Current status, or `None` for an unknown task
    #[must_use]
    pub fn status(&self, name: &str) -> Option<TaskStatus> {
        self.read().tasks.get(name).map(|t| t.status)
    }

    /// Current headline message
    #[must_use]
    pub fn message(&self, name: &str) -> Option<String> {
        self.read().tasks.get(name).map(|t| t.message.clone())
    }

    /// Copy of the retained stream lines (empty for unknown tasks)
    #[must_use]
    pub fn stream_lines(&self, name: &str) -> Vec<String> {
        self.read()
            .tasks
            .get(name)
            .map(|t| t.lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every task, grouped and ordered for rendering
    #[must_use]
    pub fn buckets(&self) -> Buckets {
        Buckets::collect(self.read().tasks.values())
    }

    /// Aggregate counts over all tracked tasks
    #[must_use]
    pub fn summary(&self) -> Summary {
        let state = self.read();
        let count = |status: TaskStatus| {
            state
                .tasks
                .values()
                .filter(|t| t.status == status)
                .count()
        };
        Summary {
            total: state.tasks.len(),
            succeeded: count(TaskStatus::Success),
            failed: count(TaskStatus::Error),
        }
    }

    /// Copy of the error log, oldest first
    #[must_use]
    pub fn errors(&self) -> Vec<ErrorReport> {
        self.read().errors.clone()
    }

    // --- tables ---

    /// Create (or replace) a global table and return a handle to it
    pub fn register_table<I, S>(&self, name: impl Into<String>, headers: I) -> SharedTable
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = SharedTable::new(Table::new(headers));
        self.write().tables.insert(name.into(), table.clone());
        table
    }

    /// Create (or replace) a table scoped to a task. `None` if the task is
    /// unknown.
    pub fn register_task_table<I, S>(
        &self,
        task: &str,
        name: impl Into<String>,
        headers: I,
    ) -> Option<SharedTable>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.write();
        let record = state.tasks.get_mut(task)?;
        let table = SharedTable::new(Table::new(headers));
        record.tables.insert(name.into(), table.clone());
        Some(table)
    }

    /// Handle to a global table
    #[must_use]
    pub fn table(&self, name: &str) -> Option<SharedTable> {
        self.read().tables.get(name).cloned()
    }

    /// Handle to a task-scoped table
    #[must_use]
    pub fn task_table(&self, task: &str, name: &str) -> Option<SharedTable> {
        self.read()
            .tasks
            .get(task)
            .and_then(|t| t.tables.get(name).cloned())
    }

    /// Forget a global table
    pub fn remove_table(&self, name: &str) {
        self.write().tables.remove(name);
    }

    /// Draw one global table in place of the current block.
    ///
    /// While the display loop runs, the next tick paints over it; call
    /// [`pause`](Self::pause) first to keep it on screen.
    pub fn display_table(&self, name: &str, inner_dividers: bool) {
        let Some(table) = self.table(name) else {
            return;
        };
        let table = table.snapshot();
        let mut terminal = self.terminal();
        let frame = table.format_table_with_width(inner_dividers, terminal.width());
        terminal.redraw(&frame);
    }

    // --- rendering ---

    /// Repaint the live block once.
    ///
    /// The display loop calls this on every tick. Calling it directly is safe
    /// but only useful when no loop is running.
    pub fn update_display(&self) {
        let (frame, task_count) = {
            let state = self.read();
            let buckets = Buckets::collect(state.tasks.values());
            (render::task_frame(&buckets, state.unlimited), buckets.len())
        };
        trace!(tasks = task_count, "repaint");
        self.terminal().redraw(&frame);
    }

    /// Erase the last `n` rows of the live block
    pub fn clear_lines(&self, n: usize) {
        self.terminal().clear_lines(n);
    }

    /// Clear the whole screen
    pub fn clear_screen(&self) {
        self.terminal().clear_screen();
    }

    /// Print every global and task table once, below the live block
    pub fn display_tables(&self) {
        let (global, per_task) = {
            let mut state = self.write();
            state.tables_displayed = true;
            collect_tables(&state)
        };
        let mut terminal = self.terminal();
        let dump = render::tables_dump(&global, &per_task, terminal.width());
        terminal.append(&dump);
    }

    /// Print the aggregate counts, then any tables not yet shown, then (in
    /// unlimited mode) every reported error with its time and task.
    pub fn show_summary(&self) {
        let summary = self.summary();
        let (tables, unlimited, errors) = {
            let mut state = self.write();
            let tables = if state.tables_displayed {
                None
            } else {
                state.tables_displayed = true;
                Some(collect_tables(&state))
            };
            (tables, state.unlimited, state.errors.clone())
        };

        let mut terminal = self.terminal();
        let mut out = render::summary_block(&summary);
        if let Some((global, per_task)) = tables {
            out.push_str(&render::tables_dump(&global, &per_task, terminal.width()));
        }
        if unlimited {
            out.push_str(&render::error_dump(&errors));
        }
        terminal.append(&out);
    }

    // --- display loop ---

    /// Start the background display loop. No-op if one is already running.
    pub fn start_display(&self) {
        let mut control = lock(&self.shared.control);
        if control.running {
            return;
        }
        control.running = true;
        control.stopping = false;
        control.parked = false;
        control.finished = false;
        let tick = control.tick;

        let manager = self.clone();
        let spawned = thread::Builder::new()
            .name("backhub-display".to_string())
            .spawn(move || manager.display_loop(tick));
        match spawned {
            Ok(handle) => *lock(&self.shared.handle) = Some(handle),
            Err(err) => {
                debug!(error = %err, "failed to spawn display thread");
                control.running = false;
            }
        }
    }

    fn display_loop(&self, tick: Duration) {
        let shared = &self.shared;
        let mut control = lock(&shared.control);
        loop {
            if control.stopping {
                break;
            }
            if control.paused {
                control.parked = true;
                shared.wake.notify_all();
                control = shared
                    .wake
                    .wait(control)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }

            let (guard, timeout) = shared
                .wake
                .wait_timeout(control, tick)
                .unwrap_or_else(PoisonError::into_inner);
            control = guard;
            if timeout.timed_out() && !control.paused && !control.stopping {
                drop(control);
                self.update_display();
                control = lock(&shared.control);
            }
        }
        control.running = false;
        control.parked = false;
        shared.wake.notify_all();
        drop(control);

        self.final_output();
    }

    /// Suspend automatic repaints.
    ///
    /// Returns once the loop is idle, so the caller may write to the terminal
    /// (for example with [`display_table`](Self::display_table)) without
    /// racing a repaint. Only one caller should hold the pause at a time.
    pub fn pause(&self) {
        let mut control = lock(&self.shared.control);
        if control.paused {
            return;
        }
        control.paused = true;
        control.parked = false;
        self.shared.wake.notify_all();
        while control.running && !control.parked && !control.stopping {
            control = self
                .shared
                .wake
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Resume automatic repaints after [`pause`](Self::pause)
    pub fn resume(&self) {
        let mut control = lock(&self.shared.control);
        if !control.paused {
            return;
        }
        control.paused = false;
        control.parked = false;
        self.shared.wake.notify_all();
    }

    /// Whether repaints are currently paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        lock(&self.shared.control).paused
    }

    /// Stop the display loop and wait for it to exit.
    ///
    /// The loop paints one final frame, dumps the tables and prints the
    /// summary before this returns. If no loop was ever started the same
    /// final output is produced on the calling thread. Further calls are
    /// no-ops.
    pub fn stop_display(&self) {
        let handle = {
            let mut control = lock(&self.shared.control);
            if control.finished {
                return;
            }
            control.finished = true;
            control.stopping = true;
            self.shared.wake.notify_all();
            lock(&self.shared.handle).take()
        };

        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    debug!("display thread panicked");
                }
            }
            None => self.final_output(),
        }
    }

    fn final_output(&self) {
        self.update_display();
        self.display_tables();
        self.show_summary();
    }
}

fn collect_tables(state: &State) -> (Vec<(String, Table)>, Vec<TaskTables>) {
    let global = state
        .tables
        .iter()
        .map(|(name, table)| (name.clone(), table.snapshot()))
        .collect();

    let mut tasks: Vec<&TaskRecord> = state.tasks.values().collect();
    tasks.sort_by_key(|t| t.index);
    let per_task = tasks
        .into_iter()
        .map(|task| TaskTables {
            task: task.name.clone(),
            tables: task
                .tables
                .iter()
                .map(|(name, table)| (name.clone(), table.snapshot()))
                .collect(),
        })
        .collect();

    (global, per_task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::terminal::CaptureBuffer;

    fn manager() -> OutputManager {
        OutputManager::with_writer(2, CaptureBuffer::new())
    }

    #[test]
    fn test_zero_max_lines_selects_default() {
        let manager = OutputManager::with_writer(0, CaptureBuffer::new());
        assert_eq!(manager.read().max_lines, DEFAULT_MAX_STREAM_LINES);
    }

    #[test]
    fn test_line_bound_follows_unlimited_flag() {
        let manager = manager();
        assert_eq!(manager.read().line_bound(), Some(2));
        manager.set_unlimited_output(true);
        assert_eq!(manager.read().line_bound(), None);
    }

    #[test]
    fn test_set_max_stream_lines_ignores_zero() {
        let manager = manager();
        manager.set_max_stream_lines(0);
        assert_eq!(manager.read().max_lines, 2);
        manager.set_max_stream_lines(9);
        assert_eq!(manager.read().max_lines, 9);
    }

    #[test]
    fn test_live_task_skips_completed() {
        let manager = manager();
        manager.register("a");
        manager.complete("a");
        assert!(manager.write().live_task("a").is_none());
        assert!(manager.write().live_task("missing").is_none());
    }

    #[test]
    fn test_terminal_status_finishes_task() {
        let manager = manager();
        manager.register("a");
        manager.register("b");
        manager.set_message("b", "cloning");
        manager.set_status("a", TaskStatus::Success);
        manager.set_status("b", TaskStatus::Error);

        let buckets = manager.buckets();
        assert_eq!(buckets.completed.len(), 2);
        assert!(buckets.active.is_empty() && buckets.pending.is_empty());
        let errors = manager.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].task, "b");
        assert_eq!(errors[0].error, "cloning");

        manager.set_message("a", "late");
        manager.set_status("b", TaskStatus::Warning);
        assert_eq!(manager.message("a").as_deref(), Some(""));
        assert_eq!(manager.status("b"), Some(TaskStatus::Error));
    }

    #[test]
    fn test_error_status_without_message_reports_failed() {
        let manager = manager();
        manager.register("a");
        manager.set_status("a", TaskStatus::Error);
        manager.set_status("a", TaskStatus::Error);
        let errors = manager.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error, "failed");
    }

    #[test]
    fn test_collect_tables_orders_tasks_by_registration() {
        let manager = manager();
        for name in ["zeta", "alpha"] {
            manager.register(name);
            manager.register_task_table(name, "T", ["H"]);
        }
        let (global, per_task) = collect_tables(&manager.read());
        assert!(global.is_empty());
        let order: Vec<&str> = per_task.iter().map(|t| t.task.as_str()).collect();
        assert_eq!(order, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_update_interval_applies_to_loop() {
        let manager = manager();
        manager.set_update_interval(Duration::from_millis(7));
        assert_eq!(lock(&manager.shared.control).tick, Duration::from_millis(7));
    }
}

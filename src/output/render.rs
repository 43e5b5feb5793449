//! Frame builders for the live block and the end-of-run dumps
//!
//! Everything here is pure: it turns snapshots into strings. Writing them to
//! the terminal is the manager's job.

use std::fmt::Write as _;

use colored::Colorize;

use super::style::{format_duration, status_glyph, Tone, BASE_PADDING};
use super::table::Table;
use super::task::{Buckets, ErrorReport, Summary, TaskStatus, TaskView};

/// Indentation of stream lines under their task
const STREAM_INDENT: usize = BASE_PADDING + 4;

fn pad(n: usize) -> String {
    " ".repeat(n)
}

fn push_stream_lines(out: &mut String, lines: &[String]) {
    let indent = pad(STREAM_INDENT);
    for line in lines {
        let _ = writeln!(out, "{indent}{}", Tone::Stream.paint(line));
    }
}

fn push_active(out: &mut String, number: usize, task: &TaskView) {
    let tone = Tone::for_status(task.status);
    let timer = format!("[{}]", format_duration(task.elapsed));
    let _ = writeln!(
        out,
        "{}{} {} {} {}",
        pad(BASE_PADDING),
        tone.paint(&format!("{number}.")),
        status_glyph(task.status),
        Tone::Debug.paint(&timer),
        tone.paint(&task.message),
    );
    push_stream_lines(out, &task.lines);
}

fn push_pending(out: &mut String, number: usize, task: &TaskView) {
    let _ = writeln!(
        out,
        "{}{} {} {}",
        pad(BASE_PADDING),
        Tone::Pending.paint(&format!("{number}.")),
        status_glyph(task.status),
        Tone::Pending.paint("Waiting..."),
    );
    push_stream_lines(out, &task.lines);
}

fn push_completed(out: &mut String, number: usize, task: &TaskView, unlimited: bool) {
    let tone = if task.status == TaskStatus::Error {
        Tone::Error
    } else {
        Tone::Success
    };
    let timer = format!("[{}]", format_duration(task.elapsed));
    let _ = writeln!(
        out,
        "{}{} {} {} {}",
        pad(BASE_PADDING),
        tone.paint(&format!("{number}.")),
        status_glyph(task.status),
        Tone::Debug.paint(&timer),
        tone.paint(&task.message),
    );
    if unlimited {
        push_stream_lines(out, &task.lines);
    }
}

/// The live block: active tasks, then pending, then completed.
///
/// Rows are numbered from 1 across all three groups. Completed tasks show
/// their stream lines only in unlimited mode.
#[must_use]
pub fn task_frame(buckets: &Buckets, unlimited: bool) -> String {
    let mut out = String::new();
    let mut number = 0;
    for task in &buckets.active {
        number += 1;
        push_active(&mut out, number, task);
    }
    for task in &buckets.pending {
        number += 1;
        push_pending(&mut out, number, task);
    }
    for task in &buckets.completed {
        number += 1;
        push_completed(&mut out, number, task, unlimited);
    }
    out
}

/// Tables scoped to one task, for the end-of-run dump
#[derive(Debug, Clone)]
pub struct TaskTables {
    /// Owning task
    pub task: String,
    /// `(table name, contents)` pairs
    pub tables: Vec<(String, Table)>,
}

/// Every global table, then every per-task table, each with a heading.
#[must_use]
pub fn tables_dump(global: &[(String, Table)], per_task: &[TaskTables], width: usize) -> String {
    let mut out = String::new();

    if !global.is_empty() {
        let _ = writeln!(out, "{}{}", pad(BASE_PADDING), Tone::Header.paint("Global Tables:"));
        for (name, table) in global {
            let _ = writeln!(out, "{}{}", pad(BASE_PADDING + 2), Tone::Header.paint(name));
            let _ = writeln!(out, "{}", table.format_table_with_width(true, width));
        }
    }

    let per_task: Vec<&TaskTables> = per_task.iter().filter(|t| !t.tables.is_empty()).collect();
    if !per_task.is_empty() {
        let _ = writeln!(out, "{}{}", pad(BASE_PADDING), Tone::Header.paint("Task Tables:"));
        for entry in per_task {
            let _ = writeln!(out, "{}{}", pad(BASE_PADDING + 2), Tone::Header.paint(&entry.task));
            for (name, table) in &entry.tables {
                let _ = writeln!(out, "{}{}", pad(BASE_PADDING + 4), Tone::Info.paint(name));
                let _ = writeln!(out, "{}", table.format_table_with_width(true, width));
            }
        }
    }

    out
}

/// Blank line, then `Total Operations: N, Succeeded: S, Failed: F`.
#[must_use]
pub fn summary_block(summary: &Summary) -> String {
    format!(
        "\n{}{} {}, {} {}, {} {}\n",
        pad(BASE_PADDING),
        Tone::Info.paint("Total Operations:"),
        Tone::Info.paint(&summary.total.to_string()),
        Tone::Info.paint("Succeeded:"),
        Tone::Success.paint(&summary.succeeded.to_string()),
        Tone::Info.paint("Failed:"),
        Tone::Error.paint(&summary.failed.to_string()),
    )
}

/// Chronological list of reported errors. Empty when there are none.
#[must_use]
pub fn error_dump(errors: &[ErrorReport]) -> String {
    if errors.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n");
    let _ = writeln!(out, "{}{}", pad(BASE_PADDING), Tone::Error.paint("Errors:").bold());
    for (i, report) in errors.iter().enumerate() {
        let stamp = format!("[{}]", report.time.format("%H:%M:%S"));
        let _ = writeln!(
            out,
            "{}{} {} {}",
            pad(BASE_PADDING + 2),
            Tone::Error.paint(&format!("{}.", i + 1)),
            Tone::Debug.paint(&stamp),
            Tone::Error.paint(&format!("Task: {}", report.task)),
        );
        let _ = writeln!(
            out,
            "{}{}",
            pad(BASE_PADDING + 4),
            Tone::Error.paint(&format!("Error: {}", report.error)),
        );
    }
    out
}

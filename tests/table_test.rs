#![allow(missing_docs)]

use std::fs;

use backhub::output::style::strip_ansi;
use backhub::Table;
use tempfile::TempDir;

fn parse_markdown(markdown: &str) -> Vec<Vec<String>> {
    markdown
        .lines()
        .map(|line| {
            let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
            inner.split('|').map(|cell| cell.trim().to_string()).collect()
        })
        .collect()
}

fn rendered_lines(table: &Table, width: usize) -> Vec<String> {
    strip_ansi(&table.format_table_with_width(false, width))
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_markdown_round_trip_recovers_cells() {
    let mut table = Table::new(["Repository", "Action", "Duration"]);
    table.add_row(["github.com/tanq16/backhub", "cloned", "1.2s"]);
    table.add_row(["gitlab.com/a/b", "up to date", "310ms"]);
    table.add_row(["a very long cell that would wrap in the console", "failed", "5s"]);

    let parsed = parse_markdown(&table.format_markdown_table());
    assert_eq!(parsed.len(), 5);
    assert_eq!(parsed[0], table.headers());
    assert!(parsed[1].iter().all(|cell| cell.chars().all(|c| c == '-')));
    assert_eq!(&parsed[2..], table.rows());
}

#[test]
fn test_narrow_terminal_table_holds_minimum_width() {
    let mut table = Table::new(["X", "Y"]);
    table.add_row(["aaaaaaaaaa", "b"]);

    let lines = rendered_lines(&table, 20);
    assert!(lines.iter().all(|line| line.chars().count() <= 20));
    assert!(lines.iter().any(|line| line.contains("aaaaaaaaaa")));
    assert_eq!(lines.len(), 5);
}

#[test]
fn test_narrow_terminal_wraps_wide_column() {
    let mut table = Table::new(["X", "Y"]);
    table.add_row(["aaaa bbbb cccc dddd", "b"]);

    let lines = rendered_lines(&table, 20);
    assert!(lines.iter().all(|line| line.chars().count() == 20));
    assert_eq!(lines[0], "╭────────────┬─────╮");
    assert_eq!(lines[3], "│ aaaa bbbb  │ b   │");
    assert_eq!(lines[4], "│ cccc dddd  │     │");
    assert_eq!(lines.len(), 6);
}

#[test]
fn test_narrow_terminal_hard_splits_long_word() {
    let mut table = Table::new(["X", "Y"]);
    table.add_row(["abcdefghijklmnopqrstuvwxyz", "b"]);

    let lines = rendered_lines(&table, 20);
    let body: Vec<&String> = lines[3..lines.len() - 1].iter().collect();
    assert_eq!(body.len(), 3);
    assert!(body[0].starts_with("│ abcdefghij │"));
    assert!(body[2].starts_with("│ uvwxyz     │"));
}

#[test]
fn test_table_too_wide_for_minimum_overflows() {
    let mut table = Table::new(["A", "B", "C"]);
    table.add_row(["aaaaaaaa", "bbbbbbbb", "cccccccc"]);

    let lines = rendered_lines(&table, 10);
    assert!(lines.iter().any(|line| line.contains("aaaaaaaa")));
    assert!(lines[0].chars().count() > 10);
}

#[test]
fn test_write_markdown_table_to_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.md");
    fs::write(&path, "stale content that is much longer than the table itself\n".repeat(10)).unwrap();

    let mut table = Table::new(["K", "V"]);
    table.add_row(["a", "1"]);
    table.write_markdown_table_to_file(&path).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), table.format_markdown_table());
}

#[test]
fn test_write_markdown_table_reports_bad_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("results.md");

    let err = Table::new(["K"]).write_markdown_table_to_file(&path).unwrap_err();
    assert!(err.to_string().contains("results.md"));
}

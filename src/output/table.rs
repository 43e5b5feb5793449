//! Console and Markdown tables
//!
//! A [`Table`] is an append-only grid of string cells under fixed headers. It
//! renders as a bordered box sized to the terminal (cells word-wrapped to fit)
//! or as a Markdown pipe table.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use colored::Colorize;
use unicode_width::UnicodeWidthChar;

use super::style::visible_width;
use super::terminal::terminal_width;

/// Narrowest a column is shrunk to when fitting the terminal
pub const MIN_COLUMN_WIDTH: usize = 3;

struct BoxChars {
    top_left: &'static str,
    top_right: &'static str,
    bottom_left: &'static str,
    bottom_right: &'static str,
    horizontal: &'static str,
    vertical: &'static str,
    left_tee: &'static str,
    right_tee: &'static str,
    top_tee: &'static str,
    bottom_tee: &'static str,
    cross: &'static str,
}

const BOX: BoxChars = BoxChars {
    top_left: "╭",
    top_right: "╮",
    bottom_left: "╰",
    bottom_right: "╯",
    horizontal: "─",
    vertical: "│",
    left_tee: "├",
    right_tee: "┤",
    top_tee: "┬",
    bottom_tee: "┴",
    cross: "┼",
};

/// Headers plus rows of string cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table. The headers fix the column count and order.
    #[must_use]
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append one row. The cell count is not checked against the headers.
    pub fn add_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    /// Column names
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows in insertion order
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Direct access to the rows for in-place edits
    pub fn rows_mut(&mut self) -> &mut Vec<Vec<String>> {
        &mut self.rows
    }

    /// Widest content per column as measured by `measure`, headers
    /// included. Extra cells are ignored.
    fn content_widths(&self, measure: impl Fn(&str) -> usize) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| measure(h)).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(measure(cell));
            }
        }
        widths
    }

    /// Bordered console rendering sized to the current terminal width
    #[must_use]
    pub fn format_table(&self, inner_dividers: bool) -> String {
        self.format_table_with_width(inner_dividers, terminal_width())
    }

    /// Bordered console rendering for a terminal `term_width` columns wide.
    ///
    /// Columns wider than the terminal allows are shrunk in proportion to
    /// their content, never below [`MIN_COLUMN_WIDTH`]. When even that does
    /// not fit, the table overflows instead.
    #[must_use]
    pub fn format_table_with_width(&self, inner_dividers: bool, term_width: usize) -> String {
        let widths = fit_widths(self.content_widths(cell_width), term_width);
        let mut out = String::new();

        out.push_str(&border(&widths, BOX.top_left, BOX.top_tee, BOX.top_right));

        let headers: Vec<Vec<String>> = self
            .headers
            .iter()
            .zip(&widths)
            .map(|(header, &width)| wrap_text(header, width))
            .collect();
        let header_height = headers.iter().map(Vec::len).max().unwrap_or(1).max(1);
        for line in 0..header_height {
            out.push_str(BOX.vertical);
            for (i, width) in widths.iter().enumerate() {
                let text = headers[i].get(line).map_or("", String::as_str);
                let cell = format!(" {} ", pad(text, *width));
                let _ = write!(out, "{}", cell.as_str().bold());
                out.push_str(BOX.vertical);
            }
            out.push('\n');
        }

        out.push_str(&border(&widths, BOX.left_tee, BOX.cross, BOX.right_tee));

        for (r, row) in self.rows.iter().enumerate() {
            let cells: Vec<Vec<String>> = widths
                .iter()
                .enumerate()
                .map(|(i, &width)| {
                    row.get(i)
                        .map_or_else(|| vec![String::new()], |cell| wrap_text(cell, width))
                })
                .collect();
            let height = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
            for line in 0..height {
                out.push_str(BOX.vertical);
                for (i, width) in widths.iter().enumerate() {
                    let text = cells[i].get(line).map_or("", String::as_str);
                    let _ = write!(out, " {} ", pad(text, *width));
                    out.push_str(BOX.vertical);
                }
                out.push('\n');
            }

            if inner_dividers && r + 1 < self.rows.len() {
                out.push_str(&border(&widths, BOX.left_tee, BOX.cross, BOX.right_tee));
            }
        }

        out.push_str(&border(&widths, BOX.bottom_left, BOX.bottom_tee, BOX.bottom_right));
        out
    }

    /// Markdown pipe table. Cells are padded, never wrapped. Line breaks
    /// inside a cell become `<br>`.
    #[must_use]
    pub fn format_markdown_table(&self) -> String {
        let widths = self.content_widths(|text| visible_width(&markdown_cell(text)));
        let mut out = String::new();

        out.push('|');
        for (header, width) in self.headers.iter().zip(&widths) {
            let _ = write!(out, " {} |", pad(&markdown_cell(header), *width));
        }
        out.push('\n');

        out.push('|');
        for width in &widths {
            let _ = write!(out, " {} |", "-".repeat(*width));
        }
        out.push('\n');

        for row in &self.rows {
            out.push('|');
            for (i, width) in widths.iter().enumerate() {
                let cell = row.get(i).map_or("", String::as_str);
                let _ = write!(out, " {} |", pad(&markdown_cell(cell), *width));
            }
            out.push('\n');
        }
        out
    }

    /// Write the Markdown rendering to `path`, creating or truncating it.
    pub fn write_markdown_table_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.format_markdown_table())
            .with_context(|| format!("Failed to write markdown table to {}", path.display()))
    }
}

/// Shrink column widths to fit `term_width` if possible.
fn fit_widths(mut widths: Vec<usize>, term_width: usize) -> Vec<usize> {
    let columns = widths.len();
    let borders = columns + 1;
    let padding = columns * 2;
    let content: usize = widths.iter().sum();

    let fits = borders + padding + content <= term_width;
    let room_for_minimum = term_width >= borders + padding + MIN_COLUMN_WIDTH * columns;
    if fits || !room_for_minimum || content == 0 {
        return widths;
    }

    let available = term_width - borders - padding;
    for width in &mut widths {
        let share = *width * available / content;
        *width = share.max(MIN_COLUMN_WIDTH);
    }

    // raising narrow columns to the minimum may overshoot; take it back from
    // the widest ones
    let mut total: usize = widths.iter().sum();
    while total > available {
        let Some(widest) = widths
            .iter_mut()
            .filter(|w| **w > MIN_COLUMN_WIDTH)
            .max_by_key(|w| **w)
        else {
            break;
        };
        *widest -= 1;
        total -= 1;
    }
    widths
}

fn border(widths: &[usize], left: &str, join: &str, right: &str) -> String {
    let segments: Vec<String> = widths
        .iter()
        .map(|w| BOX.horizontal.repeat(w + 2))
        .collect();
    format!("{left}{}{right}\n", segments.join(join))
}

/// Columns the widest line of a cell occupies
fn cell_width(text: &str) -> usize {
    text.lines().map(visible_width).max().unwrap_or(0)
}

/// Right-pad `text` with spaces to `width` terminal columns
fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(visible_width(text));
    format!("{text}{}", " ".repeat(fill))
}

fn markdown_cell(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join("<br>")
}

/// Greedy word wrap to `width` terminal columns.
///
/// Line breaks in `text` are kept. Words wider than `width` are hard-split.
/// Lines that already fit are returned untouched.
#[must_use]
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for line in text.trim_end_matches(['\n', '\r']).split('\n') {
        wrap_line(line.strip_suffix('\r').unwrap_or(line), width, &mut lines);
    }
    lines
}

fn wrap_line(line: &str, width: usize, lines: &mut Vec<String>) {
    if width == 0 || visible_width(line) <= width {
        lines.push(line.to_string());
        return;
    }

    let start = lines.len();
    let mut current = String::new();
    let mut current_width = 0;

    for word in line.split_whitespace() {
        let word_width = visible_width(word);
        let needed = if current.is_empty() { word_width } else { current_width + 1 + word_width };
        if needed <= width {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_width = needed;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        current_width = 0;
        for c in word.chars() {
            let char_width = c.width().unwrap_or(0);
            if current_width + char_width > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            current.push(c);
            current_width += char_width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.len() == start {
        lines.push(String::new());
    }
}

/// Shared handle to a table stored by the output manager.
///
/// Cloning the handle does not copy the table.
#[derive(Debug, Clone, Default)]
pub struct SharedTable(Arc<Mutex<Table>>);

impl SharedTable {
    /// Wrap a table
    #[must_use]
    pub fn new(table: Table) -> Self {
        Self(Arc::new(Mutex::new(table)))
    }

    /// Run `f` with exclusive access to the table
    pub fn with<R>(&self, f: impl FnOnce(&mut Table) -> R) -> R {
        let mut table = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut table)
    }

    /// Append one row
    pub fn add_row<I, S>(&self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(|t| t.add_row(cells));
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> Table {
        self.with(|t| t.clone())
    }

    /// Whether both handles point at the same table
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// See [`Table::format_markdown_table`]
    #[must_use]
    pub fn format_markdown_table(&self) -> String {
        self.with(|t| t.format_markdown_table())
    }

    /// See [`Table::write_markdown_table_to_file`]
    pub fn write_markdown_table_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.snapshot().write_markdown_table_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::style::strip_ansi;

    #[test]
    fn test_wrap_text_fits_untouched() {
        assert_eq!(wrap_text("hello world", 20), vec!["hello world"]);
    }

    #[test]
    fn test_wrap_text_breaks_on_whitespace() {
        assert_eq!(
            wrap_text("the quick brown fox", 9),
            vec!["the quick", "brown fox"]
        );
    }

    #[test]
    fn test_wrap_text_hard_splits_long_word() {
        assert_eq!(wrap_text("aaaaaaaaaa", 4), vec!["aaaa", "aaaa", "aa"]);
    }

    #[test]
    fn test_wrap_text_long_word_after_short() {
        assert_eq!(wrap_text("ab cdefghij k", 4), vec!["ab", "cdef", "ghij", "k"]);
    }

    #[test]
    fn test_wrap_text_zero_width() {
        assert_eq!(wrap_text("anything", 0), vec!["anything"]);
    }

    #[test]
    fn test_wrap_text_keeps_line_breaks() {
        assert_eq!(wrap_text("a\nb", 10), vec!["a", "b"]);
        assert_eq!(wrap_text("one\r\ntwo three\n", 5), vec!["one", "two", "three"]);
        assert_eq!(wrap_text("", 5), vec![""]);
    }

    #[test]
    fn test_wrap_text_measures_wide_chars() {
        assert_eq!(wrap_text("漢字漢字", 4), vec!["漢字", "漢字"]);
        assert_eq!(wrap_text("漢字 ab", 5), vec!["漢字", "ab"]);
    }

    #[test]
    fn test_fit_widths_no_shrink_when_fitting() {
        assert_eq!(fit_widths(vec![10, 1], 20), vec![10, 1]);
    }

    #[test]
    fn test_fit_widths_shrinks_proportionally() {
        // 3 borders + 4 padding leaves 13 columns of content
        assert_eq!(fit_widths(vec![20, 1], 20), vec![10, 3]);
        assert_eq!(fit_widths(vec![30, 30], 27), vec![10, 10]);
    }

    #[test]
    fn test_fit_widths_overflows_when_terminal_too_narrow() {
        assert_eq!(fit_widths(vec![40, 40], 10), vec![40, 40]);
    }

    #[test]
    fn test_empty_table_renders_headers_and_borders() {
        let table = Table::new(["A", "B"]);
        let out = strip_ansi(&table.format_table_with_width(true, 80));
        assert_eq!(out, "╭───┬───╮\n│ A │ B │\n├───┼───┤\n╰───┴───╯\n");
    }

    #[test]
    fn test_inner_dividers_between_rows_only() {
        let mut table = Table::new(["A"]);
        table.add_row(["1"]);
        table.add_row(["2"]);

        let with = strip_ansi(&table.format_table_with_width(true, 80));
        let without = strip_ansi(&table.format_table_with_width(false, 80));
        assert_eq!(with.matches('├').count(), 2);
        assert_eq!(without.matches('├').count(), 1);
    }

    #[test]
    fn test_missing_cells_render_empty() {
        let mut table = Table::new(["A", "B"]);
        table.add_row(["only"]);
        let out = strip_ansi(&table.format_table_with_width(false, 80));
        assert!(out.contains("│ only │   │"));
    }

    #[test]
    fn test_markdown_pads_to_widest_cell() {
        let mut table = Table::new(["Name", "N"]);
        table.add_row(["alpha", "10"]);
        assert_eq!(
            table.format_markdown_table(),
            "| Name  | N  |\n| ----- | -- |\n| alpha | 10 |\n"
        );
    }

    #[test]
    fn test_wide_chars_keep_borders_aligned() {
        let mut table = Table::new(["Name", "N"]);
        table.add_row(["漢字漢字", "1"]);
        table.add_row(["ab", "22"]);

        let out = strip_ansi(&table.format_table_with_width(false, 80));
        assert!(out.contains("│ 漢字漢字 │ 1  │"));
        assert!(out.contains("│ ab       │ 22 │"));
        let widths: Vec<usize> = out.lines().map(visible_width).collect();
        assert!(widths.iter().all(|w| *w == widths[0]), "{out}");
    }

    #[test]
    fn test_newline_in_cell_renders_extra_row() {
        let mut table = Table::new(["A", "B"]);
        table.add_row(["first\nsecond", "x"]);

        let out = strip_ansi(&table.format_table_with_width(false, 80));
        assert_eq!(
            out,
            "╭────────┬───╮\n│ A      │ B │\n├────────┼───┤\n│ first  │ x │\n│ second │   │\n╰────────┴───╯\n"
        );
    }

    #[test]
    fn test_markdown_pads_by_display_width() {
        let mut table = Table::new(["Name", "N"]);
        table.add_row(["漢字漢字", "1"]);
        table.add_row(["a\nb", "2"]);
        assert_eq!(
            table.format_markdown_table(),
            "| Name     | N |\n| -------- | - |\n| 漢字漢字 | 1 |\n| a<br>b   | 2 |\n"
        );
    }

    #[test]
    fn test_shared_table_handles_alias() {
        let shared = SharedTable::new(Table::new(["A"]));
        let other = shared.clone();
        other.add_row(["x"]);
        assert_eq!(shared.snapshot().rows().len(), 1);
        assert!(shared.ptr_eq(&other));
    }
}

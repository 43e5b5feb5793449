//! Terminal sink for the live display
//!
//! Owns the output writer and remembers how many physical rows the last
//! redraw produced, so the next redraw erases exactly that block.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crossterm::{cursor, queue, terminal};
use tracing::debug;

use super::style::visible_width;

/// Width assumed when the terminal size cannot be read
pub const FALLBACK_WIDTH: usize = 80;

/// Current terminal width in columns, or [`FALLBACK_WIDTH`].
#[must_use]
pub fn terminal_width() -> usize {
    match terminal::size() {
        Ok((cols, _)) if cols > 0 => usize::from(cols),
        _ => FALLBACK_WIDTH,
    }
}

/// Physical rows `text` occupies on a terminal `width` columns wide.
#[must_use]
pub fn count_rows(text: &str, width: usize) -> usize {
    let width = width.max(1);
    text.split_terminator('\n')
        .map(|line| visible_width(line).div_ceil(width).max(1))
        .sum()
}

/// Writer plus erase bookkeeping
pub struct Terminal {
    out: Box<dyn Write + Send>,
    drawn_rows: usize,
    width: Option<usize>,
}

impl Terminal {
    /// Terminal backed by standard output
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Terminal backed by an arbitrary writer
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            drawn_rows: 0,
            width: None,
        }
    }

    /// Pin the width instead of querying the terminal
    #[must_use]
    pub const fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    /// Width used for wrapping and row accounting
    #[must_use]
    pub fn width(&self) -> usize {
        self.width.unwrap_or_else(terminal_width)
    }

    /// Rows drawn by the last redraw
    #[must_use]
    pub const fn drawn_rows(&self) -> usize {
        self.drawn_rows
    }

    /// Erase the previous block and draw `frame` in its place.
    ///
    /// Best effort: write failures are logged and dropped.
    pub fn redraw(&mut self, frame: &str) {
        let rows = count_rows(frame, self.width());
        let result = self
            .erase(self.drawn_rows)
            .and_then(|()| self.out.write_all(frame.as_bytes()))
            .and_then(|()| self.out.flush());
        if let Err(err) = result {
            debug!(error = %err, "terminal redraw failed");
        }
        self.drawn_rows = rows;
    }

    /// Write `text` below the current block. It is never erased later.
    pub fn append(&mut self, text: &str) {
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(err) = result {
            debug!(error = %err, "terminal write failed");
        }
        self.drawn_rows = 0;
    }

    /// Erase the last `n` rows above the cursor
    pub fn clear_lines(&mut self, n: usize) {
        if let Err(err) = self.erase(n).and_then(|()| self.out.flush()) {
            debug!(error = %err, "terminal erase failed");
        }
        self.drawn_rows = self.drawn_rows.saturating_sub(n);
    }

    /// Clear the whole screen and home the cursor
    pub fn clear_screen(&mut self) {
        let result = queue!(
            self.out,
            cursor::MoveTo(0, 0),
            terminal::Clear(terminal::ClearType::All)
        )
        .and_then(|()| self.out.flush());
        if let Err(err) = result {
            debug!(error = %err, "terminal clear failed");
        }
        self.drawn_rows = 0;
    }

    fn erase(&mut self, rows: usize) -> io::Result<()> {
        if rows == 0 {
            return Ok(());
        }
        let up = u16::try_from(rows).unwrap_or(u16::MAX);
        queue!(
            self.out,
            cursor::MoveUp(up),
            terminal::Clear(terminal::ClearType::FromCursorDown)
        )
    }
}

/// In-memory writer whose contents stay readable after being handed to a
/// [`Terminal`]. Useful for capturing the display.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    /// Empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Bytes written so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing was written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the captured bytes
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

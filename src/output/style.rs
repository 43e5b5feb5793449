//! Styling primitives
//!
//! A static palette and symbol set shared by every renderer, plus a handful of
//! pure text helpers (banners, progress bars, durations, ANSI stripping).

use std::time::Duration;

use colored::{Color, ColoredString, Colorize};
use unicode_width::UnicodeWidthStr;

use super::task::TaskStatus;

/// Foreground colours used by the output layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    /// Completed tasks, pass glyphs
    pub success: Color,
    /// Failed tasks, fail glyphs
    pub error: Color,
    /// Warning overlay
    pub warning: Color,
    /// Pending tasks and the default active prefix
    pub pending: Color,
    /// Informational accents
    pub info: Color,
    /// Timers and secondary text
    pub debug: Color,
    /// Detail accents
    pub detail: Color,
    /// Stream lines under a task
    pub stream: Color,
    /// Section headers (rendered bold)
    pub header: Color,
}

/// The process-wide palette.
pub const PALETTE: Palette = Palette {
    success: Color::Green,
    error: Color::BrightRed,
    warning: Color::BrightYellow,
    pending: Color::BrightBlue,
    info: Color::BrightCyan,
    debug: Color::White,
    detail: Color::BrightMagenta,
    stream: Color::BrightBlack,
    header: Color::Blue,
};

/// Glyphs used for status indicators and list decoration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbols {
    /// Success
    pub pass: &'static str,
    /// Failure
    pub fail: &'static str,
    /// Warning
    pub warning: &'static str,
    /// Waiting
    pub pending: &'static str,
    /// Information
    pub info: &'static str,
    /// Arrow
    pub arrow: &'static str,
    /// Bullet, also the glyph of a plain active task
    pub bullet: &'static str,
    /// Small dot
    pub dot: &'static str,
}

/// The process-wide symbol set.
pub const SYMBOLS: Symbols = Symbols {
    pass: "✓",
    fail: "✗",
    warning: "!",
    pending: "○",
    info: "ℹ",
    arrow: "→",
    bullet: "•",
    dot: "·",
};

/// Left padding of every line in the live block
pub const BASE_PADDING: usize = 2;

/// Default width of a progress bar, in cells
pub const PROGRESS_BAR_WIDTH: usize = 30;

/// Semantic colour roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Green
    Success,
    /// Red
    Error,
    /// Yellow
    Warning,
    /// Blue
    Pending,
    /// Cyan
    Info,
    /// Light grey
    Debug,
    /// Purple
    Detail,
    /// Dark grey
    Stream,
    /// Bold blue
    Header,
}

impl Tone {
    /// The palette colour for this tone
    #[must_use]
    pub const fn color(self) -> Color {
        match self {
            Self::Success => PALETTE.success,
            Self::Error => PALETTE.error,
            Self::Warning => PALETTE.warning,
            Self::Pending => PALETTE.pending,
            Self::Info => PALETTE.info,
            Self::Debug => PALETTE.debug,
            Self::Detail => PALETTE.detail,
            Self::Stream => PALETTE.stream,
            Self::Header => PALETTE.header,
        }
    }

    /// Paint `text` in this tone
    #[must_use]
    pub fn paint(self, text: &str) -> ColoredString {
        let painted = text.color(self.color());
        if self == Self::Header {
            painted.bold()
        } else {
            painted
        }
    }

    /// Tone matching a task status
    #[must_use]
    pub const fn for_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Success => Self::Success,
            TaskStatus::Error => Self::Error,
            TaskStatus::Warning => Self::Warning,
            TaskStatus::Pending | TaskStatus::Active => Self::Pending,
        }
    }
}

/// Coloured glyph for a task status.
#[must_use]
pub fn status_glyph(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Success => Tone::Success.paint(SYMBOLS.pass),
        TaskStatus::Error => Tone::Error.paint(SYMBOLS.fail),
        TaskStatus::Warning => Tone::Warning.paint(SYMBOLS.warning),
        TaskStatus::Pending => Tone::Pending.paint(SYMBOLS.pending),
        TaskStatus::Active => Tone::Info.paint(SYMBOLS.bullet),
    }
}

/// Paint a message with the success tone
#[must_use]
pub fn success_message(msg: &str) -> String {
    Tone::Success.paint(msg).to_string()
}

/// Paint a message with the error tone
#[must_use]
pub fn error_message(msg: &str) -> String {
    Tone::Error.paint(msg).to_string()
}

/// Paint a message with the warning tone
#[must_use]
pub fn warning_message(msg: &str) -> String {
    Tone::Warning.paint(msg).to_string()
}

/// Paint a message with the info tone
#[must_use]
pub fn info_message(msg: &str) -> String {
    Tone::Info.paint(msg).to_string()
}

/// Paint a message with the detail tone
#[must_use]
pub fn detail_message(msg: &str) -> String {
    Tone::Detail.paint(msg).to_string()
}

/// Paint a message with the debug (grey) tone
#[must_use]
pub fn debug_message(msg: &str) -> String {
    Tone::Debug.paint(msg).to_string()
}

/// Bold banner of the form `[ ===title=== ]` spanning `width` columns.
///
/// A zero width falls back to 80.
#[must_use]
pub fn format_title(title: &str, width: usize, tone: Tone) -> String {
    let width = if width == 0 { 80 } else { width };
    let padding = width
        .saturating_sub(visible_width(title) + 4)
        .max(2);
    let left = padding / 2;
    let right = padding - left;
    let banner = format!("[ {}{title}{} ]", "=".repeat(left), "=".repeat(right));
    banner.as_str().color(tone.color()).bold().to_string()
}

/// Plain progress bar: `[=====>    ] 42.0%`.
///
/// A zero `total` renders as empty; `current` beyond `total` renders full.
#[must_use]
pub fn progress_bar(current: u64, total: u64, width: usize) -> String {
    let width = if width == 0 { PROGRESS_BAR_WIDTH } else { width };
    #[allow(clippy::cast_precision_loss)]
    let fraction = if total == 0 {
        0.0
    } else {
        (current as f64 / total as f64).clamp(0.0, 1.0)
    };
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let filled = ((fraction * width as f64) as usize).min(width);

    let mut bar = String::with_capacity(width + 10);
    bar.push('[');
    bar.push_str(&"=".repeat(filled));
    if filled < width {
        bar.push('>');
        bar.push_str(&" ".repeat(width - filled - 1));
    }
    bar.push(']');
    format!("{bar} {:.1}%", fraction * 100.0)
}

/// Compact duration rounded to milliseconds: `850ms`, `1.25s`, `2m3.5s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = (duration.as_micros() + 500) / 1000;
    if millis < 1000 {
        return format!("{millis}ms");
    }
    let minutes = millis / 60_000;
    let rest = millis % 60_000;
    let seconds = format_seconds(rest / 1000, rest % 1000);
    if minutes == 0 {
        seconds
    } else {
        format!("{minutes}m{seconds}")
    }
}

fn format_seconds(whole: u128, millis: u128) -> String {
    if millis == 0 {
        return format!("{whole}s");
    }
    let fraction = format!("{millis:03}");
    format!("{whole}.{}s", fraction.trim_end_matches('0'))
}

/// Remove ANSI escape sequences (CSI and two-byte escapes) from `text`.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('[') => {
                // parameters and intermediates until the final byte
                for c in chars.by_ref() {
                    if ('@'..='~').contains(&c) {
                        break;
                    }
                }
            }
            Some(_) | None => {}
        }
    }
    out
}

/// Terminal columns `text` occupies, ignoring ANSI sequences. Wide
/// characters (CJK, most emoji) count as two.
#[must_use]
pub fn visible_width(text: &str) -> usize {
    strip_ansi(text).width()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_half() {
        assert_eq!(progress_bar(50, 100, 10), "[=====>    ] 50.0%");
    }

    #[test]
    fn test_progress_bar_full_has_no_arrow() {
        assert_eq!(progress_bar(100, 100, 4), "[====] 100.0%");
    }

    #[test]
    fn test_progress_bar_zero_total() {
        assert_eq!(progress_bar(3, 0, 4), "[>   ] 0.0%");
    }

    #[test]
    fn test_progress_bar_overflow_clamps() {
        assert_eq!(progress_bar(250, 100, 4), "[====] 100.0%");
    }

    #[test]
    fn test_format_duration_millis() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
    }

    #[test]
    fn test_format_duration_seconds() {
        assert_eq!(format_duration(Duration::from_millis(1250)), "1.25s");
        assert_eq!(format_duration(Duration::from_secs(2)), "2s");
    }

    #[test]
    fn test_format_duration_minutes() {
        assert_eq!(format_duration(Duration::from_millis(123_500)), "2m3.5s");
    }

    #[test]
    fn test_strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m done"), "ok done");
        assert_eq!(strip_ansi("\x1b[3A\x1b[Jplain"), "plain");
    }

    #[test]
    fn test_visible_width_counts_chars() {
        assert_eq!(visible_width("\x1b[31m✗ bad\x1b[0m"), 5);
    }

    #[test]
    fn test_visible_width_counts_wide_chars_twice() {
        assert_eq!(visible_width("漢字"), 4);
        assert_eq!(visible_width("\x1b[1m漢a\x1b[0m"), 3);
    }

    #[test]
    fn test_format_title_is_padded_to_width() {
        let title = strip_ansi(&format_title("Run", 20, Tone::Info));
        assert_eq!(title, "[ ======Run======= ]");
        assert_eq!(title.chars().count(), 20);
    }

    #[test]
    fn test_tone_for_status() {
        assert_eq!(Tone::for_status(TaskStatus::Error), Tone::Error);
        assert_eq!(Tone::for_status(TaskStatus::Active), Tone::Pending);
    }

    #[test]
    fn test_status_glyph_symbols() {
        assert_eq!(strip_ansi(&status_glyph(TaskStatus::Success).to_string()), "✓");
        assert_eq!(strip_ansi(&status_glyph(TaskStatus::Error).to_string()), "✗");
        assert_eq!(strip_ansi(&status_glyph(TaskStatus::Active).to_string()), "•");
    }
}

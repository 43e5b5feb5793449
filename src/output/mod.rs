//! Concurrent terminal output
//!
//! Many workers report progress into one [`OutputManager`]; a background loop
//! repaints a live block of tasks in place and, when stopped, dumps the
//! registered [`Table`]s and a run summary.

pub mod manager;
pub mod render;
pub mod style;
pub mod table;
pub mod task;
pub mod terminal;

pub use manager::{OutputManager, DEFAULT_MAX_STREAM_LINES, DEFAULT_TICK};
pub use style::Tone;
pub use table::{SharedTable, Table};
pub use task::{Buckets, ErrorReport, Summary, TaskStatus, TaskView};
pub use terminal::{CaptureBuffer, Terminal};

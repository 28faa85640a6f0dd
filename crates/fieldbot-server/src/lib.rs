//! FieldBot bot runtime: shared state, handlers, polling and the daily report.

pub mod handlers;
pub mod polling;
pub mod scheduler;
pub mod state;

pub use handlers::{generate_report, handle_command, handle_photo, handle_text, reset, Reply};
pub use scheduler::ReportScheduler;
pub use state::{AppState, Session};

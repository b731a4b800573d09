//! Producer side of the event pipeline and the report sink it feeds.

pub mod reporter;
pub mod service;

pub use reporter::{ExitDecision, PublishOutcome, Reporter};
pub use service::{EventSink, ReportService, ReportStream};

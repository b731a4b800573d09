use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event::ReportEvent;

/// How the targets of a session were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScanMode {
    Host,
    Registry,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportMetadata {
    pub session_id: Uuid,
    pub mode: ScanMode,
    pub started_at: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub finished_at: Option<DateTime<Utc>>,
    /// Image or repository identifiers the session attempted to scan.
    #[cfg_attr(feature = "serde", serde(default))]
    pub targets: Vec<String>,
}

impl ReportMetadata {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            mode,
            started_at: Utc::now(),
            finished_at: None,
            targets: Vec::new(),
        }
    }
}

/// Ordered aggregation of every event of one session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Report {
    pub metadata: ReportMetadata,
    #[cfg_attr(feature = "serde", serde(default))]
    pub events: Vec<ReportEvent>,
}

impl Report {
    pub fn new(metadata: ReportMetadata) -> Self {
        Self {
            metadata,
            events: Vec::new(),
        }
    }

    pub fn push(&mut self, event: ReportEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

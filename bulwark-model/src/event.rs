use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ModelError;
use crate::image::ImageHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(rename_all = "lowercase", try_from = "String")
)]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(ModelError::InvalidSeverity(other.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Finding as emitted by a plugin, before the runner stamps provenance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PluginFinding {
    #[cfg_attr(feature = "serde", serde(default))]
    pub level: Severity,
    pub kind: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub detail: Value,
}

impl PluginFinding {
    pub fn new(level: Severity, kind: impl Into<String>, detail: Value) -> Self {
        Self {
            level,
            kind: kind.into(),
            detail,
        }
    }
}

/// The scanned object an event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventObject {
    pub id: String,
    pub reference: String,
}

impl From<&ImageHandle> for EventObject {
    fn from(image: &ImageHandle) -> Self {
        Self {
            id: image.id.clone(),
            reference: image.display_ref().to_string(),
        }
    }
}

/// One structured finding as it appears in the report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportEvent {
    pub id: Uuid,
    pub time: DateTime<Utc>,
    pub plugin: String,
    pub command: String,
    pub object: EventObject,
    pub level: Severity,
    pub kind: String,
    pub detail: Value,
}

impl ReportEvent {
    pub fn from_finding(
        plugin: impl Into<String>,
        command: impl Into<String>,
        object: EventObject,
        finding: PluginFinding,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            time: Utc::now(),
            plugin: plugin.into(),
            command: command.into(),
            object,
            level: finding.level,
            kind: finding.kind,
            detail: finding.detail,
        }
    }
}

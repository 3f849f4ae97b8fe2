//! Classification of decoded status-stream lines

use crate::types::{JobPhase, JobStatus, ProgressUpdate, ResultMetadata};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Marker that starts a data line
pub const DATA_PREFIX: &str = "data:";

/// One logical unit recovered from the status stream
#[derive(Clone, Debug, PartialEq)]
pub enum StreamFrame {
    /// Progress payload
    Progress(ProgressUpdate),
    /// Explicit error payload
    Error(String),
    /// Data line that could not be understood; discarded by the read loop
    Noise,
}

/// Wire shape shared by progress and error payloads
#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    remaining: Option<u64>,
    #[serde(default)]
    results: Option<BTreeMap<String, ResultMetadata>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Classify one decoded line
///
/// Returns `None` for lines that carry no payload: blank lines, SSE fields other than
/// `data` (`event:`, `id:`, `: comment`) and empty data lines.
pub fn classify_line(line: &str) -> Option<StreamFrame> {
    if line.trim().is_empty() {
        return None;
    }
    let data = line.strip_prefix(DATA_PREFIX)?.trim();
    if data.is_empty() {
        return None;
    }
    Some(parse_payload(data))
}

/// Parse the JSON text of a data line
pub fn parse_payload(data: &str) -> StreamFrame {
    let raw: RawPayload = match serde_json::from_str(data) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, line = data, "Discarding malformed status frame");
            return StreamFrame::Noise;
        }
    };

    if let Some(message) = error_message(raw.error.as_ref()) {
        return StreamFrame::Error(message);
    }

    let Some(status) = raw.status.as_deref() else {
        warn!(line = data, "Discarding status frame without a status");
        return StreamFrame::Noise;
    };
    let phase = match status.parse::<JobPhase>() {
        Ok(phase) => phase,
        Err(e) => {
            warn!(error = %e, "Discarding status frame");
            return StreamFrame::Noise;
        }
    };

    let status = match phase {
        JobPhase::Pending => JobStatus::Pending,
        JobPhase::Running => JobStatus::Running,
        JobPhase::Completed => JobStatus::Completed {
            results: raw.results.unwrap_or_default(),
        },
        JobPhase::Failed => JobStatus::Failed,
    };

    StreamFrame::Progress(ProgressUpdate {
        status,
        completed: raw.completed.unwrap_or(0),
        total: raw.total.unwrap_or(0),
        remaining: raw.remaining.unwrap_or(0),
    })
}

/// Only "truthy" error values count: null, false and "" mean no error
fn error_message(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null | serde_json::Value::Bool(false) => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

//! Progress channel message types and codec.
//!
//! The server sends JSON envelopes of the shape
//! `{"type": "<kind>", "job_id": "...", "data": {...}, "timestamp": "..."}`.
//! Frames are first read into a loose envelope and then checked against
//! the variant named by `type`, so an unknown kind or a payload that does
//! not fit its kind is rejected instead of coerced.

use chrono::Utc;
use genrun_core::progress::ProgressSnapshot;
use genrun_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

/// All known server-to-client message kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// The channel (re)opened. Emitted locally, never by the server.
    Connected { timestamp: Timestamp },

    /// A new progress snapshot for a job.
    Progress {
        job_id: JobId,
        snapshot: ProgressSnapshot,
        timestamp: Timestamp,
    },

    /// A line for the job log.
    Log {
        job_id: JobId,
        message: String,
        timestamp: Timestamp,
    },

    /// The executor picked the job up.
    Started { job_id: JobId, timestamp: Timestamp },

    /// The job finished successfully.
    Completed {
        job_id: JobId,
        summary: CompletionSummary,
        timestamp: Timestamp,
    },

    /// The job failed on the server.
    Error {
        job_id: JobId,
        message: String,
        timestamp: Timestamp,
    },
}

impl ChannelMessage {
    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => MSG_TYPE_CONNECTED,
            Self::Progress { .. } => MSG_TYPE_PROGRESS,
            Self::Log { .. } => MSG_TYPE_LOG,
            Self::Started { .. } => MSG_TYPE_STARTED,
            Self::Completed { .. } => MSG_TYPE_COMPLETED,
            Self::Error { .. } => MSG_TYPE_ERROR,
        }
    }

    /// Job the message refers to; `None` only for `connected`.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Connected { .. } => None,
            Self::Progress { job_id, .. }
            | Self::Log { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Error { job_id, .. } => Some(job_id),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Connected { timestamp }
            | Self::Progress { timestamp, .. }
            | Self::Log { timestamp, .. }
            | Self::Started { timestamp, .. }
            | Self::Completed { timestamp, .. }
            | Self::Error { timestamp, .. } => *timestamp,
        }
    }

    /// Encode into the wire envelope.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let data = match self {
            Self::Connected { .. } | Self::Started { .. } => serde_json::json!({}),
            Self::Progress { snapshot, .. } => serde_json::to_value(snapshot)?,
            Self::Log { message, .. } | Self::Error { message, .. } => {
                serde_json::to_value(MessageData {
                    message: message.clone(),
                })?
            }
            Self::Completed { summary, .. } => serde_json::to_value(summary)?,
        };

        serde_json::to_string(&RawEnvelope {
            kind: self.kind().to_string(),
            job_id: self.job_id().map(str::to_string),
            data,
            timestamp: Some(self.timestamp()),
        })
    }
}

/// Payload of a `completed` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_records: Option<u64>,
}

/// Payload of `log` and `error` messages.
#[derive(Debug, Serialize, Deserialize)]
struct MessageData {
    message: String,
}

pub const MSG_TYPE_CONNECTED: &str = "connected";
pub const MSG_TYPE_PROGRESS: &str = "progress";
pub const MSG_TYPE_LOG: &str = "log";
pub const MSG_TYPE_STARTED: &str = "started";
pub const MSG_TYPE_COMPLETED: &str = "completed";
pub const MSG_TYPE_ERROR: &str = "error";

/// Envelope as it appears on the wire, before variant checks.
#[derive(Debug, Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    job_id: Option<JobId>,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    timestamp: Option<Timestamp>,
}

/// Reasons an inbound frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not JSON, or not an envelope.
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `type` names no known variant.
    #[error("Unknown message type '{0}'")]
    UnknownType(String),

    /// A job-scoped variant arrived without `job_id`.
    #[error("Message type '{0}' requires a job_id")]
    MissingJobId(&'static str),

    /// `data` does not match the shape required by `type`.
    #[error("Invalid '{kind}' payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Decode a text frame into a typed message.
///
/// A missing `timestamp` is filled with the receipt time.
pub fn parse_message(text: &str) -> Result<ChannelMessage, DecodeError> {
    let raw: RawEnvelope = serde_json::from_str(text)?;
    let timestamp = raw.timestamp.unwrap_or_else(Utc::now);

    let kind = match raw.kind.as_str() {
        MSG_TYPE_CONNECTED => return Ok(ChannelMessage::Connected { timestamp }),
        MSG_TYPE_PROGRESS => MSG_TYPE_PROGRESS,
        MSG_TYPE_LOG => MSG_TYPE_LOG,
        MSG_TYPE_STARTED => MSG_TYPE_STARTED,
        MSG_TYPE_COMPLETED => MSG_TYPE_COMPLETED,
        MSG_TYPE_ERROR => MSG_TYPE_ERROR,
        other => return Err(DecodeError::UnknownType(other.to_string())),
    };

    let job_id = raw.job_id.ok_or(DecodeError::MissingJobId(kind))?;
    let data = raw.data;

    let message = match kind {
        MSG_TYPE_PROGRESS => ChannelMessage::Progress {
            job_id,
            snapshot: payload(kind, data)?,
            timestamp,
        },
        MSG_TYPE_LOG => ChannelMessage::Log {
            job_id,
            message: payload::<MessageData>(kind, data)?.message,
            timestamp,
        },
        MSG_TYPE_STARTED => ChannelMessage::Started { job_id, timestamp },
        MSG_TYPE_COMPLETED => ChannelMessage::Completed {
            job_id,
            summary: if data.is_null() {
                CompletionSummary::default()
            } else {
                payload(kind, data)?
            },
            timestamp,
        },
        _ => ChannelMessage::Error {
            job_id,
            message: payload::<MessageData>(kind, data)?.message,
            timestamp,
        },
    };

    Ok(message)
}

fn payload<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    data: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::InvalidPayload { kind, source })
}

/// Client-to-server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach this connection to a job's progress stream.
    Subscribe { job_id: JobId },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_connected_without_job_id() {
        let json = r#"{"type":"connected","data":{},"timestamp":"2024-07-01T09:00:00Z"}"#;
        let msg = parse_message(json).unwrap();
        assert_matches!(msg, ChannelMessage::Connected { .. });
        assert!(msg.job_id().is_none());
    }

    #[test]
    fn parse_progress_message() {
        let json = r#"{
            "type":"progress",
            "job_id":"job-7",
            "data":{
                "current_day":10,
                "total_days":31,
                "current_date":"2024-07-10",
                "percentage":32.26,
                "current_module":"mes.work_orders",
                "records":{"mes":{"work_orders":500},"erp":{"sales_orders":120}}
            },
            "timestamp":"2024-07-01T09:00:00Z"
        }"#;

        match parse_message(json).unwrap() {
            ChannelMessage::Progress {
                job_id, snapshot, ..
            } => {
                assert_eq!(job_id, "job-7");
                assert_eq!(snapshot.current_day, 10);
                assert_eq!(snapshot.total_days, 31);
                assert_eq!(snapshot.current_module.as_deref(), Some("mes.work_orders"));
                assert_eq!(snapshot.records.total(), 620);
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn parse_log_message() {
        let json = r#"{"type":"log","job_id":"job-7","data":{"message":"Day 3 done"},"timestamp":"2024-07-01T09:00:00Z"}"#;
        match parse_message(json).unwrap() {
            ChannelMessage::Log { message, .. } => assert_eq!(message, "Day 3 done"),
            other => panic!("Expected Log, got {other:?}"),
        }
    }

    #[test]
    fn parse_started_ignores_payload() {
        let json = r#"{"type":"started","job_id":"job-7","data":{"worker":"gen-2"}}"#;
        assert_matches!(
            parse_message(json).unwrap(),
            ChannelMessage::Started { job_id, .. } if job_id == "job-7"
        );
    }

    #[test]
    fn parse_completed_with_and_without_summary() {
        let with = r#"{"type":"completed","job_id":"j","data":{"total_records":9000}}"#;
        assert_matches!(
            parse_message(with).unwrap(),
            ChannelMessage::Completed { summary, .. } if summary.total_records == Some(9000)
        );

        let without = r#"{"type":"completed","job_id":"j"}"#;
        assert_matches!(
            parse_message(without).unwrap(),
            ChannelMessage::Completed { summary, .. } if summary.total_records.is_none()
        );
    }

    #[test]
    fn parse_error_message() {
        let json = r#"{"type":"error","job_id":"j","data":{"message":"disk full"}}"#;
        assert_matches!(
            parse_message(json).unwrap(),
            ChannelMessage::Error { message, .. } if message == "disk full"
        );
    }

    #[test]
    fn missing_timestamp_defaults_to_receipt_time() {
        let before = Utc::now();
        let msg = parse_message(r#"{"type":"started","job_id":"j"}"#).unwrap();
        assert!(msg.timestamp() >= before);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = r#"{"type":"heartbeat","job_id":"j","data":{}}"#;
        assert_matches!(parse_message(json), Err(DecodeError::UnknownType(t)) if t == "heartbeat");
    }

    #[test]
    fn job_scoped_message_without_job_id_is_rejected() {
        let json = r#"{"type":"progress","data":{}}"#;
        assert_matches!(parse_message(json), Err(DecodeError::MissingJobId("progress")));
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let json = r#"{"type":"progress","job_id":"j","data":{"message":"not a snapshot"}}"#;
        assert_matches!(
            parse_message(json),
            Err(DecodeError::InvalidPayload { kind: "progress", .. })
        );
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert_matches!(parse_message("not json"), Err(DecodeError::Malformed(_)));
    }

    #[test]
    fn encoded_progress_decodes_to_same_message() {
        let msg = ChannelMessage::Progress {
            job_id: "job-1".into(),
            snapshot: ProgressSnapshot {
                current_day: 2,
                total_days: 3,
                current_date: "2024-07-02".parse().unwrap(),
                percentage: 66.0,
                current_module: None,
                records: Default::default(),
            },
            timestamp: "2024-07-01T09:00:00Z".parse().unwrap(),
        };

        let decoded = parse_message(&msg.to_json().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn subscribe_serializes_with_type_tag() {
        let json = ClientMessage::Subscribe {
            job_id: "job-9".into(),
        }
        .to_json()
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["job_id"], "job-9");
    }
}

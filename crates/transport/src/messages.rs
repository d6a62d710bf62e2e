//! Push-channel message types and parser.
//!
//! The backend's optional WebSocket channel sends JSON frames of the shape
//! `{"remoteHandle": "...", "state": "...", "reason": ...}` as a
//! lower-latency substitute for polling. This module deserializes them into
//! a typed [`PushEvent`].

use serde::Deserialize;

use crate::api::JobStatus;

/// A server-initiated status event for one submitted job.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    /// Backend-assigned identifier the event refers to.
    #[serde(rename = "remoteHandle")]
    pub remote_handle: String,
    pub state: PushState,
    /// Failure description, present only for `failed` events.
    #[serde(default)]
    pub reason: Option<String>,
}

/// States the push channel can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl PushEvent {
    /// Convert to the status the poll loop understands; a push event and a
    /// poll response for the same state are interchangeable.
    pub fn into_status(self) -> JobStatus {
        match self.state {
            PushState::Queued => JobStatus::Queued,
            PushState::Running => JobStatus::Running,
            PushState::Succeeded => JobStatus::Succeeded,
            PushState::Failed => JobStatus::Failed {
                reason: self
                    .reason
                    .unwrap_or_else(|| "unspecified backend failure".to_string()),
            },
        }
    }
}

/// Parse a push-channel text frame into a typed event.
///
/// Returns `Err` for malformed JSON or unknown `state` values. Callers
/// should log unknown frames and continue.
pub fn parse_event(text: &str) -> Result<PushEvent, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_running_event() {
        let json = r#"{"remoteHandle":"abc-123","state":"running"}"#;
        let event = parse_event(json).unwrap();
        assert_eq!(event.remote_handle, "abc-123");
        assert_eq!(event.state, PushState::Running);
        assert!(event.reason.is_none());
    }

    #[test]
    fn parse_succeeded_event() {
        let json = r#"{"remoteHandle":"abc-123","state":"succeeded"}"#;
        let event = parse_event(json).unwrap();
        assert_eq!(event.into_status(), JobStatus::Succeeded);
    }

    #[test]
    fn parse_failed_event_with_reason() {
        let json = r#"{"remoteHandle":"abc-123","state":"failed","reason":"model_error"}"#;
        let event = parse_event(json).unwrap();
        assert_eq!(
            event.into_status(),
            JobStatus::Failed {
                reason: "model_error".to_string()
            }
        );
    }

    #[test]
    fn failed_event_without_reason_gets_placeholder() {
        let json = r#"{"remoteHandle":"abc-123","state":"failed"}"#;
        let event = parse_event(json).unwrap();
        match event.into_status() {
            JobStatus::Failed { reason } => assert!(reason.contains("unspecified")),
            other => panic!("Expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_state_returns_error() {
        let json = r#"{"remoteHandle":"abc-123","state":"exploded"}"#;
        assert!(parse_event(json).is_err());
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert!(parse_event("not json at all").is_err());
    }
}

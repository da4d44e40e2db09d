use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::ranges::Rank;
use crate::types::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCategory {
    /// Debugger console text (`~`).
    Console,
    /// Output of the debugged program (`@`).
    Program,
    /// `mi: ` passthrough lines.
    MiLog,
    /// Lines that did not parse as MI.
    Diagnostic,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Breakpoint,
    Step,
    Entry,
    Other(String),
}

/// Stable identifier of one rank inside a process set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RankId {
    pub process_set: String,
    pub rank: Rank,
}

impl fmt::Display for RankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.process_set, self.rank)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebugEvent {
    Output {
        text: String,
        category: OutputCategory,
    },
    Stopped {
        reason: StopReason,
        rank: Option<RankId>,
    },
    Continued,
    Exited,
    RevealSource(SourceLocation),
}

/// Receives everything the bridge reports to its front end.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DebugEvent);
}

impl EventSink for mpsc::UnboundedSender<DebugEvent> {
    fn emit(&self, event: DebugEvent) {
        if self.send(event).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_id_prints_in_scoped_form() {
        let id = RankId {
            process_set: "App0".into(),
            rank: 3,
        };
        assert_eq!(id.to_string(), "App0{3}");
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let json = serde_json::to_value(DebugEvent::Stopped {
            reason: StopReason::Breakpoint,
            rank: Some(RankId {
                process_set: "App0".into(),
                rank: 1,
            }),
        })
        .expect("event should serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "event": "stopped",
                "reason": "breakpoint",
                "rank": {"process_set": "App0", "rank": 1}
            })
        );
    }

    #[tokio::test]
    async fn unbounded_sender_is_a_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(DebugEvent::Continued);
        assert_eq!(rx.recv().await, Some(DebugEvent::Continued));

        drop(rx);
        tx.emit(DebugEvent::Exited);
    }
}

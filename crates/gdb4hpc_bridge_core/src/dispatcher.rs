//! Turns async MI records into front-end events and store updates.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::channel::{CommandChannel, Submission};
use crate::error::BridgeError;
use crate::events::{DebugEvent, EventSink, RankId, StopReason};
use crate::focus::Focus;
use crate::mi::{Record, Value};
use crate::ops::threads::{apply_thread_info, THREAD_INFO};
use crate::ranges::RangeSet;
use crate::store::DataStore;
use crate::types::SourceLocation;
use crate::Result;

pub const EXIT_COMMAND: &str = "-gdb-exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    /// Also the state before the first launch.
    Stopped,
    Exited,
}

/// Where a stop happened, as reported by `*stopped`.
struct StopSite {
    reason: StopReason,
    process_set: String,
    group: RangeSet,
}

#[derive(Clone)]
pub struct EventDispatcher {
    channel: Arc<CommandChannel>,
    store: Arc<Mutex<DataStore>>,
    focus: Arc<Mutex<Focus>>,
    sink: Arc<dyn EventSink>,
    run_state: Arc<Mutex<RunState>>,
    /// Stops waiting for the thread refresh issued under the given token.
    awaiting: Arc<Mutex<Vec<(u64, StopSite)>>>,
    poll_interval: Duration,
}

impl EventDispatcher {
    pub fn new(
        channel: Arc<CommandChannel>,
        store: Arc<Mutex<DataStore>>,
        focus: Arc<Mutex<Focus>>,
        sink: Arc<dyn EventSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            channel,
            store,
            focus,
            sink,
            run_state: Arc::new(Mutex::new(RunState::Stopped)),
            awaiting: Arc::new(Mutex::new(Vec::new())),
            poll_interval,
        }
    }

    pub async fn run_state(&self) -> RunState {
        *self.run_state.lock().await
    }

    pub async fn handle_async(&self, record: &Record) {
        match record.reason() {
            "running" => {
                self.set_state(RunState::Running).await;
                self.sink.emit(DebugEvent::Continued);
            }
            "stopped" => self.handle_stopped(record).await,
            other => tracing::debug!(reason = other, "ignoring async record"),
        }
    }

    async fn handle_stopped(&self, record: &Record) {
        let reason = record.get_str("reason").unwrap_or_default();
        match reason {
            "breakpoint-hit" | "end-stepping-range" => {
                self.set_state(RunState::Stopped).await;
                self.handle_location_stop(record, reason).await;
            }
            "exited-normally" => self.handle_exit().await,
            other => {
                tracing::warn!(reason = other, "unrecognized stop reason");
                self.set_state(RunState::Stopped).await;
                self.sink.emit(DebugEvent::Stopped {
                    reason: StopReason::Other(other.to_string()),
                    rank: None,
                });
            }
        }
    }

    async fn handle_location_stop(&self, record: &Record, reason: &str) {
        let stop_reason = match reason {
            // breakpoint 0 is the implicit stop at program entry
            "breakpoint-hit" if record.get_str("bkptno") == Some("0") => StopReason::Entry,
            "breakpoint-hit" => StopReason::Breakpoint,
            _ => StopReason::Step,
        };

        let Some(site) = stop_site(record, stop_reason.clone()) else {
            self.sink.emit(DebugEvent::Stopped {
                reason: stop_reason,
                rank: None,
            });
            return;
        };

        let location = frame_location(record);
        {
            let mut store = self.store.lock().await;
            store.record_stop(&site.process_set, site.group.clone(), reason);
            if let Some(location) = &location {
                store.set_source(&site.process_set, site.group.clone(), location.clone());
            }
        }

        if let Some(location) = location {
            let focus = self.focus.lock().await;
            if focus.admits(&site.process_set, &site.group) {
                self.sink.emit(DebugEvent::RevealSource(location));
            }
        }

        // Per-rank stops go out when the refresh result is routed, so they
        // stay ahead of any later `*running`.
        match self.channel.send_begin(THREAD_INFO).await {
            Ok(Submission::Pending { token, .. }) => {
                self.awaiting.lock().await.push((token, site));
            }
            Ok(Submission::Immediate) => self.emit_rank_stops(site).await,
            Err(e) => {
                tracing::warn!(error = %e, "could not refresh threads after stop");
                self.emit_rank_stops(site).await;
            }
        }
    }

    /// Called for every delivered result. Completes the stops that were
    /// waiting on `token`.
    pub async fn handle_result(&self, token: u64, record: &Record) {
        let ready: Vec<StopSite> = {
            let mut awaiting = self.awaiting.lock().await;
            if !awaiting.iter().any(|(t, _)| *t == token) {
                return;
            }
            let (ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut *awaiting)
                .into_iter()
                .partition(|(t, _)| *t == token);
            *awaiting = rest;
            ready.into_iter().map(|(_, site)| site).collect()
        };

        if record.is_error() {
            tracing::warn!(token, "thread refresh after stop failed");
        } else {
            let mut store = self.store.lock().await;
            apply_thread_info(&mut store, record);
        }
        for site in ready {
            self.emit_rank_stops(site).await;
        }
    }

    /// Reports stops whose thread refresh will never arrive.
    async fn flush_awaiting(&self) {
        let stale = std::mem::take(&mut *self.awaiting.lock().await);
        for (_, site) in stale {
            self.emit_rank_stops(site).await;
        }
    }

    async fn emit_rank_stops(&self, site: StopSite) {
        let ranks = self
            .focus
            .lock()
            .await
            .filter(&site.process_set, &site.group);
        for rank in ranks.ranks() {
            self.sink.emit(DebugEvent::Stopped {
                reason: site.reason.clone(),
                rank: Some(RankId {
                    process_set: site.process_set.clone(),
                    rank,
                }),
            });
        }
    }

    pub(crate) async fn handle_exit(&self) {
        if !self.mark_exited().await {
            return;
        }
        // the backend may already be gone, so the reply is never awaited
        if let Err(e) = self.channel.send_begin(EXIT_COMMAND).await {
            tracing::debug!(error = %e, "could not send exit command");
        }
        self.channel.shutdown().await;
        self.flush_awaiting().await;
        self.sink.emit(DebugEvent::Exited);
    }

    /// Transport went away. Emits `Exited` unless the target already exited.
    pub async fn handle_close(&self) {
        if !self.mark_exited().await {
            return;
        }
        self.channel.shutdown().await;
        self.flush_awaiting().await;
        self.sink.emit(DebugEvent::Exited);
    }

    /// Returns `false` when the session was already exited.
    async fn mark_exited(&self) -> bool {
        let mut state = self.run_state.lock().await;
        if *state == RunState::Exited {
            return false;
        }
        *state = RunState::Exited;
        true
    }

    async fn set_state(&self, next: RunState) {
        let mut state = self.run_state.lock().await;
        if *state != RunState::Exited {
            *state = next;
        }
    }

    /// Polls until the target is stopped. Fails once it has exited.
    pub async fn wait_until_stopped(&self) -> Result<()> {
        loop {
            match self.run_state().await {
                RunState::Stopped => return Ok(()),
                RunState::Exited => return Err(BridgeError::ChannelClosed),
                RunState::Running => sleep(self.poll_interval).await,
            }
        }
    }
}

fn stop_site(record: &Record, reason: StopReason) -> Option<StopSite> {
    let Some(process_set) = record.get_str("proc_set") else {
        tracing::warn!("stop record without proc_set");
        return None;
    };
    let Some(group) = record.get_str("group") else {
        tracing::warn!(process_set, "stop record without group");
        return None;
    };
    match RangeSet::parse(group) {
        Ok(group) => Some(StopSite {
            reason,
            process_set: process_set.to_string(),
            group,
        }),
        Err(e) => {
            tracing::warn!(process_set, group, error = %e, "skipping stop with malformed group");
            None
        }
    }
}

fn frame_location(record: &Record) -> Option<SourceLocation> {
    let frame = record.get("frame").and_then(Value::as_map)?;
    let file = frame.get_str("fullname").or_else(|| frame.get_str("file"))?;
    let line = frame.get_str("line")?.parse().ok()?;
    Some(SourceLocation {
        file: file.to_string(),
        line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::parse_record;
    use crate::transport::Transport;
    use tokio::sync::mpsc;

    struct NullTransport;

    impl Transport for NullTransport {
        fn write(&self, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn dispatcher() -> (EventDispatcher, mpsc::UnboundedReceiver<DebugEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(CommandChannel::new(Arc::new(NullTransport)));
        let dispatcher = EventDispatcher::new(
            channel,
            Arc::new(Mutex::new(DataStore::new())),
            Arc::new(Mutex::new(Focus::default())),
            Arc::new(tx),
            Duration::from_millis(5),
        );
        (dispatcher, rx)
    }

    fn record(line: &str) -> Record {
        parse_record(line).expect("test line should parse")
    }

    #[test]
    fn frame_location_prefers_fullname() {
        let rec = record(
            "*stopped,reason=\"breakpoint-hit\",frame={file=\"a.c\",fullname=\"/src/a.c\",line=\"7\"}",
        );
        assert_eq!(
            frame_location(&rec),
            Some(SourceLocation {
                file: "/src/a.c".into(),
                line: 7
            })
        );
        assert_eq!(frame_location(&record("*stopped,reason=\"x\"")), None);
    }

    #[tokio::test]
    async fn running_emits_continued() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher.handle_async(&record("*running,thread-id=\"all\"")).await;
        assert_eq!(rx.recv().await, Some(DebugEvent::Continued));
        assert_eq!(dispatcher.run_state().await, RunState::Running);
    }

    #[tokio::test]
    async fn unknown_reason_emits_generic_stop() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .handle_async(&record("*stopped,reason=\"signal-received\""))
            .await;
        assert_eq!(
            rx.recv().await,
            Some(DebugEvent::Stopped {
                reason: StopReason::Other("signal-received".into()),
                rank: None
            })
        );
        assert_eq!(dispatcher.run_state().await, RunState::Stopped);
    }

    #[tokio::test]
    async fn malformed_group_is_skipped() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .handle_async(&record(
                "*stopped,reason=\"breakpoint-hit\",bkptno=\"1\",proc_set=\"App0\",group=\"5..2\"",
            ))
            .await;
        assert_eq!(
            rx.recv().await,
            Some(DebugEvent::Stopped {
                reason: StopReason::Breakpoint,
                rank: None
            })
        );
        assert!(dispatcher.store.lock().await.sources.is_empty());
    }

    #[tokio::test]
    async fn rank_stops_wait_for_the_thread_refresh() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .handle_async(&record(
                "*stopped,reason=\"end-stepping-range\",proc_set=\"App0\",group=\"0..1\"",
            ))
            .await;
        assert!(rx.try_recv().is_err());

        // an unrelated result releases nothing
        dispatcher.handle_result(7, &record("7^done")).await;
        assert!(rx.try_recv().is_err());

        dispatcher
            .handle_result(1, &record("1^done,threads=[{id=\"1\",state=\"stopped\"}]"))
            .await;
        for rank in 0..2 {
            assert_eq!(
                rx.try_recv().ok(),
                Some(DebugEvent::Stopped {
                    reason: StopReason::Step,
                    rank: Some(RankId {
                        process_set: "App0".into(),
                        rank
                    })
                })
            );
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_flushes_stops_still_waiting() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .handle_async(&record(
                "*stopped,reason=\"breakpoint-hit\",bkptno=\"2\",proc_set=\"App0\",group=\"3\"",
            ))
            .await;
        dispatcher.handle_close().await;

        assert_eq!(
            rx.try_recv().ok(),
            Some(DebugEvent::Stopped {
                reason: StopReason::Breakpoint,
                rank: Some(RankId {
                    process_set: "App0".into(),
                    rank: 3
                })
            })
        );
        assert_eq!(rx.try_recv().ok(), Some(DebugEvent::Exited));
    }

    #[tokio::test]
    async fn exit_is_reported_once() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .handle_async(&record("*stopped,reason=\"exited-normally\""))
            .await;
        dispatcher.handle_close().await;

        assert_eq!(rx.recv().await, Some(DebugEvent::Exited));
        assert!(rx.try_recv().is_err());
        assert_eq!(dispatcher.run_state().await, RunState::Exited);
        assert!(dispatcher.channel.is_closed().await);
    }

    #[tokio::test]
    async fn wait_until_stopped_polls_through_running() {
        let (dispatcher, _rx) = dispatcher();
        dispatcher.handle_async(&record("*running")).await;

        let waiter = dispatcher.clone();
        let handle = tokio::spawn(async move { waiter.wait_until_stopped().await });
        sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        dispatcher.set_state(RunState::Stopped).await;
        handle
            .await
            .expect("waiter task")
            .expect("target stopped");
    }

    #[tokio::test]
    async fn wait_until_stopped_fails_after_exit() {
        let (dispatcher, _rx) = dispatcher();
        dispatcher.handle_close().await;
        assert!(matches!(
            dispatcher.wait_until_stopped().await,
            Err(BridgeError::ChannelClosed)
        ));
    }
}

//! Token-tagged command submission and result correlation.
//!
//! Every MI command gets a fresh token prefix. The `^` result carrying that
//! token completes the submission. A small set of read-only queries is
//! de-duplicated: while one is in flight, identical submissions join it
//! instead of writing again, and all joiners receive the same record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;

use crate::error::BridgeError;
use crate::mi::{Record, RecordKind};
use crate::transport::Transport;
use crate::Result;

/// Queries whose concurrent duplicates share one round trip.
pub const DEDUP_COMMANDS: [&str; 5] = [
    "-thread-info",
    "-stack-list-frames",
    "-procset-list",
    "-var-update --all-values *",
    "-stack-list-variables",
];

/// Outcome of [`CommandChannel::send_begin`].
#[derive(Debug)]
pub enum Submission {
    /// Console input; the backend sends no tokenized result.
    Immediate,
    Pending {
        token: u64,
        /// `true` when this submission joined an identical in-flight command.
        shared: bool,
        rx: oneshot::Receiver<Record>,
    },
}

/// What [`CommandChannel::resolve`] did with a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Delivered { token: u64, waiters: usize },
    /// A result for a token nobody waits on (timed out or already resolved).
    Unmatched(u64),
    /// An untokenized `^error`.
    UnsolicitedError(String),
    /// Not a result record, or an untokenized success.
    Ignored,
}

struct PendingCommand {
    command: String,
    waiters: Vec<oneshot::Sender<Record>>,
}

#[derive(Default)]
struct ChannelState {
    next_token: u64,
    pending: HashMap<u64, PendingCommand>,
    in_flight: HashMap<String, u64>,
    closed: bool,
}

pub struct CommandChannel {
    transport: Arc<dyn Transport>,
    state: Mutex<ChannelState>,
}

/// MI commands start with `-`; anything else is console input.
pub fn is_mi_command(command: &str) -> bool {
    command.trim_start().starts_with('-')
}

impl CommandChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Mutex::new(ChannelState::default()),
        }
    }

    /// Writes `command` and registers for its result without waiting.
    ///
    /// Registration happens before this returns, so a result fed in right
    /// after is never lost.
    pub async fn send_begin(&self, command: &str) -> Result<Submission> {
        let command = command.trim_end();
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BridgeError::ChannelClosed);
        }

        if !is_mi_command(command) {
            self.transport.write(&format!("{command}\n"))?;
            tracing::debug!(command, "sent console input");
            return Ok(Submission::Immediate);
        }

        let (tx, rx) = oneshot::channel();

        if let Some(&token) = state.in_flight.get(command) {
            if let Some(pending) = state.pending.get_mut(&token) {
                pending.waiters.push(tx);
                tracing::debug!(token, command, "joined in-flight command");
                return Ok(Submission::Pending {
                    token,
                    shared: true,
                    rx,
                });
            }
        }

        let token = state.next_token + 1;
        self.transport.write(&format!("{token}{command}\n"))?;
        state.next_token = token;
        state.pending.insert(
            token,
            PendingCommand {
                command: command.to_string(),
                waiters: vec![tx],
            },
        );
        if DEDUP_COMMANDS.contains(&command) {
            state.in_flight.insert(command.to_string(), token);
        }
        tracing::debug!(token, command, "sent command");

        Ok(Submission::Pending {
            token,
            shared: false,
            rx,
        })
    }

    /// Waits for the result of a pending submission.
    pub async fn await_result(&self, rx: oneshot::Receiver<Record>) -> Result<Record> {
        rx.await.map_err(|_| BridgeError::ChannelClosed)
    }

    /// Sends and waits. Console input completes with `None`.
    pub async fn send(&self, command: &str) -> Result<Option<Record>> {
        match self.send_begin(command).await? {
            Submission::Immediate => Ok(None),
            Submission::Pending { rx, .. } => self.await_result(rx).await.map(Some),
        }
    }

    /// Like [`send`](Self::send) but gives up after `wait`. A timed-out
    /// submission stops waiting; other joiners of the same command keep theirs.
    pub async fn send_with_timeout(&self, command: &str, wait: Duration) -> Result<Option<Record>> {
        let (token, rx) = match self.send_begin(command).await? {
            Submission::Immediate => return Ok(None),
            Submission::Pending { token, rx, .. } => (token, rx),
        };

        match timeout(wait, rx).await {
            Ok(Ok(record)) => Ok(Some(record)),
            Ok(Err(_)) => Err(BridgeError::ChannelClosed),
            Err(_) => {
                self.abandon(token).await;
                Err(BridgeError::Timeout {
                    command: command.trim_end().to_string(),
                    timeout: wait,
                })
            }
        }
    }

    /// Drops waiters whose receivers are gone; forgets the token once none remain.
    async fn abandon(&self, token: u64) {
        let mut state = self.state.lock().await;
        let Some(pending) = state.pending.get_mut(&token) else {
            return;
        };
        pending.waiters.retain(|tx| !tx.is_closed());
        if pending.waiters.is_empty() {
            if let Some(pending) = state.pending.remove(&token) {
                if state.in_flight.get(&pending.command) == Some(&token) {
                    state.in_flight.remove(&pending.command);
                }
                tracing::debug!(token, command = %pending.command, "abandoned command");
            }
        }
    }

    /// Routes a parsed record to whoever waits on its token.
    pub async fn resolve(&self, record: &Record) -> Resolution {
        if record.kind != RecordKind::Result {
            return Resolution::Ignored;
        }

        let Some(token) = record.token else {
            if record.is_error() {
                let message = record
                    .error_message()
                    .unwrap_or("unknown backend error")
                    .to_string();
                return Resolution::UnsolicitedError(message);
            }
            return Resolution::Ignored;
        };

        let mut state = self.state.lock().await;
        let Some(pending) = state.pending.remove(&token) else {
            tracing::debug!(token, "result for unknown token");
            return Resolution::Unmatched(token);
        };
        if state.in_flight.get(&pending.command) == Some(&token) {
            state.in_flight.remove(&pending.command);
        }
        drop(state);

        let waiters = pending.waiters.len();
        for tx in pending.waiters {
            // a waiter that already gave up is fine
            let _ = tx.send(record.clone());
        }
        tracing::debug!(token, command = %pending.command, waiters, "resolved command");
        Resolution::Delivered { token, waiters }
    }

    /// Rejects every outstanding and future submission. Returns how many
    /// commands were still pending.
    pub async fn shutdown(&self) -> usize {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.in_flight.clear();
        let dropped = state.pending.len();
        state.pending.clear();
        if dropped > 0 {
            tracing::info!(dropped, "closed command channel with pending commands");
        }
        dropped
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::parse_record;

    #[derive(Default)]
    struct RecordingTransport {
        writes: std::sync::Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn writes(&self) -> Vec<String> {
            self.writes.lock().expect("writes lock").clone()
        }
    }

    impl Transport for RecordingTransport {
        fn write(&self, text: &str) -> Result<()> {
            if self.fail {
                return Err(BridgeError::Transport("broken pipe".into()));
            }
            self.writes.lock().expect("writes lock").push(text.to_string());
            Ok(())
        }
    }

    fn channel() -> (Arc<RecordingTransport>, CommandChannel) {
        let transport = Arc::new(RecordingTransport::default());
        let channel = CommandChannel::new(transport.clone());
        (transport, channel)
    }

    fn record(line: &str) -> Record {
        parse_record(line).expect("test line should parse")
    }

    fn pending(submission: Submission) -> (u64, bool, oneshot::Receiver<Record>) {
        match submission {
            Submission::Pending { token, shared, rx } => (token, shared, rx),
            Submission::Immediate => panic!("expected a pending submission"),
        }
    }

    #[tokio::test]
    async fn tokens_are_increasing_and_prefixed() {
        let (transport, channel) = channel();
        let (t1, _, _rx1) = pending(channel.send_begin("-exec-continue").await.expect("send"));
        let (t2, _, _rx2) = pending(channel.send_begin("-exec-next\n").await.expect("send"));

        assert_eq!((t1, t2), (1, 2));
        assert_eq!(transport.writes(), vec!["1-exec-continue\n", "2-exec-next\n"]);
        assert_eq!(channel.pending_count().await, 2);
    }

    #[tokio::test]
    async fn console_input_is_written_verbatim_and_completes_immediately() {
        let (transport, channel) = channel();
        let result = channel.send("launch $App0 ./a.out").await.expect("send");
        assert!(result.is_none());
        assert_eq!(transport.writes(), vec!["launch $App0 ./a.out\n"]);
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test]
    async fn result_completes_matching_submission() {
        let (_, channel) = channel();
        let (token, _, rx) = pending(channel.send_begin("-break-insert a.c:3").await.expect("send"));

        let resolution = channel
            .resolve(&record(&format!("{token}^done,bkpt={{number=\"1\"}}")))
            .await;
        assert_eq!(resolution, Resolution::Delivered { token, waiters: 1 });

        let result = channel.await_result(rx).await.expect("result");
        assert_eq!(result.token, Some(token));
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test]
    async fn identical_queries_share_one_write() {
        let (transport, channel) = channel();
        let (t1, shared1, rx1) = pending(channel.send_begin("-thread-info").await.expect("send"));
        let (t2, shared2, rx2) = pending(channel.send_begin("-thread-info").await.expect("send"));

        assert_eq!(t1, t2);
        assert!(!shared1);
        assert!(shared2);
        assert_eq!(transport.writes(), vec!["1-thread-info\n"]);

        let resolution = channel.resolve(&record("1^done,threads=[]")).await;
        assert_eq!(resolution, Resolution::Delivered { token: 1, waiters: 2 });
        let a = channel.await_result(rx1).await.expect("first");
        let b = channel.await_result(rx2).await.expect("second");
        assert_eq!(a, b);

        // once resolved, the next query goes out again
        let (t3, shared3, _rx3) = pending(channel.send_begin("-thread-info").await.expect("send"));
        assert_eq!(t3, 2);
        assert!(!shared3);
    }

    #[tokio::test]
    async fn non_query_commands_are_never_shared() {
        let (transport, channel) = channel();
        let (t1, _, _rx1) = pending(channel.send_begin("-exec-next").await.expect("send"));
        let (t2, _, _rx2) = pending(channel.send_begin("-exec-next").await.expect("send"));
        assert_ne!(t1, t2);
        assert_eq!(transport.writes().len(), 2);
    }

    #[tokio::test]
    async fn unknown_token_is_reported_unmatched() {
        let (_, channel) = channel();
        assert_eq!(
            channel.resolve(&record("42^done")).await,
            Resolution::Unmatched(42)
        );
    }

    #[tokio::test]
    async fn untokenized_error_is_surfaced() {
        let (_, channel) = channel();
        assert_eq!(
            channel.resolve(&record("^error,msg=\"No symbol table\"")).await,
            Resolution::UnsolicitedError("No symbol table".into())
        );
        assert_eq!(channel.resolve(&record("^done")).await, Resolution::Ignored);
        assert_eq!(
            channel.resolve(&record("*running,thread-id=\"all\"")).await,
            Resolution::Ignored
        );
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_registered() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        });
        let channel = CommandChannel::new(transport);

        let err = channel.send_begin("-thread-info").await.expect_err("write fails");
        assert!(matches!(err, BridgeError::Transport(_)));
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_pending_and_future_sends() {
        let (_, channel) = channel();
        let (_, _, rx) = pending(channel.send_begin("-stack-list-frames").await.expect("send"));

        assert_eq!(channel.shutdown().await, 1);
        assert!(channel.is_closed().await);
        assert!(matches!(
            channel.await_result(rx).await,
            Err(BridgeError::ChannelClosed)
        ));
        assert!(matches!(
            channel.send_begin("-exec-continue").await,
            Err(BridgeError::ChannelClosed)
        ));
        assert!(matches!(
            channel.send("help").await,
            Err(BridgeError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn timeout_forgets_the_command() {
        let (_, channel) = channel();
        let err = channel
            .send_with_timeout("-procset-list", Duration::from_millis(10))
            .await
            .expect_err("nobody answers");
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert_eq!(channel.pending_count().await, 0);
        assert_eq!(
            channel.resolve(&record("1^done")).await,
            Resolution::Unmatched(1)
        );
    }

    #[tokio::test]
    async fn timeout_keeps_other_joiners_waiting() {
        let (_, channel) = channel();
        let (_, _, rx) = pending(channel.send_begin("-procset-list").await.expect("send"));

        let err = channel
            .send_with_timeout("-procset-list", Duration::from_millis(10))
            .await
            .expect_err("nobody answers in time");
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert_eq!(channel.pending_count().await, 1);

        assert_eq!(
            channel.resolve(&record("1^done,pe_sets=[]")).await,
            Resolution::Delivered { token: 1, waiters: 1 }
        );
        assert!(channel.await_result(rx).await.is_ok());
    }
}

//! One debugging session: line intake, routing, and run control.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::channel::{CommandChannel, Resolution};
use crate::config::BridgeConfig;
use crate::dispatcher::{EventDispatcher, RunState};
use crate::error::BridgeError;
use crate::events::{DebugEvent, EventSink, OutputCategory};
use crate::focus::Focus;
use crate::mi::{parse_record, Record, RecordKind};
use crate::ranges::{Rank, RangeSet};
use crate::store::DataStore;
use crate::transport::{LineBuffer, ProcessOutput, ProcessTransport, Transport};
use crate::types::{AssertionScript, Comparison, LaunchApp, Procset, SourceLocation};
use crate::Result;

const EXIT_GRACE: Duration = Duration::from_secs(2);

pub struct DebugSession {
    config: BridgeConfig,
    channel: Arc<CommandChannel>,
    dispatcher: EventDispatcher,
    store: Arc<Mutex<DataStore>>,
    focus: Arc<Mutex<Focus>>,
    sink: Arc<dyn EventSink>,
    lines: Mutex<LineBuffer>,
    pub(crate) procsets: Mutex<Vec<Procset>>,
    pub(crate) comparisons: Mutex<Vec<Comparison>>,
    pub(crate) scripts: Mutex<Vec<AssertionScript>>,
}

impl DebugSession {
    pub fn new(config: BridgeConfig, transport: Arc<dyn Transport>, sink: Arc<dyn EventSink>) -> Self {
        let channel = Arc::new(CommandChannel::new(transport));
        let store = Arc::new(Mutex::new(DataStore::new()));
        let focus = Arc::new(Mutex::new(Focus::default()));
        let dispatcher = EventDispatcher::new(
            channel.clone(),
            store.clone(),
            focus.clone(),
            sink.clone(),
            config.poll_interval,
        );

        Self {
            config,
            channel,
            dispatcher,
            store,
            focus,
            sink,
            lines: Mutex::new(LineBuffer::new()),
            procsets: Mutex::new(Vec::new()),
            comparisons: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<Mutex<DataStore>> {
        &self.store
    }

    pub fn focus(&self) -> &Arc<Mutex<Focus>> {
        &self.focus
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub async fn run_state(&self) -> RunState {
        self.dispatcher.run_state().await
    }

    /// Accepts raw backend output. Complete lines are dispatched in order.
    pub async fn feed(&self, chunk: &str) {
        let lines = self.lines.lock().await.push(chunk);
        for line in lines {
            self.dispatch_line(&line).await;
        }
    }

    /// Routes one clean line.
    pub async fn dispatch_line(&self, line: &str) {
        let Some(record) = parse_record(line) else {
            tracing::debug!(line, "unparsed backend line");
            self.output(format!("{line}\n"), OutputCategory::Diagnostic);
            if line.to_ascii_lowercase().contains("error") {
                tracing::error!(line, "backend reported an error");
                self.output(format!("{line}\n"), OutputCategory::Error);
            }
            return;
        };

        match record.kind {
            RecordKind::Result => match self.channel.resolve(&record).await {
                Resolution::UnsolicitedError(message) => {
                    tracing::error!(error = %message, "backend error without a command");
                    self.output(format!("{message}\n"), OutputCategory::Error);
                }
                Resolution::Unmatched(token) => {
                    tracing::debug!(token, "dropped late result");
                }
                Resolution::Delivered { token, .. } => {
                    self.dispatcher.handle_result(token, &record).await;
                }
                Resolution::Ignored => {}
            },
            RecordKind::Async => self.dispatcher.handle_async(&record).await,
            RecordKind::ConsoleStream => self.stream(record, OutputCategory::Console),
            RecordKind::TargetStream => self.stream(record, OutputCategory::Program),
            RecordKind::Log => self.stream(record, OutputCategory::MiLog),
        }
    }

    /// The backend closed its output.
    pub async fn handle_close(&self) {
        if let Some(tail) = self.lines.lock().await.flush() {
            self.dispatch_line(&tail).await;
        }
        self.dispatcher.handle_close().await;
    }

    fn stream(&self, record: Record, category: OutputCategory) {
        if let Some(text) = record.payload {
            self.output(format!("{text}\n"), category);
        }
    }

    fn output(&self, text: String, category: OutputCategory) {
        self.sink.emit(DebugEvent::Output { text, category });
    }

    /// Sends raw input. MI commands wait for their result, console input
    /// returns `None` once written.
    pub async fn send_command(&self, text: &str) -> Result<Option<Record>> {
        self.channel
            .send_with_timeout(text, self.config.command_timeout)
            .await
    }

    /// Runs an MI command and turns `^error` into [`BridgeError::CommandFailed`].
    pub async fn query(&self, command: &str) -> Result<Record> {
        let record = self
            .send_command(command)
            .await?
            .ok_or_else(|| BridgeError::command_failed(command, "console input has no result"))?;
        if let Some(message) = record.error_message() {
            return Err(BridgeError::command_failed(command, message));
        }
        if record.is_error() {
            return Err(BridgeError::command_failed(command, "unknown backend error"));
        }
        Ok(record)
    }

    pub async fn launch(&self, apps: &[LaunchApp]) -> Result<()> {
        for app in apps {
            tracing::info!(procset = %app.procset, program = %app.program, "launching");
            self.send_command(&app.command()).await?;
        }
        Ok(())
    }

    pub async fn continue_all(&self) -> Result<Record> {
        self.query("-exec-continue").await
    }

    pub async fn next(&self) -> Result<Record> {
        self.query("-exec-next").await
    }

    pub async fn step_in(&self) -> Result<Record> {
        self.query("-exec-step").await
    }

    pub async fn step_out(&self) -> Result<Record> {
        self.query("-exec-finish").await
    }

    /// Interrupts a running job. Does nothing while stopped.
    pub async fn pause(&self) -> Result<Option<Record>> {
        if self.run_state().await != RunState::Running {
            return Ok(None);
        }
        self.query("-exec-interrupt").await.map(Some)
    }

    /// Asks the backend to exit and closes the session without waiting.
    pub async fn terminate(&self) {
        self.dispatcher.handle_exit().await;
    }

    pub async fn wait_until_stopped(&self) -> Result<()> {
        self.dispatcher.wait_until_stopped().await
    }

    pub async fn set_display_filter(&self, process_set: &str, ranks: &str) -> Result<RangeSet> {
        let ranks = RangeSet::parse(ranks)?;
        self.focus
            .lock()
            .await
            .set_filter(process_set, ranks.clone());
        Ok(ranks)
    }

    pub async fn clear_display_filter(&self, process_set: &str) -> bool {
        self.focus.lock().await.clear_filter(process_set)
    }

    /// Picks the rank whose location the editor follows and reveals it.
    pub async fn set_display_rank(&self, process_set: &str, rank: Rank) -> Option<SourceLocation> {
        self.focus.lock().await.set_display_rank(process_set, rank);
        let location = self.store.lock().await.source_at(process_set, rank).cloned();
        if let Some(location) = &location {
            self.sink.emit(DebugEvent::RevealSource(location.clone()));
        }
        location
    }

    /// Location of the display rank of `process_set`, if it has stopped anywhere.
    pub async fn current_source(&self, process_set: &str) -> Option<SourceLocation> {
        let rank = self.focus.lock().await.display_rank(process_set);
        self.store.lock().await.source_at(process_set, rank).cloned()
    }
}

/// A session wired to a spawned gdb4hpc process.
pub struct SpawnedSession {
    pub session: Arc<DebugSession>,
    process: Arc<ProcessTransport>,
    reader_task: JoinHandle<()>,
}

impl SpawnedSession {
    pub fn spawn(config: BridgeConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let (process, output) = ProcessTransport::spawn(&config)?;
        let process = Arc::new(process);
        let session = Arc::new(DebugSession::new(config, process.clone(), sink));
        let reader_task = tokio::spawn(reader_loop(output, session.clone()));

        Ok(Self {
            session,
            process,
            reader_task,
        })
    }

    /// Sends the exit command, then tears the process down.
    pub async fn shutdown(self) {
        self.session.terminate().await;
        self.process.shutdown(EXIT_GRACE).await;
        self.reader_task.abort();
    }
}

async fn reader_loop(mut output: ProcessOutput, session: Arc<DebugSession>) {
    loop {
        match output.next_chunk().await {
            Ok(Some(chunk)) => session.feed(&chunk).await,
            Ok(None) => {
                tracing::info!("gdb4hpc closed its output");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read gdb4hpc output");
                break;
            }
        }
    }
    session.handle_close().await;
}

use std::{collections::VecDeque, path::PathBuf, sync::Arc};

use gdb4hpc_bridge_core::{
    ops::{breakpoints, procsets, scripts, stack, threads, variables},
    types::{Assertion, AssertionScript, LaunchApp},
    BridgeConfig, BridgeError, DebugEvent, DebugSession, RunState, SpawnedSession,
};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    tool, tool_handler, tool_router, transport, ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MAX_RECENT_EVENTS: usize = 1024;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct LaunchAppSpec {
    /// Process set name without the leading `$`, e.g. `App0`.
    procset: String,
    program: String,
    #[serde(default)]
    args: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct LaunchParams {
    apps: Vec<LaunchAppSpec>,
    #[serde(default)]
    gdb4hpc_path: Option<String>,
    #[serde(default)]
    gdb4hpc_args: Option<Vec<String>>,
    #[serde(default)]
    cwd: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct CommandParams {
    /// MI command (starting with `-`) or console input.
    command: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct SetBreakpointsParams {
    source_path: String,
    lines: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct StackParams {
    #[serde(default)]
    start: usize,
    #[serde(default)]
    levels: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct EvaluateParams {
    expression: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DefineProcsetParams {
    name: String,
    /// Scoped rank list, e.g. `$App0{0..3}`.
    spec: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct FocusParams {
    name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DisplayFilterParams {
    process_set: String,
    /// Ranks to show, e.g. `0..3,7`. Omit to show every rank.
    #[serde(default)]
    ranks: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DisplayRankParams {
    process_set: String,
    rank: u64,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ComparisonParams {
    text: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ComparisonIndexParams {
    index: usize,
    #[serde(default)]
    checked: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DecompositionParams {
    commands: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct AssertionScriptParams {
    name: String,
    #[serde(default)]
    stop_on_error: bool,
    asserts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ScriptNameParams {
    name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct RecentEventsParams {
    /// Only return events with a sequence number at or after this one.
    #[serde(default)]
    since: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum SessionState {
    Idle,
    Launched,
}

struct SessionManager {
    state: SessionState,
    session: Option<SpawnedSession>,
    event_task: Option<JoinHandle<()>>,
}

impl SessionManager {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            session: None,
            event_task: None,
        }
    }

    /// Drops a session whose backend already exited. Returns `true` if one
    /// was removed.
    async fn reap_exited(&mut self) -> bool {
        let exited = match &self.session {
            Some(spawned) => spawned.session.run_state().await == RunState::Exited,
            None => false,
        };
        if !exited {
            return false;
        }
        if let Some(spawned) = self.session.take() {
            spawned.shutdown().await;
        }
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        self.state = SessionState::Idle;
        tracing::info!("reaped exited gdb4hpc session");
        true
    }
}

type RecentEvents = Arc<Mutex<VecDeque<(u64, Value)>>>;

#[derive(Clone)]
struct Gdb4hpcMcpServer {
    tool_router: ToolRouter<Self>,
    session: Arc<Mutex<SessionManager>>,
    events: RecentEvents,
}

async fn event_pump(mut rx: mpsc::UnboundedReceiver<DebugEvent>, events: RecentEvents) {
    let mut seq = 0_u64;
    while let Some(event) = rx.recv().await {
        if let DebugEvent::Stopped { reason, rank } = &event {
            tracing::debug!(?reason, ?rank, "target stopped");
        }
        let value = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode debug event");
                continue;
            }
        };
        let mut recent = events.lock().await;
        push_recent_event(&mut recent, seq, value);
        seq = seq.saturating_add(1);
    }
}

fn push_recent_event(events: &mut VecDeque<(u64, Value)>, seq: u64, event: Value) {
    events.push_back((seq, event));
    while events.len() > MAX_RECENT_EVENTS {
        events.pop_front();
    }
}

fn to_mcp_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

fn bridge_error(tool_name: &str, err: BridgeError) -> McpError {
    to_mcp_error(format!("{tool_name} failed: {err}"))
}

fn idle_session_error(tool_name: &str) -> McpError {
    to_mcp_error(format!(
        "{tool_name} requires a running gdb4hpc session. Call gdb4hpc_launch first."
    ))
}

fn launch_config(params: &LaunchParams) -> BridgeConfig {
    let mut config = BridgeConfig::from_env();
    if let Some(path) = &params.gdb4hpc_path {
        config.program = path.clone();
    }
    if let Some(args) = &params.gdb4hpc_args {
        config.args = args.clone();
    }
    if let Some(cwd) = &params.cwd {
        config.cwd = Some(PathBuf::from(cwd));
    }
    config
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| to_mcp_error(format!("Failed to encode result: {e}")))
}

#[tool_router]
impl Gdb4hpcMcpServer {
    fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
            session: Arc::new(Mutex::new(SessionManager::new())),
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// The live session. The manager lock is released before the caller
    /// awaits backend results.
    async fn active(&self, tool_name: &str) -> Result<Arc<DebugSession>, McpError> {
        let manager = self.session.lock().await;
        manager
            .session
            .as_ref()
            .map(|spawned| spawned.session.clone())
            .ok_or_else(|| idle_session_error(tool_name))
    }

    #[tool(description = "Start gdb4hpc and launch one or more applications into process sets")]
    async fn gdb4hpc_launch(
        &self,
        params: Parameters<LaunchParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let mut manager = self.session.lock().await;
        manager.reap_exited().await;

        if manager.session.is_some() {
            return Err(to_mcp_error(
                "A gdb4hpc session is already running. Terminate it before launching again.",
            ));
        }
        if params.apps.is_empty() {
            return Err(to_mcp_error("gdb4hpc_launch needs at least one app"));
        }

        let config = launch_config(&params);
        let program = config.program.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = SpawnedSession::spawn(config, Arc::new(tx))
            .map_err(|e| bridge_error("gdb4hpc_launch", e))?;

        self.events.lock().await.clear();
        let event_task = tokio::spawn(event_pump(rx, self.events.clone()));

        let apps: Vec<LaunchApp> = params
            .apps
            .into_iter()
            .map(|app| LaunchApp {
                procset: app.procset.trim_start_matches('$').to_string(),
                program: app.program,
                args: app.args,
            })
            .collect();

        if let Err(e) = spawned.session.launch(&apps).await {
            spawned.shutdown().await;
            event_task.abort();
            return Err(bridge_error("gdb4hpc_launch", e));
        }

        manager.state = SessionState::Launched;
        manager.session = Some(spawned);
        manager.event_task = Some(event_task);

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "state": "launched",
            "program": program,
            "procsets": apps.iter().map(|a| a.procset.as_str()).collect::<Vec<_>>(),
        })))
    }

    #[tool(description = "Exit gdb4hpc and end the session")]
    async fn gdb4hpc_terminate(&self) -> Result<CallToolResult, McpError> {
        let mut manager = self.session.lock().await;

        let Some(spawned) = manager.session.take() else {
            manager.state = SessionState::Idle;
            return Ok(CallToolResult::structured(json!({
                "ok": true,
                "state": "idle",
            })));
        };

        spawned.shutdown().await;
        if let Some(task) = manager.event_task.take() {
            task.abort();
        }
        manager.state = SessionState::Idle;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "state": "idle",
        })))
    }

    #[tool(description = "Session state, run state and current focus")]
    async fn gdb4hpc_status(&self) -> Result<CallToolResult, McpError> {
        let manager = self.session.lock().await;
        let state = manager.state;
        let Some(spawned) = manager.session.as_ref() else {
            return Ok(CallToolResult::structured(json!({
                "ok": true,
                "state": state,
            })));
        };
        let session = spawned.session.clone();
        drop(manager);

        let focus = session.focus().lock().await.clone();
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "state": state,
            "run_state": session.run_state().await,
            "focus": to_json(&focus)?,
        })))
    }

    #[tool(description = "Send a raw MI command or console input to gdb4hpc")]
    async fn gdb4hpc_command(
        &self,
        params: Parameters<CommandParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_command").await?;
        let record = session
            .send_command(&params.0.command)
            .await
            .map_err(|e| bridge_error("gdb4hpc_command", e))?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "result": to_json(&record)?,
        })))
    }

    #[tool(description = "Continue every rank")]
    async fn gdb4hpc_continue(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_continue").await?;
        session
            .continue_all()
            .await
            .map_err(|e| bridge_error("gdb4hpc_continue", e))?;
        Ok(CallToolResult::structured(json!({ "ok": true, "state": "running" })))
    }

    #[tool(description = "Step over the next line on every rank")]
    async fn gdb4hpc_next(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_next").await?;
        session
            .next()
            .await
            .map_err(|e| bridge_error("gdb4hpc_next", e))?;
        Ok(CallToolResult::structured(json!({ "ok": true, "state": "running" })))
    }

    #[tool(description = "Step into the next call on every rank")]
    async fn gdb4hpc_step_in(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_step_in").await?;
        session
            .step_in()
            .await
            .map_err(|e| bridge_error("gdb4hpc_step_in", e))?;
        Ok(CallToolResult::structured(json!({ "ok": true, "state": "running" })))
    }

    #[tool(description = "Run until the current function returns on every rank")]
    async fn gdb4hpc_step_out(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_step_out").await?;
        session
            .step_out()
            .await
            .map_err(|e| bridge_error("gdb4hpc_step_out", e))?;
        Ok(CallToolResult::structured(json!({ "ok": true, "state": "running" })))
    }

    #[tool(description = "Interrupt every rank")]
    async fn gdb4hpc_pause(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_pause").await?;
        session
            .pause()
            .await
            .map_err(|e| bridge_error("gdb4hpc_pause", e))?;
        Ok(CallToolResult::structured(json!({ "ok": true })))
    }

    #[tool(description = "Replace the breakpoints of one source file; waits until the job is stopped")]
    async fn gdb4hpc_set_breakpoints(
        &self,
        params: Parameters<SetBreakpointsParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.active("gdb4hpc_set_breakpoints").await?;
        let placed = breakpoints::set_breakpoints(&session, &params.source_path, &params.lines)
            .await
            .map_err(|e| bridge_error("gdb4hpc_set_breakpoints", e))?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "breakpoints": to_json(&placed)?,
        })))
    }

    #[tool(description = "All breakpoints with the ranks they apply to")]
    async fn gdb4hpc_breakpoints(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_breakpoints").await?;
        let known = breakpoints::breakpoints(&session).await;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "breakpoints": to_json(&known)?,
        })))
    }

    #[tool(description = "Threads per process set and rank group in focus")]
    async fn gdb4hpc_threads(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_threads").await?;
        let groups = threads::threads(&session)
            .await
            .map_err(|e| bridge_error("gdb4hpc_threads", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "threads": to_json(&groups)?,
        })))
    }

    #[tool(description = "Call stacks per process set and rank group in focus")]
    async fn gdb4hpc_stack(
        &self,
        params: Parameters<StackParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.active("gdb4hpc_stack").await?;
        let stacks = stack::stack_trace(&session, params.start, params.levels)
            .await
            .map_err(|e| bridge_error("gdb4hpc_stack", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "stacks": to_json(&stacks)?,
        })))
    }

    #[tool(description = "Local variables of the current frame, one row per rank group")]
    async fn gdb4hpc_variables(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_variables").await?;
        let views = variables::local_variables(&session)
            .await
            .map_err(|e| bridge_error("gdb4hpc_variables", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "variables": to_json(&views)?,
        })))
    }

    #[tool(description = "Evaluate an expression on every rank in focus")]
    async fn gdb4hpc_evaluate(
        &self,
        params: Parameters<EvaluateParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_evaluate").await?;
        let views = variables::evaluate(&session, &params.0.expression)
            .await
            .map_err(|e| bridge_error("gdb4hpc_evaluate", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "values": to_json(&views)?,
        })))
    }

    #[tool(description = "List the process sets gdb4hpc knows")]
    async fn gdb4hpc_procsets(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_procsets").await?;
        let sets = procsets::list_procsets(&session)
            .await
            .map_err(|e| bridge_error("gdb4hpc_procsets", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "procsets": to_json(&sets)?,
        })))
    }

    #[tool(description = "Define a named process set from a scoped rank list")]
    async fn gdb4hpc_define_procset(
        &self,
        params: Parameters<DefineProcsetParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.active("gdb4hpc_define_procset").await?;
        let procset = procsets::define_procset(&session, &params.name, &params.spec)
            .await
            .map_err(|e| bridge_error("gdb4hpc_define_procset", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "procset": to_json(&procset)?,
        })))
    }

    #[tool(description = "Focus the debugger on a process set")]
    async fn gdb4hpc_focus(
        &self,
        params: Parameters<FocusParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_focus").await?;
        let focus = procsets::change_focus(&session, &params.0.name)
            .await
            .map_err(|e| bridge_error("gdb4hpc_focus", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "focus": to_json(&focus)?,
        })))
    }

    #[tool(description = "Limit which ranks of a process set are reported; omit ranks to clear")]
    async fn gdb4hpc_display_filter(
        &self,
        params: Parameters<DisplayFilterParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.active("gdb4hpc_display_filter").await?;
        let ranks = match params.ranks.as_deref() {
            Some(ranks) => Some(
                session
                    .set_display_filter(&params.process_set, ranks)
                    .await
                    .map_err(|e| bridge_error("gdb4hpc_display_filter", e))?
                    .to_string(),
            ),
            None => {
                session.clear_display_filter(&params.process_set).await;
                None
            }
        };
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "process_set": params.process_set,
            "ranks": ranks,
        })))
    }

    #[tool(description = "Choose which rank's location the editor follows")]
    async fn gdb4hpc_display_rank(
        &self,
        params: Parameters<DisplayRankParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.active("gdb4hpc_display_rank").await?;
        let location = session
            .set_display_rank(&params.process_set, params.rank)
            .await;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "location": to_json(&location)?,
        })))
    }

    #[tool(description = "Add a cross-rank comparison expression")]
    async fn gdb4hpc_add_comparison(
        &self,
        params: Parameters<ComparisonParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_add_comparison").await?;
        let comparisons = scripts::add_comparison(&session, &params.0.text).await;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "comparisons": to_json(&comparisons)?,
        })))
    }

    #[tool(description = "Check, uncheck or remove (no `checked`) a comparison by index")]
    async fn gdb4hpc_edit_comparison(
        &self,
        params: Parameters<ComparisonIndexParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.active("gdb4hpc_edit_comparison").await?;
        let comparisons = match params.checked {
            Some(checked) => scripts::set_comparison_checked(&session, params.index, checked).await,
            None => scripts::remove_comparison(&session, params.index).await,
        }
        .map_err(|e| bridge_error("gdb4hpc_edit_comparison", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "comparisons": to_json(&comparisons)?,
        })))
    }

    #[tool(description = "Run every checked comparison")]
    async fn gdb4hpc_run_comparisons(&self) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_run_comparisons").await?;
        let comparisons = scripts::run_comparisons(&session)
            .await
            .map_err(|e| bridge_error("gdb4hpc_run_comparisons", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "comparisons": to_json(&comparisons)?,
        })))
    }

    #[tool(description = "Define data decompositions from console commands and list them")]
    async fn gdb4hpc_decomposition(
        &self,
        params: Parameters<DecompositionParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_decomposition").await?;
        let decompositions = scripts::build_decomposition(&session, &params.0.commands)
            .await
            .map_err(|e| bridge_error("gdb4hpc_decomposition", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "decompositions": to_json(&decompositions)?,
        })))
    }

    #[tool(description = "Define an assertion script")]
    async fn gdb4hpc_define_assertion_script(
        &self,
        params: Parameters<AssertionScriptParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.active("gdb4hpc_define_assertion_script").await?;
        let script = AssertionScript {
            name: params.name.trim_start_matches('$').to_string(),
            stop_on_error: params.stop_on_error,
            asserts: params.asserts.into_iter().map(Assertion::new).collect(),
        };
        scripts::define_assertion_script(&session, script)
            .await
            .map_err(|e| bridge_error("gdb4hpc_define_assertion_script", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "scripts": to_json(&scripts::assertion_scripts(&session).await)?,
        })))
    }

    #[tool(description = "Start a defined assertion script")]
    async fn gdb4hpc_run_assertion_script(
        &self,
        params: Parameters<ScriptNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_run_assertion_script").await?;
        scripts::run_assertion_script(&session, params.0.name.trim_start_matches('$'))
            .await
            .map_err(|e| bridge_error("gdb4hpc_run_assertion_script", e))?;
        Ok(CallToolResult::structured(json!({ "ok": true })))
    }

    #[tool(description = "Fetch pass/warn/fail counts of an assertion script")]
    async fn gdb4hpc_assertion_results(
        &self,
        params: Parameters<ScriptNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.active("gdb4hpc_assertion_results").await?;
        let script = scripts::assertion_results(&session, params.0.name.trim_start_matches('$'))
            .await
            .map_err(|e| bridge_error("gdb4hpc_assertion_results", e))?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "script": to_json(&script)?,
        })))
    }

    #[tool(description = "Recent debugger events: output, stops, continues and exits")]
    async fn gdb4hpc_events(
        &self,
        params: Parameters<RecentEventsParams>,
    ) -> Result<CallToolResult, McpError> {
        let since = params.0.since.unwrap_or(0);
        let events = self.events.lock().await;
        let selected: Vec<Value> = events
            .iter()
            .filter(|(seq, _)| *seq >= since)
            .map(|(seq, event)| json!({ "seq": seq, "event": event }))
            .collect();
        let next = events.back().map(|(seq, _)| seq + 1).unwrap_or(since);

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "events": selected,
            "next": next,
        })))
    }
}

#[tool_handler]
impl ServerHandler for Gdb4hpcMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "gdb4hpc MCP Server: launch MPI jobs under gdb4hpc and inspect them per rank".into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the protocol
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("gdb4hpc_mcp_server=info".parse()?))
        .init();

    let server = Gdb4hpcMcpServer::new();
    let transport = transport::stdio();

    tracing::info!("Starting gdb4hpc MCP Server on stdio...");

    server.serve(transport).await?.waiting().await?;

    Ok(())
}

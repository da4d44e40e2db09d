use crate::error::BridgeError;
use crate::focus::{Focus, ALL_PROCESS_SETS};
use crate::mi::{Fields, Value};
use crate::ranges::parse_scoped_list;
use crate::session::DebugSession;
use crate::types::Procset;
use crate::Result;

pub const PROCSET_LIST: &str = "-procset-list";

fn bare_name(name: &str) -> &str {
    name.trim().trim_start_matches('$')
}

fn parse_procset(fields: &Fields, focused: &str) -> Option<Procset> {
    let name = bare_name(fields.get_str("name")?).to_string();
    Some(Procset {
        selected: name == focused,
        spec: fields.get_str("proc_set").unwrap_or_default().to_string(),
        name,
    })
}

/// Process sets the backend knows, marking the focused one.
pub async fn list_procsets(session: &DebugSession) -> Result<Vec<Procset>> {
    let record = session.query(PROCSET_LIST).await?;
    let sets = record
        .get("pe_sets")
        .and_then(Value::as_list)
        .ok_or_else(|| BridgeError::missing_field(PROCSET_LIST, "pe_sets"))?;

    let focused = session.focus().lock().await.process_set.clone();
    let procsets: Vec<Procset> = sets
        .iter()
        .filter_map(Value::as_map)
        .filter_map(|fields| parse_procset(fields, &focused))
        .collect();

    *session.procsets.lock().await = procsets.clone();
    Ok(procsets)
}

/// Defines `name` as the ranks in `spec`, e.g. `$App0{0..3}`.
pub async fn define_procset(session: &DebugSession, name: &str, spec: &str) -> Result<Procset> {
    let name = bare_name(name);
    if name.is_empty() {
        return Err(BridgeError::Config("process set name is empty".into()));
    }
    parse_scoped_list(spec)?;

    session
        .query(&format!("-procset-define ${name} {}", spec.trim()))
        .await?;

    let procset = Procset {
        name: name.to_string(),
        spec: spec.trim().to_string(),
        selected: false,
    };
    let mut known = session.procsets.lock().await;
    match known.iter_mut().find(|p| p.name == procset.name) {
        Some(existing) => existing.spec = procset.spec.clone(),
        None => known.push(procset.clone()),
    }
    tracing::info!(name, spec = %procset.spec, "defined process set");
    Ok(procset)
}

/// Moves the debugger focus to `name`. Only the focused set's ranks are
/// reported afterwards; focusing `all` lifts the scope. Display filters reset.
pub async fn change_focus(session: &DebugSession, name: &str) -> Result<Focus> {
    let requested = bare_name(name);
    let record = session.query(&format!("-procset-focus ${requested}")).await?;

    let reply = record.get("focus").and_then(Value::as_map);
    let focused = reply
        .and_then(|f| f.get_str("name"))
        .map(bare_name)
        .unwrap_or(requested)
        .to_string();

    let mut known = session.procsets.lock().await;
    let spec = reply
        .and_then(|f| f.get_str("proc_set"))
        .map(str::to_string)
        .or_else(|| {
            known
                .iter()
                .find(|p| p.name == focused)
                .map(|p| p.spec.clone())
        });

    let scopes = match spec {
        Some(spec) if focused != ALL_PROCESS_SETS && !spec.is_empty() => parse_scoped_list(&spec)?,
        _ => Vec::new(),
    };
    for procset in known.iter_mut() {
        procset.selected = procset.name == focused;
    }
    drop(known);

    let mut focus = session.focus().lock().await;
    focus.focus_on(focused.as_str(), scopes);
    tracing::info!(process_set = %focused, "changed focus");
    Ok(focus.clone())
}

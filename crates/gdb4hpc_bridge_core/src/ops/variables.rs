//! Local variables and expressions, tracked as backend variable objects.
//!
//! gdb4hpc reports one value per rank group in a single string:
//!
//! ```text
//! App0{0..3}: 5
//! App0{4}: 7
//! ```
//!
//! Each group is written to the variable overlay under its own process set.

use crate::error::BridgeError;
use crate::mi::{to_display, Record, Value};
use crate::ops::{scope_of, scoped_messages};
use crate::overlay::{EntryKind, OverlayKey};
use crate::ranges::RangeSet;
use crate::session::DebugSession;
use crate::store::DataStore;
use crate::types::{Variable, VariableView};
use crate::Result;

pub const LIST_VARIABLES: &str = "-stack-list-variables";
pub const UPDATE_VARIABLES: &str = "-var-update --all-values *";

/// One `Name{ranks}: value` group of a multi-rank value.
#[derive(Debug, Clone, PartialEq)]
pub struct RankValue {
    pub process_set: String,
    pub ranks: RangeSet,
    pub value: String,
}

/// Splits a multi-rank value. Text without a scope prefix belongs to
/// `fallback_set`/`fallback_ranks`; continuation lines extend the previous value.
pub fn parse_rank_values(text: &str, fallback_set: &str, fallback_ranks: &RangeSet) -> Vec<RankValue> {
    let mut values: Vec<RankValue> = Vec::new();

    for line in text.lines() {
        match split_scope(line) {
            Some((process_set, ranks, rest)) => values.push(RankValue {
                process_set: process_set.to_string(),
                ranks,
                value: rest.trim_start().to_string(),
            }),
            None => match values.last_mut() {
                Some(last) => {
                    last.value.push('\n');
                    last.value.push_str(line);
                }
                None => values.push(RankValue {
                    process_set: fallback_set.to_string(),
                    ranks: fallback_ranks.clone(),
                    value: line.to_string(),
                }),
            },
        }
    }

    if values.is_empty() {
        values.push(RankValue {
            process_set: fallback_set.to_string(),
            ranks: fallback_ranks.clone(),
            value: String::new(),
        });
    }
    values
}

/// `$App0{0..3}: rest` → (`App0`, 0..3, ` rest`).
fn split_scope(line: &str) -> Option<(&str, RangeSet, &str)> {
    let open = line.find('{')?;
    let name = line[..open].trim_start_matches('$');
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let close = open + line[open..].find("}:")?;
    let ranks = RangeSet::parse(&line[open + 1..close]).ok()?;
    Some((name, ranks, &line[close + 2..]))
}

fn store_values(
    store: &mut DataStore,
    expression: &str,
    template: &Variable,
    text: &str,
    fallback_set: &str,
    fallback_ranks: &RangeSet,
) {
    for group in parse_rank_values(text, fallback_set, fallback_ranks) {
        let variable = Variable {
            value: group.value,
            ..template.clone()
        };
        store.variables.update(
            OverlayKey::named(EntryKind::Variable, group.process_set, expression),
            group.ranks,
            variable,
        );
    }
}

fn apply_created(store: &mut DataStore, expression: &str, record: &Record) -> Option<String> {
    let reference = record.get_str("name")?.to_string();
    let scope = scope_of(&record.fields)?;
    let template = Variable {
        name: expression.to_string(),
        reference: reference.clone(),
        type_name: record.get_str("type").map(str::to_string),
        value: String::new(),
        children: record
            .get_str("numchild")
            .and_then(|n| n.parse().ok())
            .unwrap_or(0),
    };
    store.add_handle(expression, reference.as_str());
    store_values(
        store,
        expression,
        &template,
        record.get_str("value").unwrap_or_default(),
        &scope.process_set,
        &scope.group,
    );
    Some(reference)
}

fn apply_changes(store: &mut DataStore, record: &Record) -> usize {
    let mut changed = 0;
    for msg in scoped_messages(record) {
        let Some(list) = msg.fields.get("changelist").and_then(Value::as_list) else {
            continue;
        };
        for change in list.iter().filter_map(Value::as_map) {
            let (Some(reference), Some(value)) = (change.get_str("name"), change.get_str("value"))
            else {
                continue;
            };
            let Some(handle) = store.handle_by_reference(reference).cloned() else {
                tracing::debug!(reference, "change for unknown variable object");
                continue;
            };
            let template = current_template(store, &handle.expression, reference);
            store_values(
                store,
                &handle.expression,
                &template,
                value,
                &msg.process_set,
                &msg.group,
            );
            changed += 1;
        }
    }
    changed
}

fn current_template(store: &DataStore, expression: &str, reference: &str) -> Variable {
    store
        .variables
        .keys()
        .filter(|k| k.kind == EntryKind::Variable && k.name.as_deref() == Some(expression))
        .find_map(|k| store.variables.query_all(k).first())
        .map(|entry| entry.value.clone())
        .unwrap_or_else(|| Variable {
            name: expression.to_string(),
            reference: reference.to_string(),
            type_name: None,
            value: String::new(),
            children: 0,
        })
}

fn variable_names(record: &Record) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for msg in scoped_messages(record) {
        let list = msg
            .fields
            .get("variables")
            .or_else(|| msg.fields.get("locals"))
            .and_then(Value::as_list)
            .unwrap_or_default();
        for item in list {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .or_else(|| item.as_str());
            if let Some(name) = name {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

/// Creates a variable object for `expression` unless one exists.
pub async fn ensure_variable(session: &DebugSession, expression: &str) -> Result<bool> {
    if session.store().lock().await.handle(expression).is_some() {
        return Ok(false);
    }
    let command = format!("-var-create - * \"{}\"", expression.replace('"', "\\\""));
    let record = session.query(&command).await?;
    let mut store = session.store().lock().await;
    apply_created(&mut store, expression, &record)
        .ok_or_else(|| BridgeError::missing_field(command, "name"))?;
    Ok(true)
}

/// Pulls changed values for every known variable object.
pub async fn refresh_variables(session: &DebugSession) -> Result<usize> {
    if session.store().lock().await.handles().is_empty() {
        return Ok(0);
    }
    let record = session.query(UPDATE_VARIABLES).await?;
    let mut store = session.store().lock().await;
    Ok(apply_changes(&mut store, &record))
}

/// Locals of the current frame, one row per rank group in focus.
pub async fn local_variables(session: &DebugSession) -> Result<Vec<VariableView>> {
    let record = session.query(LIST_VARIABLES).await?;
    let names = variable_names(&record);

    let mut created = false;
    for name in &names {
        created |= ensure_variable(session, name).await?;
    }
    // freshly created objects already carry current values
    if !created {
        refresh_variables(session).await?;
    }
    Ok(views(session, &names).await)
}

/// Values of `expression` on every rank in focus.
pub async fn evaluate(session: &DebugSession, expression: &str) -> Result<Vec<VariableView>> {
    if !ensure_variable(session, expression).await? {
        refresh_variables(session).await?;
    }
    Ok(views(session, &[expression.to_string()]).await)
}

async fn views(session: &DebugSession, expressions: &[String]) -> Vec<VariableView> {
    let focus = session.focus().lock().await.clone();
    let store = session.store().lock().await;

    let mut out = Vec::new();
    for expression in expressions {
        for process_set in store.process_sets(EntryKind::Variable) {
            let key = OverlayKey::named(EntryKind::Variable, process_set.as_str(), expression.as_str());
            for (ranks, variable) in store.variables.query(&key, &focus.range_for(&process_set)) {
                out.push(VariableView {
                    name: format!("{expression}{{{ranks}}}"),
                    expression: expression.clone(),
                    process_set: process_set.clone(),
                    value: to_display(&variable.value),
                    type_name: variable.type_name.clone(),
                    children: variable.children,
                    ranks,
                });
            }
        }
    }
    out
}

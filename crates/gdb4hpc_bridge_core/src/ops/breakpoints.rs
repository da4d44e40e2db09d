use std::collections::BTreeSet;

use crate::error::BridgeError;
use crate::mi::{Record, Value};
use crate::ops::scope_of;
use crate::overlay::{EntryKind, OverlayKey};
use crate::session::DebugSession;
use crate::store::DataStore;
use crate::types::{Breakpoint, Ranked};
use crate::Result;

fn record_breakpoint(store: &mut DataStore, file: &str, line: u32, record: &Record) -> Breakpoint {
    let Some(bkpt) = record.get("bkpt").and_then(Value::as_map) else {
        return Breakpoint {
            number: None,
            file: file.to_string(),
            line,
            verified: false,
            message: Some("backend returned no breakpoint".to_string()),
        };
    };

    let number = bkpt.get_str("number").and_then(|n| n.parse().ok());
    let breakpoint = Breakpoint {
        number,
        file: file.to_string(),
        line: bkpt
            .get_str("line")
            .and_then(|l| l.parse().ok())
            .unwrap_or(line),
        verified: bkpt.get("pending").is_none(),
        message: None,
    };

    if let (Some(number), Some(scope)) = (number, scope_of(bkpt)) {
        store.breakpoints.update(
            OverlayKey::named(EntryKind::Breakpoint, scope.process_set, number.to_string()),
            scope.group,
            breakpoint.clone(),
        );
    }
    breakpoint
}

/// Deletes the backend breakpoints of `file`. A store entry goes away only
/// once the backend has answered for its number.
async fn delete_file_breakpoints(session: &DebugSession, file: &str) -> Result<usize> {
    // a split breakpoint shows up once per rank group
    let numbers: BTreeSet<u32> = {
        let store = session.store().lock().await;
        store
            .breakpoints
            .keys()
            .flat_map(|key| store.breakpoints.query_all(key))
            .filter(|entry| entry.value.file == file)
            .filter_map(|entry| entry.value.number)
            .collect()
    };

    for &number in &numbers {
        match session.query(&format!("-break-delete {number}")).await {
            Ok(_) => {}
            Err(BridgeError::CommandFailed { message, .. }) => {
                tracing::warn!(number, error = %message, "backend refused to delete breakpoint");
            }
            Err(e) => return Err(e),
        }
        session
            .store()
            .lock()
            .await
            .breakpoints
            .delete_matching(|_, bp| bp.file == file && bp.number == Some(number));
    }
    Ok(numbers.len())
}

/// Replaces every breakpoint in `file` with one per entry of `lines`.
///
/// Waits for the target to stop first; mutating breakpoints while ranks
/// run is rejected by the backend.
pub async fn set_breakpoints(
    session: &DebugSession,
    file: &str,
    lines: &[u32],
) -> Result<Vec<Breakpoint>> {
    session.wait_until_stopped().await?;
    delete_file_breakpoints(session, file).await?;

    let mut placed = Vec::with_capacity(lines.len());
    for &line in lines {
        let command = format!("-break-insert {file}:{line}");
        match session.query(&command).await {
            Ok(record) => {
                let mut store = session.store().lock().await;
                placed.push(record_breakpoint(&mut store, file, line, &record));
            }
            Err(BridgeError::CommandFailed { message, .. }) => {
                tracing::info!(file, line, error = %message, "breakpoint not placed");
                placed.push(Breakpoint {
                    number: None,
                    file: file.to_string(),
                    line,
                    verified: false,
                    message: Some(message),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(placed)
}

/// Removes every breakpoint in `file`. Returns how many were deleted.
pub async fn clear_breakpoints(session: &DebugSession, file: &str) -> Result<usize> {
    session.wait_until_stopped().await?;
    delete_file_breakpoints(session, file).await
}

/// All known breakpoints with the ranks they apply to.
pub async fn breakpoints(session: &DebugSession) -> Vec<Ranked<Breakpoint>> {
    let store = session.store().lock().await;
    let mut out: Vec<Ranked<Breakpoint>> = store
        .breakpoints
        .keys()
        .flat_map(|key| {
            store.breakpoints.query_all(key).iter().map(|entry| Ranked {
                process_set: key.process_set.clone(),
                ranks: entry.range.clone(),
                value: entry.value.clone(),
            })
        })
        .collect();
    out.sort_by(|a, b| {
        (a.value.number, &a.process_set).cmp(&(b.value.number, &b.process_set))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::parse_record;
    use crate::ranges::RangeSet;

    #[test]
    fn placed_breakpoint_is_stored_for_its_group() {
        let record = parse_record(
            "9^done,bkpt={number=\"2\",type=\"breakpoint\",file=\"jacobi.c\",line=\"40\",proc_set=\"App0\",group=\"0..7\"}",
        )
        .expect("should parse");
        let mut store = DataStore::new();
        let bp = record_breakpoint(&mut store, "/src/jacobi.c", 41, &record);

        assert_eq!(bp.number, Some(2));
        assert_eq!(bp.line, 40);
        assert!(bp.verified);

        let entries = store
            .breakpoints
            .query_all(&OverlayKey::named(EntryKind::Breakpoint, "App0", "2"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].range, RangeSet::span(0, 7));
    }

    #[test]
    fn pending_breakpoint_is_unverified() {
        let record = parse_record("9^done,bkpt={number=\"3\",pending=\"lib.c:5\"}")
            .expect("should parse");
        let mut store = DataStore::new();
        let bp = record_breakpoint(&mut store, "lib.c", 5, &record);
        assert!(!bp.verified);
        assert_eq!(bp.line, 5);
        assert_eq!(store.breakpoints.len(), 1);
    }

    #[test]
    fn missing_bkpt_is_reported_not_stored() {
        let record = parse_record("9^done").expect("should parse");
        let mut store = DataStore::new();
        let bp = record_breakpoint(&mut store, "a.c", 1, &record);
        assert_eq!(bp.number, None);
        assert!(bp.message.is_some());
        assert!(store.breakpoints.is_empty());
    }
}

use crate::mi::{Fields, Record, Value};
use crate::ops::scoped_messages;
use crate::overlay::{EntryKind, OverlayKey};
use crate::session::DebugSession;
use crate::store::DataStore;
use crate::types::{Ranked, Thread};
use crate::Result;

pub const THREAD_INFO: &str = "-thread-info";

/// Stores the thread lists of a `-thread-info` result. Returns how many
/// process-set messages carried threads.
pub(crate) fn apply_thread_info(store: &mut DataStore, record: &Record) -> usize {
    if let Some(message) = record.error_message() {
        tracing::warn!(error = message, "thread info failed");
        return 0;
    }

    let mut applied = 0;
    for msg in scoped_messages(record) {
        let Some(list) = msg.fields.get("threads").and_then(Value::as_list) else {
            continue;
        };
        let threads: Vec<Thread> = list
            .iter()
            .filter_map(Value::as_map)
            .filter_map(parse_thread)
            .collect();
        tracing::debug!(
            process_set = %msg.process_set,
            group = %msg.group,
            count = threads.len(),
            "updated threads"
        );
        store.threads.update(
            OverlayKey::new(EntryKind::Thread, msg.process_set),
            msg.group,
            threads,
        );
        applied += 1;
    }
    applied
}

fn parse_thread(fields: &Fields) -> Option<Thread> {
    let thread_id = fields.get_str("id")?.parse().ok()?;
    let target_id = fields.get_str("target-id").map(str::to_string);
    let name = fields
        .get_str("name")
        .map(str::to_string)
        .or_else(|| target_id.clone())
        .unwrap_or_else(|| format!("thread {thread_id}"));
    Some(Thread {
        thread_id,
        name,
        target_id,
        state: fields.get_str("state").map(str::to_string),
    })
}

/// Refreshes thread lists and returns them for the ranks in focus.
pub async fn threads(session: &DebugSession) -> Result<Vec<Ranked<Vec<Thread>>>> {
    let record = session.query(THREAD_INFO).await?;
    let mut store = session.store().lock().await;
    apply_thread_info(&mut store, &record);
    drop(store);
    cached_threads(session).await
}

/// Thread lists already in the store, restricted to the display filter.
pub async fn cached_threads(session: &DebugSession) -> Result<Vec<Ranked<Vec<Thread>>>> {
    let focus = session.focus().lock().await.clone();
    let store = session.store().lock().await;

    let mut out = Vec::new();
    for process_set in store.process_sets(EntryKind::Thread) {
        let key = OverlayKey::new(EntryKind::Thread, process_set.as_str());
        for (ranks, threads) in store.threads.query(&key, &focus.range_for(&process_set)) {
            out.push(Ranked {
                process_set: process_set.clone(),
                ranks,
                value: threads.clone(),
            });
        }
    }
    Ok(out)
}

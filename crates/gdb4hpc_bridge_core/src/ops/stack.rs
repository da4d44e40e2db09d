use crate::mi::{Fields, Record, Value};
use crate::ops::scoped_messages;
use crate::overlay::{EntryKind, OverlayKey};
use crate::session::DebugSession;
use crate::store::DataStore;
use crate::types::{Ranked, StackFrame};
use crate::Result;

pub const LIST_FRAMES: &str = "-stack-list-frames";

fn apply_frames(store: &mut DataStore, record: &Record) -> usize {
    let mut applied = 0;
    for msg in scoped_messages(record) {
        let Some(list) = msg.fields.get("stack").and_then(Value::as_list) else {
            continue;
        };
        let frames: Vec<StackFrame> = list
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                // `stack=[frame={...},...]` arrives as single-entry maps
                let frame = item
                    .get("frame")
                    .and_then(Value::as_map)
                    .or_else(|| item.as_map())?;
                Some(parse_frame(frame, index))
            })
            .collect();
        store.stacks.update(
            OverlayKey::new(EntryKind::Stack, msg.process_set),
            msg.group,
            frames,
        );
        applied += 1;
    }
    applied
}

fn parse_frame(fields: &Fields, index: usize) -> StackFrame {
    let level = fields
        .get_str("level")
        .and_then(|l| l.parse().ok())
        .unwrap_or(index as u32);
    StackFrame {
        level,
        func: fields.get_str("func").unwrap_or("??").to_string(),
        file: fields.get_str("file").map(str::to_string),
        fullname: fields.get_str("fullname").map(str::to_string),
        line: fields.get_str("line").and_then(|l| l.parse().ok()),
        addr: fields.get_str("addr").map(str::to_string),
    }
}

/// Refreshes call stacks and returns `levels` frames from `start` for every
/// rank group in focus. `None` returns the whole stack.
pub async fn stack_trace(
    session: &DebugSession,
    start: usize,
    levels: Option<usize>,
) -> Result<Vec<Ranked<Vec<StackFrame>>>> {
    let record = session.query(LIST_FRAMES).await?;
    let focus = session.focus().lock().await.clone();
    let mut store = session.store().lock().await;
    apply_frames(&mut store, &record);

    let mut out = Vec::new();
    for process_set in store.process_sets(EntryKind::Stack) {
        let key = OverlayKey::new(EntryKind::Stack, process_set.as_str());
        for (ranks, frames) in store.stacks.query(&key, &focus.range_for(&process_set)) {
            let end = levels
                .map(|n| start.saturating_add(n))
                .unwrap_or(frames.len())
                .min(frames.len());
            let value = frames.get(start.min(end)..end).unwrap_or_default().to_vec();
            out.push(Ranked {
                process_set: process_set.clone(),
                ranks,
                value,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::parse_record;
    use crate::ranges::RangeSet;

    #[test]
    fn frames_are_stored_per_group() {
        let record = parse_record(
            "5^done,proc_set=\"App0\",group=\"0..1\",stack=[frame={level=\"0\",func=\"jacobi\",file=\"jacobi.c\",fullname=\"/src/jacobi.c\",line=\"42\",addr=\"0x4005d0\"},frame={level=\"1\",func=\"main\"}]",
        )
        .expect("should parse");
        let mut store = DataStore::new();
        assert_eq!(apply_frames(&mut store, &record), 1);

        let entries = store
            .stacks
            .query_all(&OverlayKey::new(EntryKind::Stack, "App0"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].range, RangeSet::span(0, 1));

        let frames = &entries[0].value;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].func, "jacobi");
        assert_eq!(frames[0].line, Some(42));
        assert_eq!(frames[0].fullname.as_deref(), Some("/src/jacobi.c"));
        assert_eq!(frames[1].func, "main");
        assert_eq!(frames[1].file, None);
    }

    #[test]
    fn missing_level_falls_back_to_position() {
        let record = parse_record("5^done,stack=[frame={func=\"a\"},frame={func=\"b\"}]")
            .expect("should parse");
        let mut store = DataStore::new();
        apply_frames(&mut store, &record);
        let entries = store
            .stacks
            .query_all(&OverlayKey::new(EntryKind::Stack, "all"));
        let levels: Vec<u32> = entries[0].value.iter().map(|f| f.level).collect();
        assert_eq!(levels, vec![0, 1]);
    }
}

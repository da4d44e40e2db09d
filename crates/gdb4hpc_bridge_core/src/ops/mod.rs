//! High-level debugger operations, one module per backend feature.

pub mod breakpoints;
pub mod procsets;
pub mod scripts;
pub mod stack;
pub mod threads;
pub mod variables;

use crate::focus::ALL_PROCESS_SETS;
use crate::mi::{Fields, Record, Value};
use crate::ranges::RangeSet;

/// The part of a response that belongs to one process set and rank group.
#[derive(Debug)]
pub(crate) struct ScopedMessage<'a> {
    pub process_set: String,
    pub group: RangeSet,
    pub fields: &'a Fields,
}

/// Splits a response into per-process-set messages.
///
/// Multi-set answers arrive as `msgs=[{proc_set=..,group=..,...}]`; single-set
/// answers carry the same fields at top level. A missing `proc_set` means
/// every set and a missing `group` means every rank. Messages with a
/// malformed group are dropped.
pub(crate) fn scoped_messages(record: &Record) -> Vec<ScopedMessage<'_>> {
    match record.get("msgs").and_then(Value::as_list) {
        Some(msgs) => msgs
            .iter()
            .filter_map(Value::as_map)
            .filter_map(scope_of)
            .collect(),
        None => scope_of(&record.fields).into_iter().collect(),
    }
}

/// Reads `proc_set` and `group` from one message.
pub(crate) fn scope_of(fields: &Fields) -> Option<ScopedMessage<'_>> {
    let process_set = fields
        .get_str("proc_set")
        .unwrap_or(ALL_PROCESS_SETS)
        .trim_start_matches('$')
        .to_string();
    let group = match fields.get_str("group") {
        Some(text) => match RangeSet::parse(text) {
            Ok(group) => group,
            Err(e) => {
                tracing::warn!(process_set, group = text, error = %e, "dropping message with malformed group");
                return None;
            }
        },
        None => RangeSet::all(),
    };
    Some(ScopedMessage {
        process_set,
        group,
        fields,
    })
}

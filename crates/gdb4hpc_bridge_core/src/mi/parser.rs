//! Recursive-descent parser for single MI lines.
//!
//! Every function takes the input and a byte position and returns the parsed
//! item together with the position just past it, so nested tuples and lists
//! resume exactly where their children stopped.

use thiserror::Error;

use super::escape::unescape;
use super::record::{Fields, Record, RecordKind, Value};

/// Prefix gdb4hpc puts on raw diagnostic lines.
pub const LOG_MARKER: &str = "mi: ";

const RESULT_REASONS: [&str; 5] = ["done", "running", "connected", "error", "exit"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of line at {0}")]
    UnexpectedEnd(usize),

    #[error("expected '{expected}' at {pos}, found '{found}'")]
    Expected { expected: char, found: char, pos: usize },

    #[error("unexpected '{found}' at {pos}")]
    Unexpected { found: char, pos: usize },

    #[error("missing record sigil at {0}")]
    MissingSigil(usize),

    #[error("missing reason at {0}")]
    MissingReason(usize),

    #[error("unknown result class '{0}'")]
    UnknownResultClass(String),
}

type Parsed<T> = Result<(T, usize), ParseError>;

/// Parses one trimmed line. Lines that are not MI records yield `None`.
pub fn parse_record(line: &str) -> Option<Record> {
    match parse_line(line) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::trace!(error = %e, line, "line is not an MI record");
            None
        }
    }
}

/// Like [`parse_record`] but keeps the reason a line was rejected.
pub fn parse_line(line: &str) -> Result<Record, ParseError> {
    if let Some(rest) = line.strip_prefix(LOG_MARKER) {
        return Ok(Record {
            token: None,
            kind: RecordKind::Log,
            reason: None,
            payload: Some(rest.to_string()),
            fields: Fields::new(),
        });
    }

    let bytes = line.as_bytes();
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    let token = if digits > 0 {
        line[..digits].parse::<u64>().ok()
    } else {
        None
    };

    let mut pos = digits;
    let sigil = peek(line, pos).ok_or(ParseError::MissingSigil(pos))?;
    let kind = RecordKind::from_sigil(sigil).ok_or(ParseError::MissingSigil(pos))?;
    pos += 1;

    match kind {
        RecordKind::ConsoleStream | RecordKind::TargetStream => {
            let (text, end) = parse_string(line, pos)?;
            ensure_end(line, end)?;
            Ok(Record {
                token,
                kind,
                reason: None,
                payload: Some(trim_newline_marker(text)),
                fields: Fields::new(),
            })
        }
        _ => {
            let start = pos;
            while let Some(ch) = peek(line, pos) {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    pos += 1;
                } else {
                    break;
                }
            }
            if pos == start {
                return Err(ParseError::MissingReason(start));
            }
            let reason = &line[start..pos];
            if kind == RecordKind::Result && !RESULT_REASONS.contains(&reason) {
                return Err(ParseError::UnknownResultClass(reason.to_string()));
            }

            let fields = match peek(line, pos) {
                None => Fields::new(),
                Some(',') => {
                    let (fields, end) = parse_results(line, pos + 1)?;
                    ensure_end(line, end)?;
                    fields
                }
                Some(found) => return Err(ParseError::Expected { expected: ',', found, pos }),
            };

            Ok(Record {
                token,
                kind,
                reason: Some(reason.to_string()),
                payload: None,
                fields,
            })
        }
    }
}

/// Top-level `name=value,name=value...` running to the end of the line.
pub fn parse_results(input: &str, pos: usize) -> Parsed<Fields> {
    let mut fields = Fields::new();
    let mut pos = skip_ws(input, pos);
    if pos >= input.len() {
        return Ok((fields, pos));
    }

    loop {
        let ((name, value), next) = parse_pair(input, pos)?;
        fields.insert(name, value);
        pos = skip_ws(input, next);
        match peek(input, pos) {
            None => return Ok((fields, pos)),
            Some(',') => pos += 1,
            Some(found) => return Err(ParseError::Expected { expected: ',', found, pos }),
        }
    }
}

pub fn parse_pair(input: &str, pos: usize) -> Parsed<(String, Value)> {
    let (name, pos) = parse_name(input, pos)?;
    let pos = skip_ws(input, pos);
    let pos = expect(input, pos, '=')?;
    let (value, pos) = parse_value(input, pos)?;
    Ok(((name, value), pos))
}

pub fn parse_value(input: &str, pos: usize) -> Parsed<Value> {
    let pos = skip_ws(input, pos);
    match peek(input, pos) {
        Some('"') => {
            let (text, end) = parse_string(input, pos)?;
            Ok((Value::String(text), end))
        }
        Some('{') => {
            let (fields, end) = parse_tuple(input, pos)?;
            Ok((Value::Map(fields), end))
        }
        Some('[') => parse_list(input, pos),
        Some(found) => Err(ParseError::Unexpected { found, pos }),
        None => Err(ParseError::UnexpectedEnd(pos)),
    }
}

/// A quoted C string starting at `pos`; returns the decoded text.
pub fn parse_string(input: &str, pos: usize) -> Parsed<String> {
    let start = expect(input, pos, '"')?;
    let bytes = input.as_bytes();
    let mut idx = start;

    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'"' => return Ok((unescape(&input[start..idx]), idx + 1)),
            _ => idx += 1,
        }
    }

    Err(ParseError::UnexpectedEnd(input.len()))
}

/// `{name=value,...}`
pub fn parse_tuple(input: &str, pos: usize) -> Parsed<Fields> {
    let mut pos = skip_ws(input, expect(input, pos, '{')?);
    let mut fields = Fields::new();

    if peek(input, pos) == Some('}') {
        return Ok((fields, pos + 1));
    }

    loop {
        let ((name, value), next) = parse_pair(input, pos)?;
        fields.insert(name, value);
        pos = skip_ws(input, next);
        match peek(input, pos) {
            Some(',') => pos += 1,
            Some('}') => return Ok((fields, pos + 1)),
            Some(found) => return Err(ParseError::Expected { expected: '}', found, pos }),
            None => return Err(ParseError::UnexpectedEnd(pos)),
        }
    }
}

/// `[value,...]` or `[name=value,...]`.
///
/// The backend uses both shapes; a pair list keeps each pair as a
/// single-entry map so repeated names such as `frame=` all survive.
pub fn parse_list(input: &str, pos: usize) -> Parsed<Value> {
    let mut pos = skip_ws(input, expect(input, pos, '[')?);
    let mut items = Vec::new();

    if peek(input, pos) == Some(']') {
        return Ok((Value::List(items), pos + 1));
    }

    let values = matches!(peek(input, pos), Some('"' | '{' | '['));

    loop {
        if values {
            let (value, next) = parse_value(input, pos)?;
            items.push(value);
            pos = next;
        } else {
            let ((name, value), next) = parse_pair(input, pos)?;
            items.push(Value::Map(Fields::from_iter([(name, value)])));
            pos = next;
        }

        pos = skip_ws(input, pos);
        match peek(input, pos) {
            Some(',') => pos += 1,
            Some(']') => return Ok((Value::List(items), pos + 1)),
            Some(found) => return Err(ParseError::Expected { expected: ']', found, pos }),
            None => return Err(ParseError::UnexpectedEnd(pos)),
        }
    }
}

fn parse_name(input: &str, pos: usize) -> Parsed<String> {
    let pos = skip_ws(input, pos);
    match peek(input, pos) {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
        Some(found) => return Err(ParseError::Unexpected { found, pos }),
        None => return Err(ParseError::UnexpectedEnd(pos)),
    }

    let len = input[pos..]
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
        .count();
    Ok((input[pos..pos + len].to_string(), pos + len))
}

fn peek(input: &str, pos: usize) -> Option<char> {
    input.get(pos..).and_then(|rest| rest.chars().next())
}

fn skip_ws(input: &str, pos: usize) -> usize {
    pos + input
        .get(pos..)
        .map(|rest| rest.bytes().take_while(u8::is_ascii_whitespace).count())
        .unwrap_or(0)
}

fn expect(input: &str, pos: usize, expected: char) -> Result<usize, ParseError> {
    match peek(input, pos) {
        Some(found) if found == expected => Ok(pos + expected.len_utf8()),
        Some(found) => Err(ParseError::Expected { expected, found, pos }),
        None => Err(ParseError::UnexpectedEnd(pos)),
    }
}

fn ensure_end(input: &str, pos: usize) -> Result<(), ParseError> {
    let pos = skip_ws(input, pos);
    match peek(input, pos) {
        None => Ok(()),
        Some(found) => Err(ParseError::Unexpected { found, pos }),
    }
}

fn trim_newline_marker(text: String) -> String {
    let text = text.strip_prefix('\n').unwrap_or(&text);
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(line: &str) -> Record {
        parse_line(line).unwrap_or_else(|e| panic!("{line:?} should parse: {e}"))
    }

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    #[test]
    fn result_with_nested_tuple() {
        let rec = record(r#"1^done,bkpt={number="3",line="42"}"#);

        assert_eq!(rec.kind, RecordKind::Result);
        assert_eq!(rec.token, Some(1));
        assert_eq!(rec.reason(), "done");
        assert_eq!(
            rec.get("bkpt"),
            Some(&Value::Map(Fields::from_iter([
                ("number", s("3")),
                ("line", s("42")),
            ])))
        );
    }

    #[test]
    fn console_stream_decodes_and_trims_newline_marker() {
        let rec = record(r#"~"hello\n""#);
        assert_eq!(rec.kind, RecordKind::ConsoleStream);
        assert_eq!(rec.payload.as_deref(), Some("hello"));

        let rec = record(r#"@"\nsaid \"hi\"\n""#);
        assert_eq!(rec.kind, RecordKind::TargetStream);
        assert_eq!(rec.payload.as_deref(), Some("said \"hi\""));
    }

    #[test]
    fn log_lines_pass_through() {
        let rec = record("mi: launching App0 on 4 ranks");
        assert_eq!(rec.kind, RecordKind::Log);
        assert_eq!(rec.payload.as_deref(), Some("launching App0 on 4 ranks"));
    }

    #[test]
    fn async_stop_with_process_set_fields() {
        let rec = record(
            r#"*stopped,reason="breakpoint-hit",proc_set="App0",group="0..3",frame={fullname="/src/main.c",line="12"}"#,
        );
        assert_eq!(rec.kind, RecordKind::Async);
        assert_eq!(rec.token, None);
        assert_eq!(rec.reason(), "stopped");
        assert_eq!(rec.get_str("reason"), Some("breakpoint-hit"));
        assert_eq!(rec.get_str("group"), Some("0..3"));
        assert_eq!(
            rec.get("frame").and_then(|f| f.get_str("fullname")),
            Some("/src/main.c")
        );
    }

    #[test]
    fn bare_reason_without_fields() {
        let rec = record("7^running");
        assert_eq!(rec.token, Some(7));
        assert!(rec.fields.is_empty());

        let rec = record("*running,thread-id=\"all\"");
        assert_eq!(rec.get_str("thread-id"), Some("all"));
    }

    #[test]
    fn list_of_values_and_list_of_pairs() {
        let rec = record(r#"^done,threads=[{id="1",name="a"},{id="2",name="b"}],ids=["4","5"]"#);
        let threads = rec.get("threads").and_then(Value::as_list).expect("threads list");
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[1].get_str("name"), Some("b"));
        assert_eq!(rec.get("ids"), Some(&Value::List(vec![s("4"), s("5")])));

        let rec = record(r#"^done,stack=[frame={level="0",func="main"},frame={level="1",func="start"}]"#);
        let stack = rec.get("stack").and_then(Value::as_list).expect("stack list");
        assert_eq!(stack.len(), 2);
        assert_eq!(
            stack[1].get("frame").and_then(|f| f.get_str("func")),
            Some("start")
        );
    }

    #[test]
    fn empty_containers() {
        let rec = record("^done,threads=[],bkpt={}");
        assert_eq!(rec.get("threads"), Some(&Value::List(vec![])));
        assert_eq!(rec.get("bkpt"), Some(&Value::Map(Fields::new())));
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let rec = record(r#"^error,msg="no symbol \"x\" in scope, sorry""#);
        assert!(rec.is_error());
        assert_eq!(rec.error_message(), Some("no symbol \"x\" in scope, sorry"));
    }

    #[test]
    fn parse_value_returns_the_resume_position() {
        let input = r#"{a="1",b=["x"]},rest"#;
        let (value, pos) = parse_value(input, 0).expect("tuple should parse");
        assert_eq!(&input[pos..], ",rest");
        assert_eq!(value.get("b"), Some(&Value::List(vec![s("x")])));

        let (value, pos) = parse_value(input, 9).expect("inner list should parse");
        assert_eq!(value, Value::List(vec![s("x")]));
        assert_eq!(&input[pos..], "},rest");
    }

    #[test]
    fn rejects_lines_that_are_not_records() {
        assert!(parse_record("").is_none());
        assert!(parse_record("dbg all> ").is_none());
        assert!(parse_record("Error: something broke").is_none());
        assert!(parse_record("^bogus,msg=\"x\"").is_none());
        assert!(parse_record(r#"^done,bkpt={number="3""#).is_none());
        assert!(parse_record(r#"~"unterminated"#).is_none());
        assert_eq!(
            parse_line("^done junk"),
            Err(ParseError::Expected { expected: ',', found: ' ', pos: 5 })
        );
    }
}

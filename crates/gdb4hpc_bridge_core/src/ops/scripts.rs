//! Comparisons, decompositions and assertion scripts.

use crate::error::BridgeError;
use crate::mi::{Record, Value};
use crate::session::DebugSession;
use crate::types::{Assertion, AssertionScript, Comparison};
use crate::Result;

pub const DECOMPOSITION_LIST: &str = "-decomposition-list";

pub async fn add_comparison(session: &DebugSession, text: &str) -> Vec<Comparison> {
    let mut comparisons = session.comparisons.lock().await;
    comparisons.push(Comparison {
        text: text.trim().to_string(),
        checked: true,
        result: String::new(),
        error: None,
    });
    comparisons.clone()
}

pub async fn remove_comparison(session: &DebugSession, index: usize) -> Result<Vec<Comparison>> {
    let mut comparisons = session.comparisons.lock().await;
    if index >= comparisons.len() {
        return Err(BridgeError::NotFound(format!("comparison {index}")));
    }
    comparisons.remove(index);
    Ok(comparisons.clone())
}

pub async fn set_comparison_checked(
    session: &DebugSession,
    index: usize,
    checked: bool,
) -> Result<Vec<Comparison>> {
    let mut comparisons = session.comparisons.lock().await;
    let comparison = comparisons
        .get_mut(index)
        .ok_or_else(|| BridgeError::NotFound(format!("comparison {index}")))?;
    comparison.checked = checked;
    Ok(comparisons.clone())
}

pub async fn comparisons(session: &DebugSession) -> Vec<Comparison> {
    session.comparisons.lock().await.clone()
}

/// Runs every checked comparison. Unchecked ones are reset. A failing
/// comparison keeps its error and does not stop the others.
pub async fn run_comparisons(session: &DebugSession) -> Result<Vec<Comparison>> {
    let pending = session.comparisons.lock().await.clone();

    let mut finished = Vec::with_capacity(pending.len());
    for mut comparison in pending {
        comparison.result.clear();
        comparison.error = None;
        if comparison.checked {
            match session.query(&format!("-compare {}", comparison.text)).await {
                Ok(record) => comparison.result = compare_result(&record),
                Err(BridgeError::CommandFailed { message, .. }) => comparison.error = Some(message),
                Err(e) => return Err(e),
            }
        }
        finished.push(comparison);
    }

    *session.comparisons.lock().await = finished.clone();
    Ok(finished)
}

fn compare_result(record: &Record) -> String {
    record
        .get("compare")
        .and_then(|c| c.get_str("result"))
        .unwrap_or_default()
        .to_string()
}

/// Defines decompositions from console commands and lists the result.
/// Does nothing when `commands` is empty.
pub async fn build_decomposition(session: &DebugSession, commands: &[String]) -> Result<Option<Value>> {
    if commands.is_empty() {
        return Ok(None);
    }
    for command in commands {
        session.send_command(command).await?;
    }
    let record = session.query(DECOMPOSITION_LIST).await?;
    Ok(record.get("decompositions").cloned())
}

/// Defines `script` on the backend, replacing a local script of the same name.
pub async fn define_assertion_script(session: &DebugSession, script: AssertionScript) -> Result<()> {
    for command in script.build_commands() {
        session.send_command(&command).await?;
    }
    let mut scripts = session.scripts.lock().await;
    match scripts.iter_mut().find(|s| s.name == script.name) {
        Some(existing) => *existing = script,
        None => scripts.push(script),
    }
    Ok(())
}

pub async fn assertion_scripts(session: &DebugSession) -> Vec<AssertionScript> {
    session.scripts.lock().await.clone()
}

pub async fn run_assertion_script(session: &DebugSession, name: &str) -> Result<()> {
    session.send_command(&format!("start ${name}")).await?;
    Ok(())
}

/// Fetches pass/warn/fail counts for a script and stores them.
pub async fn assertion_results(session: &DebugSession, name: &str) -> Result<AssertionScript> {
    let command = format!("-script-list ${name} results");
    let record = session.query(&command).await?;
    let results = record
        .get("script_result")
        .and_then(|r| r.get("assertions"))
        .and_then(Value::as_list)
        .ok_or_else(|| BridgeError::missing_field(command.as_str(), "script_result.assertions"))?;

    let mut scripts = session.scripts.lock().await;
    let script = scripts
        .iter_mut()
        .find(|s| s.name == name)
        .ok_or_else(|| BridgeError::NotFound(format!("assertion script {name}")))?;
    apply_results(&mut script.asserts, results);
    Ok(script.clone())
}

fn apply_results(asserts: &mut [Assertion], results: &[Value]) {
    for (assertion, result) in asserts.iter_mut().zip(results) {
        let count = |field: &str| result.get_str(field).unwrap_or("0").to_string();
        assertion.pass = count("pass");
        assertion.warn = count("warn");
        assertion.fail = count("fail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::parse_record;

    #[test]
    fn compare_result_reads_nested_field() {
        let record = parse_record("6^done,compare={result=\"App0{0..3}: true\"}")
            .expect("should parse");
        assert_eq!(compare_result(&record), "App0{0..3}: true");
        assert_eq!(compare_result(&parse_record("6^done").expect("parse")), "");
    }

    #[test]
    fn results_are_matched_by_position() {
        let record = parse_record(
            "7^done,script_result={assertions=[{pass=\"4\",warn=\"0\",fail=\"0\"},{pass=\"3\",fail=\"1\"}]}",
        )
        .expect("should parse");
        let results = record
            .get("script_result")
            .and_then(|r| r.get("assertions"))
            .and_then(Value::as_list)
            .expect("assertions");

        let mut asserts = vec![
            Assertion::new("$App0::n > 0"),
            Assertion::new("$App0::u == 1"),
            Assertion::new("$App0::v == 2"),
        ];
        apply_results(&mut asserts, results);

        assert_eq!(asserts[0].pass, "4");
        assert_eq!(asserts[1].fail, "1");
        assert_eq!(asserts[1].warn, "0");
        // no result for the third one
        assert_eq!(asserts[2].pass, "0");
    }
}

use serde::{Deserialize, Serialize};

use crate::ranges::RangeSet;

/// One application gdb4hpc should launch into its own process set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchApp {
    pub procset: String,
    pub program: String,
    #[serde(default)]
    pub args: String,
}

impl LaunchApp {
    pub fn command(&self) -> String {
        let launch = format!("launch ${} {}", self.procset, self.program);
        if self.args.trim().is_empty() {
            launch
        } else {
            format!("{launch} {}", self.args.trim())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

/// A value together with the ranks that currently show it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked<T> {
    pub process_set: String,
    pub ranks: RangeSet,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thread {
    pub thread_id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackFrame {
    pub level: u32,
    pub func: String,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
    pub addr: Option<String>,
}

/// A backend variable object and the value it held on some ranks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    /// Variable-object name assigned by the backend (`var1`, ...).
    pub reference: String,
    pub type_name: Option<String>,
    pub value: String,
    pub children: u32,
}

/// Display row for a variable: `name{ranks}` plus its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableView {
    pub name: String,
    pub expression: String,
    pub process_set: String,
    pub ranks: RangeSet,
    pub value: String,
    pub type_name: Option<String>,
    pub children: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakpoint {
    pub number: Option<u32>,
    pub file: String,
    pub line: u32,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A named process set known to the backend, e.g. `App0` → `$App0{0..3}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Procset {
    pub name: String,
    pub spec: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub text: String,
    pub checked: bool,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub text: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub warn: String,
    #[serde(default)]
    pub fail: String,
}

impl Assertion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pass: "0".to_string(),
            warn: "0".to_string(),
            fail: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionScript {
    pub name: String,
    pub stop_on_error: bool,
    pub asserts: Vec<Assertion>,
}

impl AssertionScript {
    /// Console lines that define the script on the backend.
    pub fn build_commands(&self) -> Vec<String> {
        let mut cmds = vec![
            format!("build ${}", self.name),
            format!("set stop {}", if self.stop_on_error { "on" } else { "off" }),
            // makes the backend report breakpoint events while the script runs
            "set verbose-breakpoints on".to_string(),
        ];
        cmds.extend(self.asserts.iter().map(|a| format!("assert {}", a.text)));
        cmds.push("end".to_string());
        cmds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_command_includes_args_only_when_present() {
        let app = LaunchApp {
            procset: "App0".into(),
            program: "./jacobi".into(),
            args: String::new(),
        };
        assert_eq!(app.command(), "launch $App0 ./jacobi");

        let app = LaunchApp {
            args: " -n 4 ".into(),
            ..app
        };
        assert_eq!(app.command(), "launch $App0 ./jacobi -n 4");
    }

    #[test]
    fn assertion_script_builds_backend_commands() {
        let script = AssertionScript {
            name: "check".into(),
            stop_on_error: true,
            asserts: vec![Assertion::new("$App0::u > 0")],
        };
        assert_eq!(
            script.build_commands(),
            vec![
                "build $check",
                "set stop on",
                "set verbose-breakpoints on",
                "assert $App0::u > 0",
                "end",
            ]
        );
    }
}

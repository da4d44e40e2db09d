use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PROGRAM: &str = "gdb4hpc";
const DEFAULT_ARGS: &str = "--interpreter=mi";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Debugger executable.
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// How often a breakpoint mutation re-checks whether the target stopped.
    pub poll_interval: Duration,
    /// Upper bound callers apply to a single command round trip.
    pub command_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: vec![DEFAULT_ARGS.to_string()],
            cwd: None,
            env: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let program =
            std::env::var("GDB4HPC_PATH").unwrap_or_else(|_| DEFAULT_PROGRAM.to_string());

        let args = std::env::var("GDB4HPC_ARGS")
            .ok()
            .map(|v| v.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|args| !args.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_ARGS.to_string()]);

        let cwd = std::env::var("GDB4HPC_CWD")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let poll_interval = std::env::var("GDB4HPC_POLL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let command_timeout = std::env::var("GDB4HPC_COMMAND_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT);

        Self {
            program,
            args,
            cwd,
            env: Vec::new(),
            poll_interval,
            command_timeout,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.program, "gdb4hpc");
        assert_eq!(config.args, vec!["--interpreter=mi".to_string()]);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.command_timeout, Duration::from_secs(120));
        assert!(config.cwd.is_none());
    }

    #[test]
    fn test_new_config() {
        let config = BridgeConfig::new("/opt/cray/bin/gdb4hpc", vec!["--interpreter=mi".into()])
            .with_env("CTI_WLM_IMPL", "slurm");
        assert_eq!(config.program, "/opt/cray/bin/gdb4hpc");
        assert_eq!(config.env, vec![("CTI_WLM_IMPL".to_string(), "slurm".to_string())]);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    // env vars are process-global; every case stays in this one test
    #[test]
    fn test_from_env_defaults_and_custom() {
        for key in [
            "GDB4HPC_PATH",
            "GDB4HPC_ARGS",
            "GDB4HPC_CWD",
            "GDB4HPC_POLL_MS",
            "GDB4HPC_COMMAND_TIMEOUT_MS",
        ] {
            std::env::remove_var(key);
        }

        let config = BridgeConfig::from_env();
        assert_eq!(config.program, "gdb4hpc");
        assert_eq!(config.args, vec!["--interpreter=mi".to_string()]);
        assert_eq!(config.poll_interval, Duration::from_millis(100));

        std::env::set_var("GDB4HPC_PATH", "/usr/local/bin/gdb4hpc");
        std::env::set_var("GDB4HPC_ARGS", "--interpreter=mi --quiet");
        std::env::set_var("GDB4HPC_CWD", "/scratch/run");
        std::env::set_var("GDB4HPC_POLL_MS", "250");
        std::env::set_var("GDB4HPC_COMMAND_TIMEOUT_MS", "5000");

        let config = BridgeConfig::from_env();
        assert_eq!(config.program, "/usr/local/bin/gdb4hpc");
        assert_eq!(config.args, vec!["--interpreter=mi".to_string(), "--quiet".to_string()]);
        assert_eq!(config.cwd, Some(PathBuf::from("/scratch/run")));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.command_timeout, Duration::from_millis(5000));

        for key in [
            "GDB4HPC_PATH",
            "GDB4HPC_ARGS",
            "GDB4HPC_CWD",
            "GDB4HPC_POLL_MS",
            "GDB4HPC_COMMAND_TIMEOUT_MS",
        ] {
            std::env::remove_var(key);
        }
    }
}

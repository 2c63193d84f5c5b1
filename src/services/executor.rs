use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::sink::LogSink;

pub const THROTTLED_MESSAGE: &str = "Throttle time not reached. Script not executed.";

/// Outcome of a successful `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The script ran and exited with status 0.
    Ran { output: String },
    /// Inside the throttle window; nothing was spawned.
    Throttled,
}

impl Execution {
    /// Text that goes to the audit log.
    pub fn output(&self) -> &str {
        match self {
            Execution::Ran { output } => output,
            Execution::Throttled => THROTTLED_MESSAGE,
        }
    }
}

#[derive(Debug)]
pub enum ExecutionError {
    /// The script path failed validation at construction.
    Invalid { path: PathBuf },
    /// Spawning the child or reading its pipe failed.
    Spawn { path: PathBuf, source: std::io::Error },
    /// The child exited non-zero or was killed by a signal.
    Failed { code: Option<i32>, output: String },
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::Invalid { path } => {
                write!(f, "script {} is not usable", path.display())
            }
            ExecutionError::Spawn { path, source } => {
                write!(f, "failed to run script {}: {}", path.display(), source)
            }
            ExecutionError::Failed { code: Some(code), .. } => {
                write!(f, "script execution failed with status {}", code)
            }
            ExecutionError::Failed { code: None, .. } => {
                write!(f, "script was terminated by a signal")
            }
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Runs the corrective script, at most once per throttle window.
///
/// Throttle state changes through `&mut self` only. Sharing one executor
/// across threads requires an outer `Mutex` so the read-compare-update of
/// the last-fired instant stays atomic.
pub struct ThrottledExecutor {
    program: PathBuf,
    args: Vec<String>,
    throttle: Duration,
    last_fired: Option<Instant>,
    valid: bool,
    sink: Arc<dyn LogSink>,
}

impl ThrottledExecutor {
    /// The path is checked here; callers should test [`is_valid`](Self::is_valid)
    /// before arming anything that depends on it.
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        throttle: Duration,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let program = program.into();
        let valid = validate(&program);
        if !valid {
            log::warn!("Script {} does not exist or cannot be inspected", program.display());
        }
        Self {
            program,
            args,
            throttle,
            last_fired: None,
            valid,
            sink,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    #[cfg(test)]
    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    /// Run the script unless the throttle window is still open.
    pub fn execute(&mut self) -> Result<Execution, ExecutionError> {
        if !self.valid {
            return Err(ExecutionError::Invalid {
                path: self.program.clone(),
            });
        }

        let now = Instant::now();
        if let Some(last) = self.last_fired {
            if now.saturating_duration_since(last) < self.throttle {
                log::debug!(
                    "Throttled: {:?} left before {} may run again",
                    self.throttle - now.saturating_duration_since(last),
                    self.program.display()
                );
                return Ok(Execution::Throttled);
            }
        }

        // the attempt counts against the window whatever the exit status
        self.last_fired = Some(now);
        self.run()
    }

    fn run(&self) -> Result<Execution, ExecutionError> {
        log::info!("Running script {} {:?}", self.program.display(), self.args);
        self.sink.log(&format!("running script: {}", self.program.display()));

        let result = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| ExecutionError::Spawn {
                path: self.program.clone(),
                source: e,
            })?;

        let output = String::from_utf8_lossy(&result.stdout).into_owned();
        if result.status.success() {
            log::info!("✓ Script exited cleanly ({} bytes of output)", output.len());
            Ok(Execution::Ran { output })
        } else {
            Err(ExecutionError::Failed {
                code: result.status.code(),
                output,
            })
        }
    }
}

fn validate(program: &Path) -> bool {
    !program.as_os_str().is_empty() && std::fs::metadata(program).is_ok()
}

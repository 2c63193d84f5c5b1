use clap::Parser;
use std::path::PathBuf;

/// tinypsmon - process liveness watchdog
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// `-pslist` / `--ps` prints the process table and exits; omit to run the watchdog
    #[arg(value_name = "COMMAND", allow_hyphen_values = true)]
    pub command: Option<String>,

    /// Config file
    #[arg(long, env = "TINYPSMON_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Audit log file (overrides [log] file)
    #[arg(long, env = "TINYPSMON_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// What the positional argument asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Watch,
    PrintProcesses,
    Invalid(String),
}

impl CommandArgs {
    pub fn mode(&self) -> Mode {
        match self.command.as_deref() {
            None => Mode::Watch,
            Some("-pslist") | Some("--ps") => Mode::PrintProcesses,
            Some(other) => Mode::Invalid(other.to_string()),
        }
    }
}

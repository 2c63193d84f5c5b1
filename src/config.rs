use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::MatchCriteria;

/// Top-level configuration loaded from config.toml.
#[derive(Debug, Deserialize)]
pub struct WatchdogConfig {
    pub program: ProgramConfig,
    pub script: ScriptConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// The process being watched.
#[derive(Debug, Deserialize)]
pub struct ProgramConfig {
    #[serde(alias = "pgm")]
    pub name: String,
    #[serde(alias = "parms")]
    pub args_contains: String,
    pub user: String,
    pub interval_seconds: u64,
    /// "up" or "down"
    pub status: String,
    /// Stop after this many checks; unlimited when absent
    #[serde(default)]
    pub max_checks: Option<u64>,
}

/// The corrective script.
#[derive(Debug, Deserialize)]
pub struct ScriptConfig {
    #[serde(alias = "location")]
    pub directory: PathBuf,
    #[serde(alias = "pgm")]
    pub name: String,
    #[serde(default)]
    pub options: String,
    pub throttle_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub file: PathBuf,
    /// 0 disables the periodic process table dump
    pub snapshot_interval_seconds: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("tinypsmon.log"),
            snapshot_interval_seconds: 100,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Read { path: PathBuf, source: std::io::Error },
    /// Syntax error, missing table or missing key.
    Parse { path: PathBuf, source: toml::de::Error },
    /// Parsed, but a value is unusable.
    Invalid { path: PathBuf, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid TOML in {}: {}", path.display(), source)
            }
            ConfigError::Invalid { path, reason } => {
                write!(f, "invalid config {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl WatchdogConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: WatchdogConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        if config.program.interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "program.interval_seconds must be greater than 0".to_string(),
            });
        }
        if config.program.max_checks == Some(0) {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "program.max_checks must be greater than 0".to_string(),
            });
        }
        if config.program.name.is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "program.name must not be empty".to_string(),
            });
        }

        Ok(config)
    }
}

impl ProgramConfig {
    pub fn criteria(&self) -> MatchCriteria {
        MatchCriteria::new(&self.name, &self.user, &self.args_contains)
    }
}

impl ScriptConfig {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    /// `options` split on whitespace into an argument vector.
    pub fn args(&self) -> Vec<String> {
        self.options.split_whitespace().map(str::to_string).collect()
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_secs(self.throttle_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FULL: &str = r#"
[program]
name = "python3"
args_contains = "server.py"
user = "www"
interval_seconds = 30
status = "down"

[script]
directory = "/opt/scripts"
name = "restart.sh"
options = "--force  -v"
throttle_seconds = 300

[log]
file = "/var/log/tinypsmon.log"
snapshot_interval_seconds = 0
"#;

    fn parse(text: &str) -> Result<WatchdogConfig, ConfigError> {
        WatchdogConfig::parse(text, Path::new("config.toml"))
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(FULL).unwrap();
        assert_eq!(config.program.name, "python3");
        assert_eq!(config.program.interval_seconds, 30);
        assert_eq!(config.program.status, "down");
        assert_eq!(config.program.max_checks, None);
        assert_eq!(config.script.path(), PathBuf::from("/opt/scripts/restart.sh"));
        assert_eq!(config.script.args(), vec!["--force", "-v"]);
        assert_eq!(config.script.throttle(), Duration::from_secs(300));
        assert_eq!(config.log.file, PathBuf::from("/var/log/tinypsmon.log"));
        assert_eq!(config.log.snapshot_interval_seconds, 0);
    }

    #[test]
    fn test_legacy_key_names() {
        let text = r#"
[program]
pgm = "sshd"
parms = "-D"
user = "root"
interval_seconds = 5
status = "up"

[script]
location = "/usr/local/bin"
pgm = "alert.sh"
options = ""
throttle_seconds = 60
"#;
        let config = parse(text).unwrap();
        let criteria = config.program.criteria();
        assert_eq!(criteria, MatchCriteria::new("sshd", "root", "-D"));
        assert_eq!(config.script.path(), PathBuf::from("/usr/local/bin/alert.sh"));
        assert!(config.script.args().is_empty());
    }

    #[test]
    fn test_log_section_defaults() {
        let text = FULL.split("[log]").next().unwrap();
        let config = parse(text).unwrap();
        assert_eq!(config.log.file, PathBuf::from("tinypsmon.log"));
        assert_eq!(config.log.snapshot_interval_seconds, 100);
    }

    #[test]
    fn test_missing_required_key_is_error() {
        let text = FULL.replace("user = \"www\"\n", "");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_script_table_is_error() {
        let text = FULL.split("[script]").next().unwrap();
        assert!(matches!(parse(text), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_zero_interval_is_invalid() {
        let text = FULL.replace("interval_seconds = 30", "interval_seconds = 0");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("interval_seconds"));
    }

    #[test]
    fn test_max_checks() {
        let text = FULL.replace("status = \"down\"", "status = \"down\"\nmax_checks = 12");
        assert_eq!(parse(&text).unwrap().program.max_checks, Some(12));

        let text = FULL.replace("status = \"down\"", "status = \"down\"\nmax_checks = 0");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("max_checks"));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(parse("[program\nname ="), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = WatchdogConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, FULL).unwrap();
        let config = WatchdogConfig::load(&path).unwrap();
        assert_eq!(config.program.user, "www");
    }
}

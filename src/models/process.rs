use std::fmt;

/// One entry of a process table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    /// First element of the command line (kernel name when the command line is empty)
    pub name: String,
    pub user: String,
    /// Full command line, `arguments[0]` included
    pub arguments: Vec<String>,
}

impl ProcessRecord {
    pub fn new(pid: u32, name: impl Into<String>, user: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            user: user.into(),
            arguments,
        }
    }
}

impl fmt::Display for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Process ID: {}, Process Name: {}, User: {}", self.pid, self.name, self.user)?;
        if !self.arguments.is_empty() {
            write!(f, ", Arguments: ")?;
            for arg in &self.arguments {
                write!(f, "{} ", arg)?;
            }
        } else {
            write!(f, ", ")?;
        }
        write!(f, "num args: {}", self.arguments.len())
    }
}

/// Which process the watchdog is looking for.
///
/// A record matches when the name and user are equal and at least one
/// argument contains `args_contains`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCriteria {
    pub name: String,
    pub user: String,
    pub args_contains: String,
}

impl MatchCriteria {
    pub fn new(name: impl Into<String>, user: impl Into<String>, args_contains: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user: user.into(),
            args_contains: args_contains.into(),
        }
    }

    pub fn matches(&self, record: &ProcessRecord) -> bool {
        record.name == self.name
            && record.user == self.user
            && record
                .arguments
                .iter()
                .any(|arg| arg.contains(self.args_contains.as_str()))
    }
}

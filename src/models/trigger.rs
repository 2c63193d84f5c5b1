use crate::sink::LogSink;

/// The observation that makes the corrective script fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCondition {
    /// Fire while the process is present ("up").
    WhenFound,
    /// Fire while the process is missing ("down").
    WhenMissing,
}

impl TriggerCondition {
    /// Derive the condition from the configured status string.
    ///
    /// Unknown values fall back to [`TriggerCondition::WhenMissing`] with a warning.
    pub fn from_status(status: &str, sink: &dyn LogSink) -> Self {
        match status {
            "down" => {
                sink.log(" desired ps target is down");
                TriggerCondition::WhenMissing
            }
            "up" => {
                sink.log(" desired ps target is up");
                TriggerCondition::WhenFound
            }
            other => {
                log::warn!("Unknown ps target '{}', defaulting to down", other);
                sink.log(&format!(" Unknown ps target {} setting to default down", other));
                TriggerCondition::WhenMissing
            }
        }
    }

    /// The `found` value this condition fires on.
    pub fn as_found(self) -> bool {
        matches!(self, TriggerCondition::WhenFound)
    }

    pub fn holds(self, observed: bool) -> bool {
        observed == self.as_found()
    }
}

use std::sync::Arc;

use crate::models::{MatchCriteria, ProcessRecord, TriggerCondition};
use crate::services::detector::detect;
use crate::services::executor::{Execution, ExecutionError, ThrottledExecutor};
use crate::services::process_source::ProcessSource;
use crate::sink::LogSink;
use crate::timer::Tick;

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The observation did not match the trigger condition.
    Idle { found: bool },
    /// The condition held and the executor was called.
    Fired {
        found: bool,
        record: Option<ProcessRecord>,
        execution: Execution,
    },
}

/// Observation-and-reaction cycle run on every timer tick.
pub struct Poller<S: ProcessSource> {
    source: S,
    criteria: MatchCriteria,
    trigger: TriggerCondition,
    executor: ThrottledExecutor,
    sink: Arc<dyn LogSink>,
}

impl<S: ProcessSource> Poller<S> {
    pub fn new(
        source: S,
        criteria: MatchCriteria,
        trigger: TriggerCondition,
        executor: ThrottledExecutor,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            source,
            criteria,
            trigger,
            executor,
            sink,
        }
    }

    /// Take a snapshot, look for the target and react.
    ///
    /// Level-triggered: every call on which the condition holds reaches the
    /// executor; only its throttle limits how often the script really runs.
    pub fn poll(&mut self) -> Result<PollOutcome, ExecutionError> {
        self.sink.log("Testing ps... ");
        let records = self.source.snapshot();
        let detection = detect(&records, &self.criteria);

        if detection.found {
            self.sink.log(&format!(" match -> {}", self.criteria.args_contains));
            self.sink.log(&format!(" match - user name: {}", self.criteria.user));
            self.sink.log(&format!(" match - process name: {}", self.criteria.name));
            self.sink.log(&format!("process:  {} found", self.criteria.name));
        } else {
            self.sink.log(&format!(
                " no match found -> process: {} user:  {}",
                self.criteria.name, self.criteria.user
            ));
        }

        if !self.trigger.holds(detection.found) {
            log::debug!(
                "'{}' found={}, trigger not met",
                self.criteria.name,
                detection.found
            );
            return Ok(PollOutcome::Idle {
                found: detection.found,
            });
        }

        let record = detection.record.cloned();
        if let Some(r) = &record {
            self.sink.log(&r.to_string());
        }

        log::info!("Trigger met for '{}' (found={}), running script", self.criteria.name, detection.found);
        self.sink.log("status change.. running script");

        match self.executor.execute() {
            Ok(execution) => {
                self.log_output(execution.output());
                Ok(PollOutcome::Fired {
                    found: detection.found,
                    record,
                    execution,
                })
            }
            Err(e) => {
                if let ExecutionError::Failed { output, .. } = &e {
                    self.log_output(output);
                }
                self.sink.log(&format!("script error: {}", e));
                Err(e)
            }
        }
    }

    fn log_output(&self, output: &str) {
        self.sink.log("Script output start: ");
        self.sink.log_multiline(output);
        self.sink.log("Script output end:");
    }
}

impl<S: ProcessSource + 'static> Tick for Poller<S> {
    fn tick(&mut self) -> anyhow::Result<()> {
        self.poll()?;
        Ok(())
    }
}

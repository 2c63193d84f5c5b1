use sysinfo::{Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};

use crate::models::ProcessRecord;
use crate::sink::LogSink;

/// Produces a snapshot of the running processes.
pub trait ProcessSource: Send {
    /// Ordered snapshot. Failure is reported as an empty list.
    fn snapshot(&mut self) -> Vec<ProcessRecord>;
}

/// Process table read through `sysinfo`.
pub struct SysinfoSource {
    system: System,
    users: Users,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
        }
    }

    fn record(&self, process: &Process) -> ProcessRecord {
        let arguments: Vec<String> = process
            .cmd()
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();

        // kernel threads have no command line
        let name = match arguments.first() {
            Some(first) => first.clone(),
            None => process.name().to_string_lossy().into_owned(),
        };

        let user = process
            .user_id()
            .and_then(|uid| self.users.get_user_by_id(uid))
            .map(|u| u.name().to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        ProcessRecord::new(process.pid().as_u32(), name, user, arguments)
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoSource {
    fn snapshot(&mut self) -> Vec<ProcessRecord> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            log::error!("Process listing is not supported on this platform");
            return Vec::new();
        }

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cmd(UpdateKind::Always)
                .with_user(UpdateKind::Always),
        );
        self.users.refresh();

        let mut records: Vec<ProcessRecord> = self
            .system
            .processes()
            .values()
            .map(|p| self.record(p))
            .collect();
        records.sort_by_key(|r| r.pid);

        log::debug!("Process snapshot: {} entries", records.len());
        records
    }
}

/// Write every record of a snapshot to the sink, one line each.
pub fn log_snapshot(records: &[ProcessRecord], sink: &dyn LogSink) {
    for record in records {
        sink.log(&record.to_string());
    }
}

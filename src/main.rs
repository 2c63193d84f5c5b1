use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

mod cli;
mod config;
mod models;
mod services;
mod sink;
mod timer;

use cli::{CommandArgs, Mode};
use config::WatchdogConfig;
use models::TriggerCondition;
use services::{log_snapshot, Poller, ProcessSource, SysinfoSource, ThrottledExecutor};
use sink::{FileSink, LogSink};
use timer::{PeriodicTimer, Tick, TimerConfig};

const EXIT_CONFIG: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_BAD_SCRIPT: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();

    match args.mode() {
        Mode::PrintProcesses => {
            let mut source = SysinfoSource::new();
            for record in source.snapshot() {
                println!("{}", record);
            }
            ExitCode::SUCCESS
        }
        Mode::Invalid(arg) => {
            eprintln!("Cmdline invalid:  {}", arg);
            ExitCode::from(EXIT_USAGE)
        }
        Mode::Watch => watch(&args).await,
    }
}

async fn watch(args: &CommandArgs) -> ExitCode {
    let config = match WatchdogConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("❌ Failed to load configuration: {}", e);
            eprintln!("Invalid TOML file: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let log_path = args.log_file.clone().unwrap_or_else(|| config.log.file.clone());
    let sink: Arc<dyn LogSink> = match FileSink::open(&log_path) {
        Ok(s) => {
            log::info!("Audit log: {}", s.path().display());
            Arc::new(s)
        }
        Err(e) => {
            log::error!("❌ Cannot open audit log {}: {}", log_path.display(), e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    println!("  pgm: {}", config.program.name);
    println!("  parms: {}", config.program.args_contains);
    println!("  user: {}", config.program.user);

    let executor = ThrottledExecutor::new(
        config.script.path(),
        config.script.args(),
        config.script.throttle(),
        sink.clone(),
    );
    if !executor.is_valid() {
        eprintln!("bad script: {}  - correct toml config", executor.program().display());
        sink.log(&format!("bad script: {}", executor.program().display()));
        return ExitCode::from(EXIT_BAD_SCRIPT);
    }

    let trigger = TriggerCondition::from_status(&config.program.status, sink.as_ref());
    let poller = Poller::new(
        SysinfoSource::new(),
        config.program.criteria(),
        trigger,
        executor,
        sink.clone(),
    );

    let mut poll_config = match TimerConfig::every(config.program.interval_seconds, 0) {
        Ok(c) => c,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(checks) = config.program.max_checks {
        poll_config = poll_config.repeat(checks);
    }
    let watchdog = PeriodicTimer::new("poll", poller, poll_config, sink.clone());
    if let Err(e) = watchdog.arm() {
        log::error!("❌ Failed to start watchdog: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner(sink.as_ref());
    println!("  checking every {:?}", watchdog.time_interval());

    let audit = snapshot_timer(config.log.snapshot_interval_seconds, sink.clone());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut hangup = reload_signal();
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("🛑 Shutdown requested, stopping timers");
                sink.log("shutdown requested");
                break;
            }
            _ = next_reload(&mut hangup) => {
                reload_intervals(&args.config, &watchdog, audit.as_ref(), sink.as_ref());
            }
            _ = finished(&watchdog) => {
                log::info!("Check limit reached after {} polls", watchdog.current_repeat_count());
                sink.log("check limit reached");
                break;
            }
        }
    }

    // disarm joins the timer threads and may wait for a running script
    let stopped = tokio::task::spawn_blocking(move || {
        if let Some(t) = &audit {
            t.disarm();
        }
        watchdog.disarm();
        log::info!(
            "Watchdog stopped after {} ticks ({} failed), armed={}",
            watchdog.current_repeat_count(),
            watchdog.failed_tick_count(),
            watchdog.is_armed()
        );
    })
    .await;
    if let Err(e) = stopped {
        log::error!("Failed to stop timers cleanly: {}", e);
        return ExitCode::FAILURE;
    }

    sink.log("stopped");
    ExitCode::SUCCESS
}

/// Periodically write the whole process table to the audit log.
fn snapshot_timer(
    interval_seconds: u64,
    sink: Arc<dyn LogSink>,
) -> Option<PeriodicTimer<impl Tick>> {
    if interval_seconds == 0 {
        return None;
    }

    let mut source = SysinfoSource::new();
    let tick_sink = sink.clone();
    let dump = move || -> anyhow::Result<()> {
        tick_sink.log("Main loop");
        log_snapshot(&source.snapshot(), tick_sink.as_ref());
        Ok(())
    };

    let config = TimerConfig::every(interval_seconds, 0).ok()?;
    let timer = PeriodicTimer::new("snapshot", dump, config, sink);
    match timer.arm() {
        Ok(()) => Some(timer),
        Err(e) => {
            log::warn!("Process table logging disabled: {}", e);
            None
        }
    }
}

/// Resolves once the timer has stopped on its own (repeat bound reached).
async fn finished<T: Tick>(timer: &PeriodicTimer<T>) {
    while timer.is_armed() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Re-read the config file and apply its check intervals to the running
/// timers. Match criteria and script settings need a restart.
fn reload_intervals<P: Tick, A: Tick>(
    path: &Path,
    watchdog: &PeriodicTimer<P>,
    audit: Option<&PeriodicTimer<A>>,
    sink: &dyn LogSink,
) {
    let config = match WatchdogConfig::load(path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("❌ Reload failed, keeping current intervals: {}", e);
            sink.log(&format!("reload failed: {}", e));
            return;
        }
    };

    if let Err(e) = watchdog.set_time_interval(config.program.interval_seconds, 0) {
        log::error!("❌ {}", e);
        return;
    }
    if let Some(audit) = audit {
        if config.log.snapshot_interval_seconds > 0 {
            if let Err(e) = audit.set_time_interval(config.log.snapshot_interval_seconds, 0) {
                log::warn!("Snapshot interval unchanged: {}", e);
            }
        }
    }

    log::info!("🔄 Reloaded intervals from {}", path.display());
    sink.log(&format!(
        "config reloaded, checking every {} seconds",
        config.program.interval_seconds
    ));
}

#[cfg(unix)]
fn reload_signal() -> Option<tokio::signal::unix::Signal> {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::hangup()) {
        Ok(s) => Some(s),
        Err(e) => {
            log::warn!("SIGHUP reload unavailable: {}", e);
            None
        }
    }
}

#[cfg(unix)]
async fn next_reload(hangup: &mut Option<tokio::signal::unix::Signal>) {
    match hangup {
        Some(s) => {
            if s.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
fn reload_signal() {}

#[cfg(not(unix))]
async fn next_reload(_: &mut ()) {
    std::future::pending::<()>().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn print_banner(sink: &dyn LogSink) {
    let version = env!("CARGO_PKG_VERSION");
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      tinypsmon v{:<42}║", version);
    println!("║      Process liveness watchdog                            ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    sink.log(&format!("Starting Program Name: tinypsmon v{}", version));
}

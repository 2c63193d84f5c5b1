use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::sink::LogSink;

/// Work executed on every tick.
pub trait Tick: Send + 'static {
    fn tick(&mut self) -> anyhow::Result<()>;
}

impl<F> Tick for F
where
    F: FnMut() -> anyhow::Result<()> + Send + 'static,
{
    fn tick(&mut self) -> anyhow::Result<()> {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatCount {
    Forever,
    Times(u64),
}

impl RepeatCount {
    fn exhausted(self, completed: u64) -> bool {
        match self {
            RepeatCount::Forever => false,
            RepeatCount::Times(n) => completed >= n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub interval: Duration,
    pub repeat: RepeatCount,
}

impl TimerConfig {
    /// Unbounded timer firing every `secs` + `nanos`.
    pub fn every(secs: u64, nanos: u32) -> Result<Self, TimerError> {
        Ok(Self {
            interval: interval(secs, nanos)?,
            repeat: RepeatCount::Forever,
        })
    }

    /// Stop after `times` ticks.
    pub fn repeat(mut self, times: u64) -> Self {
        self.repeat = RepeatCount::Times(times);
        self
    }
}

fn interval(secs: u64, nanos: u32) -> Result<Duration, TimerError> {
    if nanos >= 1_000_000_000 || (secs == 0 && nanos == 0) {
        return Err(TimerError::InvalidInterval { secs, nanos });
    }
    Ok(Duration::new(secs, nanos))
}

#[derive(Debug)]
pub enum TimerError {
    /// `arm` was called on a timer that is already running.
    AlreadyArmed,
    /// Zero interval, or a nanosecond part of a second or more.
    InvalidInterval { secs: u64, nanos: u32 },
    /// The background thread could not be started.
    Spawn { source: std::io::Error },
}

impl std::fmt::Display for TimerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerError::AlreadyArmed => write!(f, "timer is already armed"),
            TimerError::InvalidInterval { secs, nanos } => {
                write!(f, "invalid timer interval: {}s + {}ns", secs, nanos)
            }
            TimerError::Spawn { source } => {
                write!(f, "failed to start timer thread: {}", source)
            }
        }
    }
}

impl std::error::Error for TimerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimerError::Spawn { source } => Some(source),
            _ => None,
        }
    }
}

struct State {
    armed: bool,
    /// Bumped by every arm that starts a new loop; older loops see the
    /// mismatch and exit.
    generation: u64,
    completed: u64,
    failed: u64,
    interval: Duration,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

/// Periodic execution engine.
///
/// Owns at most one live background thread. Each tick waits for the
/// configured interval (or an early wake from `disarm`) and then runs the
/// callback synchronously on that thread, so ticks never overlap. A slow tick
/// delays the following one; missed ticks are not caught up.
///
/// `arm` and `disarm` may be called from inside the callback. Joins always
/// happen after the handle slot is released, so a callback that re-enters
/// the timer never blocks a concurrent `disarm` or drop.
pub struct PeriodicTimer<T: Tick> {
    name: String,
    shared: Arc<Shared>,
    callback: Arc<Mutex<T>>,
    repeat: RepeatCount,
    worker: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn LogSink>,
}

impl<T: Tick> PeriodicTimer<T> {
    /// Create a disarmed timer. No thread is started until [`arm`](Self::arm).
    pub fn new(name: impl Into<String>, callback: T, config: TimerConfig, sink: Arc<dyn LogSink>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    armed: false,
                    generation: 0,
                    completed: 0,
                    failed: 0,
                    interval: config.interval,
                }),
                wake: Condvar::new(),
            }),
            callback: Arc::new(Mutex::new(callback)),
            repeat: config.repeat,
            worker: Mutex::new(None),
            sink,
        }
    }

    /// Start ticking. Fails with [`TimerError::AlreadyArmed`] if running.
    ///
    /// The completed-tick counter restarts from zero.
    pub fn arm(&self) -> Result<(), TimerError> {
        let previous = {
            let mut worker = self.worker.lock();
            let mut state = self.shared.state.lock();
            if state.armed {
                return Err(TimerError::AlreadyArmed);
            }

            if is_current(worker.as_ref()) {
                // re-armed from inside the callback: the running loop carries on
                state.armed = true;
                state.completed = 0;
                return Ok(());
            }

            state.armed = true;
            state.generation += 1;
            state.completed = 0;
            let first_wait = state.interval;
            let generation = state.generation;
            drop(state);

            let ctx = Worker {
                name: self.name.clone(),
                generation,
                shared: self.shared.clone(),
                callback: self.callback.clone(),
                repeat: self.repeat,
                sink: self.sink.clone(),
            };

            let spawned = thread::Builder::new()
                .name(format!("timer-{}", self.name))
                .spawn(move || ctx.run(first_wait));

            match spawned {
                Ok(handle) => {
                    log::info!("Timer '{}' armed ({:?}, {:?})", self.name, first_wait, self.repeat);
                    worker.replace(handle)
                }
                Err(e) => {
                    self.shared.state.lock().armed = false;
                    return Err(TimerError::Spawn { source: e });
                }
            }
        };

        // loop that already stopped, or one disarmed from its own callback
        if let Some(stale) = previous {
            self.join(stale);
        }
        Ok(())
    }

    /// Stop ticking and wait for the background thread to exit.
    ///
    /// Returns without waiting out the current interval. A tick already in
    /// progress runs to completion first. No-op when disarmed. From inside
    /// the callback it only clears the armed flag; the loop exits once the
    /// tick returns.
    pub fn disarm(&self) {
        let handle = {
            let mut worker = self.worker.lock();
            self.shared.state.lock().armed = false;
            self.shared.wake.notify_all();

            if is_current(worker.as_ref()) {
                return;
            }
            worker.take()
        };

        if let Some(handle) = handle {
            self.join(handle);
            log::info!("Timer '{}' disarmed", self.name);
        }
    }

    fn join(&self, handle: JoinHandle<()>) {
        if handle.join().is_err() {
            log::error!("Timer '{}' thread panicked", self.name);
            self.sink.log(&format!("timer {} thread panicked", self.name));
        }
    }

    /// Change the interval. Applies from the next wait; the one in progress is
    /// not shortened or lengthened.
    pub fn set_time_interval(&self, secs: u64, nanos: u32) -> Result<(), TimerError> {
        let interval = interval(secs, nanos)?;
        self.shared.state.lock().interval = interval;
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().armed
    }

    /// Ticks completed since the last `arm`.
    pub fn current_repeat_count(&self) -> u64 {
        self.shared.state.lock().completed
    }

    /// Ticks that returned an error or panicked since the timer was created.
    pub fn failed_tick_count(&self) -> u64 {
        self.shared.state.lock().failed
    }

    pub fn time_interval(&self) -> Duration {
        self.shared.state.lock().interval
    }
}

impl<T: Tick> Drop for PeriodicTimer<T> {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn is_current(handle: Option<&JoinHandle<()>>) -> bool {
    handle
        .map(|h| h.thread().id() == thread::current().id())
        .unwrap_or(false)
}

struct Worker<T: Tick> {
    name: String,
    generation: u64,
    shared: Arc<Shared>,
    callback: Arc<Mutex<T>>,
    repeat: RepeatCount,
    sink: Arc<dyn LogSink>,
}

impl<T: Tick> Worker<T> {
    fn run(self, first_wait: Duration) {
        let mut wait = first_wait;
        loop {
            if !self.sleep(wait) {
                break;
            }

            let outcome = {
                let mut callback = self.callback.lock();
                panic::catch_unwind(AssertUnwindSafe(|| callback.tick()))
            };

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(payload) => Some(panic_message(&*payload)),
            };

            let (stop, completed) = {
                let mut state = self.shared.state.lock();
                if state.generation != self.generation {
                    // superseded by a newer arm while the tick ran
                    (true, state.completed)
                } else {
                    state.completed += 1;
                    if failure.is_some() {
                        state.failed += 1;
                    }
                    wait = state.interval;
                    if self.repeat.exhausted(state.completed) {
                        state.armed = false;
                    }
                    (!state.armed, state.completed)
                }
            };

            if let Some(reason) = failure {
                log::error!("Timer '{}' tick {} failed: {}", self.name, completed, reason);
                self.sink.log(&format!("tick {} failed: {}", completed, reason));
            }

            if stop {
                break;
            }
        }
        log::debug!("Timer '{}' loop exited", self.name);
    }

    fn live(&self, state: &State) -> bool {
        state.armed && state.generation == self.generation
    }

    /// Wait out `wait`. Returns false when the timer should stop instead.
    fn sleep(&self, wait: Duration) -> bool {
        // too far out to represent: wait for a wake-up only
        let deadline = Instant::now().checked_add(wait);
        let mut state = self.shared.state.lock();
        while self.live(&state) {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.shared.wake.wait_for(&mut state, deadline - now);
                }
                None => self.shared.wake.wait(&mut state),
            }
        }

        if !self.live(&state) {
            return false;
        }
        if self.repeat.exhausted(state.completed) {
            state.armed = false;
            return false;
        }
        true
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

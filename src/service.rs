// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Worker-thread lifecycle for long-running channel roles.
//
// A `ServiceHost` runs one worker on a named thread and owns its
// `StopSignal`. The state only moves forward:
//
//   Running --request_stop()--> StopRequested --worker returns--> Stopped
//
// `Stopped` is published by a guard on the worker thread, so a worker that
// returns early, fails or panics still releases whoever waits on it.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServiceState {
    Running,
    StopRequested,
    Stopped,
}

/// Why [`StopSignal::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The tick interval elapsed; stop has not been requested.
    Tick,
    StopRequested,
}

/// Shared service state with blocking waits.
#[derive(Debug)]
pub struct StopSignal {
    state: Mutex<ServiceState>,
    changed: Condvar,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::Running),
            changed: Condvar::new(),
        }
    }

    // State is a plain enum; a panic while holding the lock cannot leave it
    // half-written.
    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ServiceState {
        *self.lock()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state() >= ServiceState::StopRequested
    }

    /// Move `Running` to `StopRequested` and wake every waiter.
    /// Returns `true` if this call made the transition.
    pub fn request_stop(&self) -> bool {
        let mut state = self.lock();
        if *state != ServiceState::Running {
            return false;
        }
        *state = ServiceState::StopRequested;
        self.changed.notify_all();
        true
    }

    /// Publish `Stopped` and wake every waiter.
    pub fn mark_stopped(&self) {
        let mut state = self.lock();
        *state = ServiceState::Stopped;
        self.changed.notify_all();
    }

    /// Block until stop is requested or, with `Some(tick)`, until `tick`
    /// elapses. `None` waits for the stop request only.
    pub fn wait(&self, tick: Option<Duration>) -> Wake {
        let running = |s: &mut ServiceState| *s == ServiceState::Running;
        let state = self.lock();
        let state = match tick {
            Some(tick) => {
                self.changed
                    .wait_timeout_while(state, tick, running)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .changed
                .wait_while(state, running)
                .unwrap_or_else(PoisonError::into_inner),
        };
        if *state == ServiceState::Running {
            Wake::Tick
        } else {
            Wake::StopRequested
        }
    }

    /// Block until `Stopped` is published. Returns `false` if `timeout`
    /// elapsed first.
    pub fn wait_stopped(&self, timeout: Option<Duration>) -> bool {
        let not_stopped = |s: &mut ServiceState| *s != ServiceState::Stopped;
        let state = self.lock();
        let state = match timeout {
            Some(timeout) => {
                self.changed
                    .wait_timeout_while(state, timeout, not_stopped)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .changed
                .wait_while(state, not_stopped)
                .unwrap_or_else(PoisonError::into_inner),
        };
        *state == ServiceState::Stopped
    }
}

/// What a worker gets to see of its host.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    name: String,
    signal: Arc<StopSignal>,
}

impl WorkerContext {
    /// A context not attached to any host; useful to drive a worker inline.
    pub fn detached(name: &str) -> Self {
        Self {
            name: name.to_string(),
            signal: Arc::new(StopSignal::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signal(&self) -> &Arc<StopSignal> {
        &self.signal
    }

    pub fn is_stop_requested(&self) -> bool {
        self.signal.is_stop_requested()
    }

    pub fn wait(&self, tick: Option<Duration>) -> Wake {
        self.signal.wait(tick)
    }

    /// Block until stop is requested, calling `on_tick` every `tick` in
    /// between. Returns the number of ticks.
    pub fn run_until_stopped<F>(&self, tick: Option<Duration>, mut on_tick: F) -> u64
    where
        F: FnMut(),
    {
        let mut ticks = 0;
        while self.signal.wait(tick) == Wake::Tick {
            ticks += 1;
            on_tick();
        }
        ticks
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to spawn worker thread `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("worker `{name}` panicked: {message}")]
    WorkerPanicked { name: String, message: String },
}

/// Publishes `Stopped` when dropped, including during unwinding.
struct StoppedGuard(Arc<StopSignal>);

impl Drop for StoppedGuard {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}

/// Runs a worker on its own thread until asked to stop.
pub struct ServiceHost<T> {
    name: String,
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> ServiceHost<T> {
    /// Spawn thread `name` running `worker`.
    pub fn start<F>(name: &str, worker: F) -> Result<Self, ServiceError>
    where
        F: FnOnce(WorkerContext) -> T + Send + 'static,
    {
        let signal = Arc::new(StopSignal::new());
        let ctx = WorkerContext {
            name: name.to_string(),
            signal: Arc::clone(&signal),
        };
        let guard = StoppedGuard(Arc::clone(&signal));
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = guard;
                let name = ctx.name.clone();
                tracing::info!(service = %name, "worker started");
                let out = worker(ctx);
                tracing::info!(service = %name, "worker finished");
                out
            })
            .map_err(|source| ServiceError::Spawn {
                name: name.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            signal,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        self.signal.state()
    }

    pub fn signal(&self) -> &Arc<StopSignal> {
        &self.signal
    }

    /// Request stop, wait for the worker to finish and return its result.
    pub fn stop(mut self) -> Result<T, ServiceError> {
        let started = Instant::now();
        if self.signal.request_stop() {
            tracing::info!(service = %self.name, "stop requested");
        }
        self.signal.wait_stopped(None);
        let joined = match self.handle.take() {
            Some(handle) => handle.join(),
            // `stop` consumes the host, and only `stop`/`drop` take the handle.
            None => unreachable!("service handle already joined"),
        };
        tracing::info!(
            service = %self.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "service stopped"
        );
        joined.map_err(|payload| ServiceError::WorkerPanicked {
            name: self.name.clone(),
            message: panic_message(payload.as_ref()),
        })
    }
}

/// Spawn a watcher that requests stop once `input` yields a line or ends.
///
/// The watcher is meant to be detached: if the service stops some other way
/// it stays blocked on `input` until the process exits.
pub fn stop_on_input<R>(
    signal: Arc<StopSignal>,
    mut input: R,
) -> Result<JoinHandle<()>, ServiceError>
where
    R: io::BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("stop-input".into())
        .spawn(move || {
            let mut line = String::new();
            if let Err(e) = input.read_line(&mut line) {
                tracing::warn!(error = %e, "stop input failed; stopping");
            }
            signal.request_stop();
        })
        .map_err(|source| ServiceError::Spawn {
            name: "stop-input".into(),
            source,
        })
}

impl<T> Drop for ServiceHost<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.signal.request_stop();
            if handle.join().is_err() {
                tracing::error!(service = %self.name, "worker panicked");
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        let signal = StopSignal::new();
        assert_eq!(signal.state(), ServiceState::Running);
        assert!(signal.request_stop());
        assert!(!signal.request_stop());
        signal.mark_stopped();
        assert!(!signal.request_stop());
        assert_eq!(signal.state(), ServiceState::Stopped);
        assert!(signal.is_stop_requested());
    }

    #[test]
    fn wait_ticks_without_stop() {
        let signal = StopSignal::new();
        assert_eq!(signal.wait(Some(Duration::from_millis(5))), Wake::Tick);
        signal.request_stop();
        assert_eq!(signal.wait(Some(Duration::from_secs(5))), Wake::StopRequested);
        assert_eq!(signal.wait(None), Wake::StopRequested);
    }

    #[test]
    fn wait_stopped_times_out() {
        let signal = StopSignal::new();
        assert!(!signal.wait_stopped(Some(Duration::from_millis(5))));
        signal.mark_stopped();
        assert!(signal.wait_stopped(Some(Duration::from_millis(5))));
    }

    #[test]
    fn input_line_requests_stop() {
        let signal = Arc::new(StopSignal::new());
        let input = io::Cursor::new(b"\n".to_vec());
        stop_on_input(Arc::clone(&signal), input).unwrap().join().unwrap();
        assert!(signal.is_stop_requested());

        let signal = Arc::new(StopSignal::new());
        stop_on_input(Arc::clone(&signal), io::empty()).unwrap().join().unwrap();
        assert_eq!(signal.wait(Some(Duration::from_secs(5))), Wake::StopRequested);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}

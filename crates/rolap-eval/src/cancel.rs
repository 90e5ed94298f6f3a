//! Cooperative cancellation and timeout.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use rolap_common::{OlapError, OlapResult};

/// Caller-side handle; clone it to cancel from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Execution-side poller for a [`CancellationToken`] plus an optional
/// deadline. Only every `interval`-th call to [`check`](Self::check) does
/// any work.
#[derive(Debug)]
pub struct ExecutionGuard {
    token: CancellationToken,
    started: Instant,
    timeout: Option<Duration>,
    interval: u32,
    ticks: u32,
}

impl ExecutionGuard {
    pub fn new(token: CancellationToken, timeout: Option<Duration>, interval: u32) -> Self {
        Self {
            token,
            started: Instant::now(),
            timeout,
            interval: interval.max(1),
            ticks: 0,
        }
    }

    pub fn check(&mut self) -> OlapResult<()> {
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % self.interval != 0 {
            return Ok(());
        }
        self.check_now()
    }

    /// Poll regardless of the interval.
    pub fn check_now(&self) -> OlapResult<()> {
        if self.token.is_cancelled() {
            return Err(OlapError::cancelled());
        }
        if let Some(limit) = self.timeout {
            let elapsed = self.started.elapsed();
            if elapsed > limit {
                return Err(OlapError::timeout(elapsed.as_millis()));
            }
        }
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

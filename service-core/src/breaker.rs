//! Circuit breaker for calls to external backends.
//!
//! Wraps lookups against stores that can stall or fail so the rest of the
//! service sheds load instead of queueing behind a dead dependency.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration for circuit breaker behavior.
#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Failures inside the rolling window that trip the breaker.
    pub failure_threshold: u32,
    /// Width of the rolling window failures are counted over.
    pub failure_window: Duration,
    /// How long the breaker stays open before admitting a probe.
    pub reset_timeout: Duration,
    /// Per-call deadline; an overrun counts as a failure.
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(2),
        }
    }
}

impl BreakerConfig {
    /// Create a config with the specified failure threshold.
    pub fn with_failure_threshold(failure_threshold: u32) -> Self {
        Self {
            failure_threshold,
            ..Default::default()
        }
    }
}

/// Lifecycle of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow through; failures are counted.
    Closed,
    /// Calls are rejected without reaching the backend.
    Open,
    /// One probe call is admitted to test recovery.
    HalfOpen,
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E>
where
    E: std::error::Error,
{
    /// The breaker is open; the call never reached the backend.
    #[error("circuit open: call rejected")]
    Open,
    /// The call ran past the configured deadline.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    /// The backend itself failed.
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    /// Failure timestamps inside the current window, oldest first.
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    probe_started_at: Option<Instant>,
    successful_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
}

/// Counter snapshot for logging and health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub window_failures: usize,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
}

/// State machine guarding one backend. Share it with `Arc` so every caller
/// of the protected operation sees the same state.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                probe_started_at: None,
                successful_calls: 0,
                failed_calls: 0,
                rejected_calls: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.core().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.core();
        BreakerSnapshot {
            state: core.state,
            window_failures: core.failures.len(),
            successful_calls: core.successful_calls,
            failed_calls: core.failed_calls,
            rejected_calls: core.rejected_calls,
        }
    }

    /// Execute `f` under the breaker.
    ///
    /// The call is admitted only when the circuit is closed, or as the single
    /// probe once the reset timeout has elapsed. A timeout counts as a
    /// failure like any backend error.
    ///
    /// # Example
    /// ```ignore
    /// let revoked = breaker
    ///     .call("revocation_check", || async { store.is_revoked(&jti).await })
    ///     .await?;
    /// ```
    pub async fn call<F, Fut, T, E>(&self, operation: &str, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        if !self.try_acquire() {
            debug!(breaker = %self.name, operation, "Circuit open, failing fast");
            return Err(BreakerError::Open);
        }

        match tokio::time::timeout(self.config.call_timeout, f()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure(operation);
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                self.record_failure(operation);
                warn!(
                    breaker = %self.name,
                    operation,
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "Call timed out"
                );
                Err(BreakerError::Timeout(self.config.call_timeout))
            }
        }
    }

    /// Decide whether a call may proceed, claiming the probe slot when the
    /// breaker is recovering.
    fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut core = self.core();

        match core.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let waited = core
                    .opened_at
                    .map(|at| now.duration_since(at))
                    .unwrap_or_default();
                if waited >= self.config.reset_timeout {
                    core.state = CircuitState::HalfOpen;
                    core.probe_started_at = Some(now);
                    debug!(breaker = %self.name, "Reset timeout elapsed, admitting probe");
                    true
                } else {
                    core.rejected_calls += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                // A probe abandoned mid-flight (its future dropped) must not
                // wedge the breaker; past the call deadline the slot is free.
                let probe_live = core
                    .probe_started_at
                    .map(|at| now.duration_since(at) <= self.config.call_timeout)
                    .unwrap_or(false);
                if probe_live {
                    core.rejected_calls += 1;
                    false
                } else {
                    core.probe_started_at = Some(now);
                    true
                }
            }
        }
    }

    fn record_success(&self) {
        let mut core = self.core();
        core.successful_calls += 1;
        if core.state == CircuitState::HalfOpen {
            core.state = CircuitState::Closed;
            core.failures.clear();
            core.opened_at = None;
            core.probe_started_at = None;
            info!(breaker = %self.name, "Probe succeeded, circuit closed");
        }
    }

    fn record_failure(&self, operation: &str) {
        let now = Instant::now();
        let mut core = self.core();
        core.failed_calls += 1;

        match core.state {
            CircuitState::HalfOpen => {
                core.state = CircuitState::Open;
                core.opened_at = Some(now);
                core.probe_started_at = None;
                warn!(breaker = %self.name, operation, "Probe failed, circuit re-opened");
            }
            CircuitState::Closed => {
                core.failures.push_back(now);
                while let Some(&oldest) = core.failures.front() {
                    if now.duration_since(oldest) > self.config.failure_window {
                        core.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if core.failures.len() as u32 >= self.config.failure_threshold {
                    core.state = CircuitState::Open;
                    core.opened_at = Some(now);
                    core.failures.clear();
                    warn!(
                        breaker = %self.name,
                        operation,
                        threshold = self.config.failure_threshold,
                        "Failure threshold reached, circuit opened"
                    );
                }
            }
            // A straggler finishing after the trip changes nothing.
            CircuitState::Open => {}
        }
    }

    fn core(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

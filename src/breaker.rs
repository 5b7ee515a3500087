//! Per-provider circuit breaker
//!
//! Gates calls to a provider judged to be failing so the router can bypass
//! it instead of retrying forever. States: Closed (calls pass through, a
//! consecutive-failure counter accumulates), Open (calls rejected without
//! reaching the network until `reset_timeout` elapses), HalfOpen (exactly
//! one probe admitted to test recovery).
//!
//! Admission goes through [`CircuitBreaker::try_acquire`], which hands back
//! a [`BreakerPermit`]. The caller must resolve the permit with `success()`
//! or `failure()`; a permit dropped unresolved counts as a cancelled call.
//! Cancellation is neutral in Closed, but an abandoned HalfOpen probe sends
//! the breaker back to Open — an aborted probe proves nothing about
//! recovery. That choice is deliberate; see DESIGN.md.

use crate::config::CircuitBreakerConfig;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected without reaching the adapter
    Open,
    /// A single probe request is allowed through
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Per-provider failure-isolation state machine
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker for the named provider, initially Closed
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Ask to admit a call
    ///
    /// Returns a permit when the call may proceed: always in Closed, and for
    /// exactly one caller at a time in HalfOpen. In Open, returns `None`
    /// until `reset_timeout` has elapsed since the circuit opened, at which
    /// point the breaker transitions to HalfOpen and this call becomes the
    /// probe. The probe decision is made under the state lock, so concurrent
    /// callers cannot both be admitted as probes.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Some(BreakerPermit::new(self, false)),
            CircuitState::Open => {
                let elapsed_enough = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.reset_timeout);
                if elapsed_enough {
                    debug!(provider = %self.name, "circuit breaker transitioning Open -> HalfOpen");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Some(BreakerPermit::new(self, true))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    // A probe is already out; treat like Open.
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(BreakerPermit::new(self, true))
                }
            }
        }
    }

    /// Current state
    ///
    /// The Open -> HalfOpen transition happens on admission, so a breaker
    /// whose reset timeout has elapsed still reports Open until the next
    /// [`try_acquire`](Self::try_acquire).
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current consecutive-failure count
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Force the breaker back to Closed and clear counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        debug!(provider = %self.name, "circuit breaker reset");
    }

    fn record_success(&self, probe: bool) {
        let mut inner = self.inner.lock();
        if probe && inner.state == CircuitState::HalfOpen {
            debug!(provider = %self.name, "circuit breaker probe succeeded, closing");
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
        }
        inner.consecutive_failures = 0;
        inner.probe_in_flight = inner.probe_in_flight && !probe;
    }

    fn record_failure(&self, probe: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        provider = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                debug!(provider = %self.name, "circuit breaker probe failed, reopening");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                if probe {
                    inner.probe_in_flight = false;
                }
            }
            // A failure reported while Open means the call was admitted
            // before the circuit opened; nothing left to do.
            CircuitState::Open => {}
        }
    }

    fn record_cancelled(&self, probe: bool) {
        if !probe {
            // Cancellation of an ordinary call is neither success nor failure.
            return;
        }
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            warn!(provider = %self.name, "half-open probe cancelled, reopening");
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
        inner.probe_in_flight = false;
    }
}

/// Admission ticket for one call through a breaker
///
/// Must be resolved with [`success`](Self::success) or
/// [`failure`](Self::failure); dropping it unresolved reports cancellation.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            resolved: false,
        }
    }

    /// Whether this permit is the HalfOpen probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Report that the admitted call succeeded
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record_success(self.probe);
    }

    /// Report that the admitted call failed
    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record_failure(self.probe);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.record_cancelled(self.probe);
        }
    }
}

//! Interruption-aware retry protocol for blocking native calls
//!
//! A native call that fails with `EINTR` was either hit by an unrelated OS
//! signal (retry it) or cut short because the host scheduler has work pending
//! (surface it). The pending checkpoint is an explicit [`SignalCheck`]
//! capability, consulted after every observed interruption and never cached.
//!
//! # Examples
//!
//! ```
//! use zbridge::clock::MonotonicClock;
//! use zbridge::codes::errno;
//! use zbridge::retry::{NoSignal, RetryOutcome, RetryableCall};
//! use zbridge::transport::MemoryTransport;
//!
//! let transport = MemoryTransport::new();
//! let retry = RetryableCall::new(&transport, &NoSignal, &MonotonicClock);
//! let mut interruptions = 2;
//! let outcome = retry.invoke(|| {
//!     if interruptions > 0 {
//!         interruptions -= 1;
//!         Err(errno::EINTR)
//!     } else {
//!         Ok(42)
//!     }
//! });
//! assert!(matches!(outcome, RetryOutcome::Completed(42)));
//! ```

use crate::clock::Clock;
use crate::codes::errno;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{RawResult, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The host's "cooperative signal pending" checkpoint
pub trait SignalCheck: Send + Sync {
    fn is_pending(&self) -> bool;
}

/// A host without a cooperative scheduler: never pending
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignal;

impl SignalCheck for NoSignal {
    fn is_pending(&self) -> bool {
        false
    }
}

/// Shared flag the host raises when its scheduler needs the thread back
#[derive(Debug, Default, Clone)]
pub struct SignalFlag(Arc<AtomicBool>);

impl SignalFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SignalCheck for SignalFlag {
    fn is_pending(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl<F> SignalCheck for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_pending(&self) -> bool {
        self()
    }
}

/// Wait budget of a blocking call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Infinite,
    Millis(u64),
}

impl Timeout {
    /// Host convention: negative waits forever, zero never blocks
    pub fn from_millis(ms: i64) -> Self {
        u64::try_from(ms).map_or(Timeout::Infinite, Timeout::Millis)
    }

    /// Native convention, `-1` for infinite
    pub fn as_millis(self) -> i64 {
        match self {
            Timeout::Infinite => -1,
            Timeout::Millis(ms) => i64::try_from(ms).unwrap_or(i64::MAX),
        }
    }

    pub fn is_bounded(self) -> bool {
        matches!(self, Timeout::Millis(_))
    }

    /// Budget left once `elapsed` has been spent, floored at zero
    pub fn remaining_after(self, elapsed: Duration) -> Self {
        match self {
            Timeout::Infinite => Timeout::Infinite,
            Timeout::Millis(ms) => {
                let spent = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                Timeout::Millis(ms.saturating_sub(spent))
            }
        }
    }
}

/// How a native error code is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    WouldBlock,
    Interrupted,
    Failed,
}

pub fn classify(code: i32) -> ErrorClass {
    match code {
        errno::EAGAIN => ErrorClass::WouldBlock,
        errno::EINTR => ErrorClass::Interrupted,
        _ => ErrorClass::Failed,
    }
}

/// Result of one logical invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Completed(T),
    WouldBlock,
    /// Cut short by a pending cooperative signal, with the budget left for
    /// time-bounded calls
    Interrupted(Option<Timeout>),
    Failed { code: i32, message: String },
}

impl<T> RetryOutcome<T> {
    /// Split off the hard failure as an error
    pub fn into_outcome(self) -> BridgeResult<CallOutcome<T>> {
        match self {
            RetryOutcome::Completed(value) => Ok(CallOutcome::Completed(value)),
            RetryOutcome::WouldBlock => Ok(CallOutcome::WouldBlock),
            RetryOutcome::Interrupted(remaining) => Ok(CallOutcome::Interrupted(remaining)),
            RetryOutcome::Failed { code, message } => Err(BridgeError::transport(code, message)),
        }
    }
}

/// Outcome of a blocking operation that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    Completed(T),
    WouldBlock,
    Interrupted(Option<Timeout>),
}

impl<T> CallOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Completed(value) => CallOutcome::Completed(f(value)),
            CallOutcome::WouldBlock => CallOutcome::WouldBlock,
            CallOutcome::Interrupted(remaining) => CallOutcome::Interrupted(remaining),
        }
    }

    pub fn completed(self) -> Option<T> {
        match self {
            CallOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CallOutcome::Completed(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, CallOutcome::Interrupted(_))
    }
}

/// Drives the retry loop for one blocking native call
pub struct RetryableCall<'a> {
    transport: &'a dyn Transport,
    signal: &'a dyn SignalCheck,
    clock: &'a dyn Clock,
}

impl<'a> RetryableCall<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        signal: &'a dyn SignalCheck,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            transport,
            signal,
            clock,
        }
    }

    /// Invoke an untimed call, retrying transient interruptions without bound
    pub fn invoke<T>(&self, mut call: impl FnMut() -> RawResult<T>) -> RetryOutcome<T> {
        let mut attempt: u32 = 1;
        loop {
            let code = match call() {
                Ok(value) => return RetryOutcome::Completed(value),
                Err(code) => code,
            };
            match classify(code) {
                ErrorClass::WouldBlock => return RetryOutcome::WouldBlock,
                ErrorClass::Failed => return self.failed(code),
                ErrorClass::Interrupted => {
                    if self.signal.is_pending() {
                        tracing::debug!(attempt, "blocking call interrupted by pending signal");
                        return RetryOutcome::Interrupted(None);
                    }
                    tracing::trace!(attempt, "transient interruption, retrying");
                    attempt += 1;
                }
            }
        }
    }

    /// Invoke a time-bounded call
    ///
    /// `call` receives the remaining budget: the original timeout minus the
    /// time elapsed since the first attempt. A spent budget is retried once
    /// more with a zero timeout, which makes the native call a final
    /// non-blocking check. An interruption of that final check ends the wait
    /// as timed out, reported as [`RetryOutcome::WouldBlock`].
    pub fn invoke_timed<T>(
        &self,
        timeout: Timeout,
        mut call: impl FnMut(Timeout) -> RawResult<T>,
    ) -> RetryOutcome<T> {
        let started = self.clock.now();
        let mut budget = timeout;
        let mut attempt: u32 = 1;
        loop {
            let code = match call(budget) {
                Ok(value) => return RetryOutcome::Completed(value),
                Err(code) => code,
            };
            match classify(code) {
                ErrorClass::WouldBlock => return RetryOutcome::WouldBlock,
                ErrorClass::Failed => return self.failed(code),
                ErrorClass::Interrupted => {
                    let elapsed = self.clock.now().saturating_duration_since(started);
                    let remaining = timeout.remaining_after(elapsed);
                    if self.signal.is_pending() {
                        tracing::debug!(
                            attempt,
                            remaining_ms = remaining.as_millis(),
                            "timed call interrupted by pending signal"
                        );
                        return RetryOutcome::Interrupted(Some(remaining));
                    }
                    if budget == Timeout::Millis(0) {
                        tracing::debug!(attempt, "timed call budget spent");
                        return RetryOutcome::WouldBlock;
                    }
                    tracing::trace!(
                        attempt,
                        remaining_ms = remaining.as_millis(),
                        "transient interruption, retrying with reduced timeout"
                    );
                    budget = remaining;
                    attempt += 1;
                }
            }
        }
    }

    fn failed<T>(&self, code: i32) -> RetryOutcome<T> {
        RetryOutcome::Failed {
            code,
            message: self.transport.strerror(code),
        }
    }
}

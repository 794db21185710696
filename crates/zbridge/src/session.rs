//! Shared bridge state: transport, capabilities and the signal checkpoint

use crate::clock::{Clock, MonotonicClock};
use crate::error::{BridgeError, BridgeResult};
use crate::retry::{NoSignal, RetryableCall, SignalCheck};
use crate::transport::{Capabilities, Feature, Transport};
use std::fmt;
use std::sync::Arc;

/// Everything a handle or operation needs to reach the native library
///
/// Capabilities are queried from the transport once, when the session is
/// built.
pub struct Session {
    transport: Arc<dyn Transport>,
    capabilities: Capabilities,
    signal: Arc<dyn SignalCheck>,
    clock: Arc<dyn Clock>,
}

impl Session {
    /// Session with no cooperative signal and the system monotonic clock
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::builder(transport).build()
    }

    pub fn builder(transport: Arc<dyn Transport>) -> SessionBuilder {
        SessionBuilder {
            transport,
            signal: Arc::new(NoSignal),
            clock: Arc::new(MonotonicClock),
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Retry driver bound to this session's signal checkpoint and clock
    pub fn retry(&self) -> RetryableCall<'_> {
        RetryableCall::new(
            self.transport.as_ref(),
            self.signal.as_ref(),
            self.clock.as_ref(),
        )
    }

    /// Fail with `Unsupported` unless the loaded library has `feature`
    pub fn require(&self, feature: Feature, operation: &'static str) -> BridgeResult<()> {
        if self.capabilities.supports(feature) {
            Ok(())
        } else {
            Err(BridgeError::Unsupported {
                operation,
                required: format!(">= {}", feature.since()),
            })
        }
    }

    /// Convert a native error code into a transport failure
    pub fn failure(&self, code: i32) -> BridgeError {
        BridgeError::transport(code, self.transport.strerror(code))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    transport: Arc<dyn Transport>,
    signal: Arc<dyn SignalCheck>,
    clock: Arc<dyn Clock>,
}

impl SessionBuilder {
    pub fn signal(mut self, signal: Arc<dyn SignalCheck>) -> Self {
        self.signal = signal;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Arc<Session> {
        let capabilities = self.transport.capabilities();
        tracing::debug!(
            backend = self.transport.backend(),
            version = %capabilities.version(),
            "bridge session ready"
        );
        Arc::new(Session {
            transport: self.transport,
            capabilities,
            signal: self.signal,
            clock: self.clock,
        })
    }
}

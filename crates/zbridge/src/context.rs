//! Messaging contexts

use crate::error::{BridgeError, BridgeResult};
use crate::handle::{ContextResource, ResourceHandle};
use crate::retry::CallOutcome;
use crate::session::Session;
use crate::socket::Socket;
use crate::tables::{OptionDescriptor, OptionDomain};
use crate::transport::{Feature, RawDescriptor};
use std::sync::Arc;

/// An open (or destroyed) native context
#[derive(Debug)]
pub struct Context {
    handle: ResourceHandle<ContextResource>,
}

impl Context {
    /// Create a context with `io_threads` I/O threads
    pub fn new(session: Arc<Session>, io_threads: i32) -> BridgeResult<Self> {
        if io_threads < 0 {
            return Err(BridgeError::invalid_argument(
                0,
                "a non-negative number of I/O threads",
            ));
        }
        let created = session.transport().context_new(io_threads);
        Ok(Self {
            handle: ResourceHandle::acquire(session, created)?,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        self.handle.session()
    }

    pub fn raw(&self) -> BridgeResult<RawDescriptor> {
        self.handle.get()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    pub fn get(&self, option: &OptionDescriptor) -> BridgeResult<i32> {
        self.session().require(Feature::ContextOptions, "ctxGet")?;
        check_domain(option)?;
        let raw = self.raw()?;
        self.session()
            .transport()
            .context_get(raw, option.id)
            .map_err(|code| self.session().failure(code))
    }

    pub fn set(&self, option: &OptionDescriptor, value: i32) -> BridgeResult<()> {
        self.session().require(Feature::ContextOptions, "ctxSet")?;
        check_domain(option)?;
        let raw = self.raw()?;
        self.session()
            .transport()
            .context_set(raw, option.id, value)
            .map_err(|code| self.session().failure(code))
    }

    /// Open a socket of the given native type in this context
    pub fn socket(&self, kind: i32) -> BridgeResult<Socket> {
        Socket::new(self, kind)
    }

    /// Terminate the context, blocking until its sockets are closed
    ///
    /// Returns `true` when a pending cooperative signal cut the wait short.
    /// The context then stays open and `destroy` can be called again to
    /// resume. Destroying a destroyed context returns `false`.
    pub fn destroy(&mut self) -> BridgeResult<bool> {
        let raw = match self.handle.get() {
            Ok(raw) => raw,
            Err(_) => return Ok(false),
        };
        let session = Arc::clone(self.session());
        let transport = session.transport();
        let outcome = session
            .retry()
            .invoke(|| transport.context_destroy(raw))
            .into_outcome();

        if let Ok(CallOutcome::Interrupted(_)) = outcome {
            return Ok(true);
        }
        self.handle.close_with(|_| outcome).map(|_| false)
    }
}

fn check_domain(option: &OptionDescriptor) -> BridgeResult<()> {
    if option.domain == OptionDomain::Context {
        Ok(())
    } else {
        Err(BridgeError::invalid_argument(1, OptionDomain::Context.family()))
    }
}

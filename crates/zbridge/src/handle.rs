//! Close-once ownership of native descriptors
//!
//! A [`ResourceHandle`] owns exactly one native descriptor. The native
//! release call runs once, at the Open to Closed transition, whichever of
//! `close()`, `close_with()` or `Drop` gets there first. Only kinds marked
//! [`Duplicable`] expose `duplicate()`.

use crate::error::{BridgeError, BridgeResult};
use crate::session::Session;
use crate::transport::{RawDescriptor, RawResult, Transport};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A kind of native resource and how to release it
pub trait ResourceKind {
    /// Name used in `AlreadyClosed` errors
    const NAME: &'static str;

    fn release(transport: &dyn Transport, raw: RawDescriptor) -> RawResult<()>;
}

/// Resource kinds that can be soundly duplicated into an independent copy
pub trait Duplicable: ResourceKind {
    fn duplicate(transport: &dyn Transport, raw: RawDescriptor) -> RawResult<RawDescriptor>;
}

#[derive(Debug)]
pub enum ContextResource {}

impl ResourceKind for ContextResource {
    const NAME: &'static str = "Context";

    fn release(transport: &dyn Transport, raw: RawDescriptor) -> RawResult<()> {
        transport.context_destroy(raw)
    }
}

#[derive(Debug)]
pub enum SocketResource {}

impl ResourceKind for SocketResource {
    const NAME: &'static str = "Socket";

    fn release(transport: &dyn Transport, raw: RawDescriptor) -> RawResult<()> {
        transport.socket_close(raw)
    }
}

#[derive(Debug)]
pub enum MessageResource {}

impl ResourceKind for MessageResource {
    const NAME: &'static str = "Message";

    fn release(transport: &dyn Transport, raw: RawDescriptor) -> RawResult<()> {
        transport.message_close(raw)
    }
}

impl Duplicable for MessageResource {
    fn duplicate(transport: &dyn Transport, raw: RawDescriptor) -> RawResult<RawDescriptor> {
        let copy = transport.message_init(None)?;
        if let Err(code) = transport.message_copy(copy, raw) {
            let _ = transport.message_close(copy);
            return Err(code);
        }
        Ok(copy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Open(RawDescriptor),
    Closed,
}

/// Exclusive owner of one native descriptor
pub struct ResourceHandle<K: ResourceKind> {
    session: Arc<Session>,
    state: HandleState,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> ResourceHandle<K> {
    /// Wrap the result of a native create call
    pub fn acquire(session: Arc<Session>, created: RawResult<RawDescriptor>) -> BridgeResult<Self> {
        let raw = created.map_err(|code| session.failure(code))?;
        tracing::trace!(kind = K::NAME, raw = raw.id(), "acquired handle");
        Ok(Self {
            session,
            state: HandleState::Open(raw),
            _kind: PhantomData,
        })
    }

    /// The descriptor, while open
    pub fn get(&self) -> BridgeResult<RawDescriptor> {
        match self.state {
            HandleState::Open(raw) => Ok(raw),
            HandleState::Closed => Err(BridgeError::AlreadyClosed { kind: K::NAME }),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, HandleState::Open(_))
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Release the descriptor; a second call is a successful no-op
    pub fn close(&mut self) -> BridgeResult<()> {
        let session = Arc::clone(&self.session);
        self.close_with(|raw| {
            K::release(session.transport(), raw).map_err(|code| session.failure(code))
        })
        .map(|released| released.unwrap_or(()))
    }

    /// Release through a caller-supplied destructor call
    ///
    /// The handle is Closed before `release` runs and stays Closed whatever
    /// it returns. Returns `None` if the handle was already closed.
    pub fn close_with<T>(
        &mut self,
        release: impl FnOnce(RawDescriptor) -> BridgeResult<T>,
    ) -> BridgeResult<Option<T>> {
        match std::mem::replace(&mut self.state, HandleState::Closed) {
            HandleState::Open(raw) => {
                tracing::trace!(kind = K::NAME, raw = raw.id(), "closing handle");
                release(raw).map(Some)
            }
            HandleState::Closed => Ok(None),
        }
    }
}

impl<K: Duplicable> ResourceHandle<K> {
    /// A new handle owning an independent copy of the resource
    pub fn duplicate(&self) -> BridgeResult<Self> {
        let raw = self.get()?;
        let created = K::duplicate(self.session.transport(), raw);
        Self::acquire(Arc::clone(&self.session), created)
    }
}

impl<K: ResourceKind> Drop for ResourceHandle<K> {
    fn drop(&mut self) {
        if let HandleState::Open(raw) = self.state {
            self.state = HandleState::Closed;
            if let Err(code) = K::release(self.session.transport(), raw) {
                tracing::warn!(
                    kind = K::NAME,
                    code,
                    error = %self.session.transport().strerror(code),
                    "failed to release native resource on drop"
                );
            }
        }
    }
}

impl<K: ResourceKind> fmt::Debug for ResourceHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("kind", &K::NAME)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use tracing_test::traced_test;

    fn session() -> Arc<Session> {
        Session::new(Arc::new(MemoryTransport::new()))
    }

    #[test]
    fn test_acquire_failure_is_transport_error() {
        let err = ResourceHandle::<MessageResource>::acquire(session(), Err(libc::ENOMEM))
            .unwrap_err();
        assert_eq!(err.code(), Some(libc::ENOMEM));
    }

    #[test]
    fn test_get_after_close() {
        let session = session();
        let created = session.transport().message_init(None);
        let mut handle = ResourceHandle::<MessageResource>::acquire(session, created).unwrap();

        assert!(handle.get().is_ok());
        handle.close().unwrap();
        assert!(!handle.is_open());
        assert!(matches!(
            handle.get(),
            Err(BridgeError::AlreadyClosed { kind: "Message" })
        ));
    }

    #[test]
    fn test_close_with_runs_once() {
        let session = session();
        let created = session.transport().message_init(None);
        let mut handle = ResourceHandle::<MessageResource>::acquire(session, created).unwrap();

        let mut calls = 0;
        let first = handle.close_with(|_| {
            calls += 1;
            Ok(7)
        });
        assert_eq!(first.unwrap(), Some(7));
        let second = handle.close_with(|_| {
            calls += 1;
            Ok(8)
        });
        assert_eq!(second.unwrap(), None);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_close_stays_closed_after_failed_release() {
        let session = session();
        let created = session.transport().message_init(None);
        let mut handle = ResourceHandle::<MessageResource>::acquire(session, created).unwrap();

        let result: BridgeResult<Option<()>> =
            handle.close_with(|_| Err(BridgeError::transport(libc::EFAULT, "bad address")));
        assert!(result.is_err());
        assert!(!handle.is_open());
        assert!(handle.close().is_ok());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let session = session();
        let transport = session.transport();
        let raw = transport.message_init(Some(3)).unwrap();
        transport.message_write(raw, b"abc");
        let original =
            ResourceHandle::<MessageResource>::acquire(Arc::clone(&session), Ok(raw)).unwrap();

        let copy = original.duplicate().unwrap();
        let copy_raw = copy.get().unwrap();
        assert_ne!(copy_raw, raw);
        assert_eq!(transport.message_data(copy_raw), b"abc".to_vec());
    }

    #[traced_test]
    #[test]
    fn test_drop_logs_release_failure() {
        let session = session();
        let raw = session.transport().message_init(None).unwrap();
        let handle = ResourceHandle::<MessageResource>::acquire(Arc::clone(&session), Ok(raw))
            .unwrap();
        // Release the native side behind the handle's back
        session.transport().message_close(raw).unwrap();
        drop(handle);
        assert!(logs_contain("failed to release native resource on drop"));
    }
}

//! Transport backends
//!
//! A [`Transport`] is the black-box messaging library underneath the bridge.
//! Every primitive reports failure as a raw errno-style code so the retry
//! protocol can classify it; turning codes into [`crate::BridgeError`] happens
//! above this layer.
//!
//! Two backends ship with the crate:
//! - [`crate::ffi::NativeTransport`] drives libzmq through its C ABI
//! - [`MemoryTransport`] is an in-process implementation for tests and for
//!   hosts without libzmq installed

pub mod memory;

pub use memory::MemoryTransport;

use crate::codes::errno;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;

/// Raw native result: a value, or the native error code
pub type RawResult<T> = Result<T, i32>;

/// Opaque, non-null native descriptor
///
/// For the native backend this is the pointer returned by the library; the
/// memory backend uses it as an object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawDescriptor(NonZeroUsize);

impl RawDescriptor {
    /// Wrap a pointer, rejecting null
    pub fn from_ptr<T>(ptr: *mut T) -> Option<Self> {
        NonZeroUsize::new(ptr as usize).map(RawDescriptor)
    }

    /// Wrap a numeric id, rejecting zero
    pub fn from_id(id: usize) -> Option<Self> {
        NonZeroUsize::new(id).map(RawDescriptor)
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0.get() as *mut T
    }

    pub fn id(self) -> usize {
        self.0.get()
    }
}

/// Native library version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Operations that only exist in some native library versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ContextOptions,
    Unbind,
    Disconnect,
    MessageGet,
    MessageSet,
    Device,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::ContextOptions,
        Feature::Unbind,
        Feature::Disconnect,
        Feature::MessageGet,
        Feature::MessageSet,
        Feature::Device,
    ];

    /// First native version providing the feature
    pub fn since(self) -> Version {
        match self {
            Feature::ContextOptions
            | Feature::Unbind
            | Feature::Disconnect
            | Feature::MessageSet => Version::new(3, 1, 1),
            Feature::MessageGet => Version::new(3, 1, 0),
            Feature::Device => Version::new(2, 0, 0),
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Feature surface of a loaded transport, queried once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    version: Version,
    features: u32,
}

impl Capabilities {
    /// Everything the given version provides
    pub fn for_version(version: Version) -> Self {
        let features = Feature::ALL
            .iter()
            .filter(|feature| version >= feature.since())
            .fold(0, |mask, feature| mask | feature.bit());
        Self { version, features }
    }

    /// Drop a feature the backend cannot provide despite its version
    pub fn without(mut self, feature: Feature) -> Self {
        self.features &= !feature.bit();
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features & feature.bit() != 0
    }

    /// Supported features, in declaration order
    pub fn features(&self) -> Vec<Feature> {
        Feature::ALL
            .iter()
            .copied()
            .filter(|feature| self.supports(*feature))
            .collect()
    }
}

/// Endpoint operations share one native signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointOp {
    Bind,
    Connect,
    Unbind,
    Disconnect,
}

impl EndpointOp {
    pub fn name(self) -> &'static str {
        match self {
            EndpointOp::Bind => "bind",
            EndpointOp::Connect => "connect",
            EndpointOp::Unbind => "unbind",
            EndpointOp::Disconnect => "disconnect",
        }
    }
}

/// One entry of a native poll set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPollItem {
    pub socket: RawDescriptor,
    pub events: u16,
    pub revents: u16,
}

/// The messaging library as seen by the bridge
///
/// Methods mirror the native C API one to one. Optional entry points
/// default to `ENOTSUP` so small test doubles only implement what they use.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Short backend name for diagnostics
    fn backend(&self) -> &'static str;

    fn version(&self) -> Version;

    fn capabilities(&self) -> Capabilities {
        Capabilities::for_version(self.version())
    }

    /// Human-readable text for a native error code
    fn strerror(&self, code: i32) -> String {
        std::io::Error::from_raw_os_error(code).to_string()
    }

    fn context_new(&self, io_threads: i32) -> RawResult<RawDescriptor>;

    fn context_destroy(&self, context: RawDescriptor) -> RawResult<()>;

    fn context_get(&self, _context: RawDescriptor, _option: i32) -> RawResult<i32> {
        Err(errno::ENOTSUP)
    }

    fn context_set(&self, _context: RawDescriptor, _option: i32, _value: i32) -> RawResult<()> {
        Err(errno::ENOTSUP)
    }

    fn socket_new(&self, context: RawDescriptor, kind: i32) -> RawResult<RawDescriptor>;

    fn socket_close(&self, socket: RawDescriptor) -> RawResult<()>;

    /// Read an option into `buf`, returning the length written
    fn get_option(&self, socket: RawDescriptor, option: i32, buf: &mut [u8]) -> RawResult<usize>;

    fn set_option(&self, socket: RawDescriptor, option: i32, value: &[u8]) -> RawResult<()>;

    fn endpoint(&self, socket: RawDescriptor, op: EndpointOp, address: &str) -> RawResult<()>;

    /// Allocate a message, empty or with `size` zeroed bytes
    fn message_init(&self, size: Option<usize>) -> RawResult<RawDescriptor>;

    fn message_close(&self, message: RawDescriptor) -> RawResult<()>;

    fn message_size(&self, message: RawDescriptor) -> usize;

    fn message_data(&self, message: RawDescriptor) -> Vec<u8>;

    /// Overwrite the content; `data` is exactly `message_size` bytes long
    fn message_write(&self, message: RawDescriptor, data: &[u8]);

    fn message_copy(&self, dest: RawDescriptor, src: RawDescriptor) -> RawResult<()>;

    fn message_move(&self, dest: RawDescriptor, src: RawDescriptor) -> RawResult<()>;

    fn message_get(&self, _message: RawDescriptor, _option: i32) -> RawResult<i32> {
        Err(errno::ENOTSUP)
    }

    fn message_set(&self, _message: RawDescriptor, _option: i32, _value: i32) -> RawResult<()> {
        Err(errno::ENOTSUP)
    }

    /// Send, returning the number of bytes queued
    fn send(&self, message: RawDescriptor, socket: RawDescriptor, flags: u32) -> RawResult<usize>;

    /// Receive, returning the number of bytes in the new content
    fn recv(&self, message: RawDescriptor, socket: RawDescriptor, flags: u32) -> RawResult<usize>;

    /// Wait for events; a negative timeout waits forever
    fn poll(&self, items: &mut [RawPollItem], timeout_ms: i64) -> RawResult<usize>;

    fn device(&self, _kind: i32, _frontend: RawDescriptor, _backend: RawDescriptor) -> RawResult<()> {
        Err(errno::ENOTSUP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_descriptor_rejects_null() {
        assert!(RawDescriptor::from_ptr(std::ptr::null_mut::<u8>()).is_none());
        assert!(RawDescriptor::from_id(0).is_none());
        assert_eq!(RawDescriptor::from_id(7).map(RawDescriptor::id), Some(7));
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(3, 1, 1) > Version::new(3, 1, 0));
        assert!(Version::new(4, 0, 0) > Version::new(3, 2, 9));
        assert_eq!(Version::new(4, 3, 4).to_string(), "4.3.4");
    }

    #[test]
    fn test_capabilities_for_old_library() {
        let caps = Capabilities::for_version(Version::new(2, 2, 0));
        assert!(caps.supports(Feature::Device));
        assert!(!caps.supports(Feature::ContextOptions));
        assert!(!caps.supports(Feature::MessageGet));
    }

    #[test]
    fn test_capabilities_for_3_1_0() {
        let caps = Capabilities::for_version(Version::new(3, 1, 0));
        assert!(caps.supports(Feature::MessageGet));
        assert!(!caps.supports(Feature::MessageSet));
        assert!(!caps.supports(Feature::Unbind));
    }

    #[test]
    fn test_capabilities_without() {
        let caps = Capabilities::for_version(Version::new(4, 3, 0)).without(Feature::Device);
        assert!(!caps.supports(Feature::Device));
        assert_eq!(caps.features().len(), Feature::ALL.len() - 1);
    }
}

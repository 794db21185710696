//! zbridge - ZeroMQ for a managed host runtime
//!
//! This library exposes the messaging library's object model to a host:
//! - Contexts, sockets and messages as close-once owned handles
//! - Socket options with caller-selected encodings
//! - Send, receive, poll and devices with cooperative interruption
//! - A host operation surface over a dynamic term model

/// zbridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod bridge;
pub mod clock;
pub mod codes;
pub mod context;
pub mod device;
pub mod error;
pub mod ffi;
pub mod flags;
pub mod handle;
pub mod message;
pub mod option;
pub mod poll;
pub mod retry;
pub mod session;
pub mod socket;
pub mod tables;
pub mod term;
pub mod transport;

// Re-export commonly used types
pub use bridge::{transport_from_config, Bridge, Operation};
pub use context::Context;
pub use error::{BridgeError, BridgeResult};
pub use message::Message;
pub use option::{OptionValue, Primitive, TypeSelector};
pub use poll::{PollItem, PollMultiplexer, PollReport};
pub use retry::{CallOutcome, NoSignal, SignalCheck, SignalFlag, Timeout};
pub use session::Session;
pub use socket::Socket;
pub use term::{Resource, Term};
pub use transport::{Capabilities, Feature, MemoryTransport, Transport, Version};

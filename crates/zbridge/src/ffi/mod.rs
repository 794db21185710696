//! Native library binding
//!
//! [`LibraryLoader`] finds libzmq on disk; [`NativeTransport`] resolves its
//! entry points and implements [`crate::transport::Transport`] over them.

pub mod loader;
pub mod native;

pub use loader::{LibraryLoader, LoadError};
pub use native::NativeTransport;

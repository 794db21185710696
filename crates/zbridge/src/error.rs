//! Bridge error taxonomy
//!
//! Would-block and cooperative interruption are not errors: they are reported
//! as [`crate::retry::CallOutcome`] values. Everything here is a hard failure
//! the host should surface as a structured error object.

use crate::codes::errno;
use crate::ffi::LoadError;
use thiserror::Error;
use zbridge_config::ConfigError;

/// Errors raised by bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Caller supplied an unrecognised name, selector or argument shape
    #[error("Invalid argument at position {position}: expected {expected}")]
    InvalidArgument { position: usize, expected: String },

    /// Operation attempted on a handle past its close
    #[error("{kind} is already closed")]
    AlreadyClosed { kind: &'static str },

    /// The native library reported an error
    #[error("Transport failure {}: {message}", symbolic_or_number(.code, .name))]
    TransportFailure {
        code: i32,
        name: Option<&'static str>,
        message: String,
    },

    /// The loaded library is too old (or too new) for the operation
    #[error("'{operation}' is not supported by the loaded library (requires version {required})")]
    Unsupported {
        operation: &'static str,
        required: String,
    },

    /// Host call with the wrong number of arguments
    #[error("Operation '{operation}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        operation: &'static str,
        expected: usize,
        got: usize,
    },

    /// Native library could not be resolved
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Bridge configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Build an `InvalidArgument` error
    pub fn invalid_argument(position: usize, expected: impl Into<String>) -> Self {
        BridgeError::InvalidArgument {
            position,
            expected: expected.into(),
        }
    }

    /// Build a `TransportFailure` from a native error code and its message
    pub fn transport(code: i32, message: impl Into<String>) -> Self {
        BridgeError::TransportFailure {
            code,
            name: error_name(code),
            message: message.into(),
        }
    }

    /// Native error code, if this is a transport failure
    pub fn code(&self) -> Option<i32> {
        match self {
            BridgeError::TransportFailure { code, .. } => Some(*code),
            _ => None,
        }
    }
}

fn symbolic_or_number(code: &i32, name: &Option<&'static str>) -> String {
    match name {
        Some(name) => name.to_string(),
        None => code.to_string(),
    }
}

const ERROR_NAMES: &[(i32, &str)] = &[
    (errno::EINVAL, "EINVAL"),
    (errno::ENOENT, "ENOENT"),
    (errno::EPROTONOSUPPORT, "EPROTONOSUPPORT"),
    (errno::ENOCOMPATPROTO, "ENOCOMPATPROTO"),
    (errno::EADDRINUSE, "EADDRINUSE"),
    (errno::EADDRNOTAVAIL, "EADDRNOTAVAIL"),
    (errno::ENODEV, "ENODEV"),
    (errno::ETERM, "ETERM"),
    (errno::ENOTSOCK, "ENOTSOCK"),
    (errno::EMTHREAD, "EMTHREAD"),
    (errno::EFAULT, "EFAULT"),
    (errno::EINTR, "EINTR"),
    (errno::ENOMEM, "ENOMEM"),
    (errno::EAGAIN, "EAGAIN"),
    (errno::ENOTSUP, "ENOTSUP"),
    (errno::EFSM, "EFSM"),
    (errno::EMFILE, "EMFILE"),
    (errno::ENOBUFS, "ENOBUFS"),
    (errno::ENETDOWN, "ENETDOWN"),
    (errno::ECONNREFUSED, "ECONNREFUSED"),
    (errno::EINPROGRESS, "EINPROGRESS"),
    (errno::EAFNOSUPPORT, "EAFNOSUPPORT"),
    (errno::EHOSTUNREACH, "EHOSTUNREACH"),
];

/// Symbolic name of a well-known native error code
pub fn error_name(code: i32) -> Option<&'static str> {
    ERROR_NAMES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}

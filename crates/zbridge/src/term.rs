//! Host term model
//!
//! The managed runtime hands the bridge dynamically typed terms. [`Term`]
//! covers the shapes the operation surface consumes and produces, plus the
//! three extension objects (contexts, sockets, messages).

use crate::context::Context;
use crate::error::{BridgeError, BridgeResult};
use crate::message::Message;
use crate::socket::Socket;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Host-visible extension object wrapping a bridge resource
///
/// Clones share the same object. Equality is identity.
pub struct Resource<T>(Arc<Mutex<T>>);

impl<T> Resource<T> {
    pub fn new(value: T) -> Self {
        Resource(Arc::new(Mutex::new(value)))
    }

    /// Lock the object; a panic in another holder does not poison it for us
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Resource(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for Resource<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: fmt::Debug> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Ok(inner) => fmt::Debug::fmt(&*inner, f),
            Err(_) => f.write_str("<locked>"),
        }
    }
}

/// A host runtime term
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Unit,
    Bool(bool),
    Int(i128),
    Atom(String),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Term>),
    Tuple(Vec<Term>),
    Record {
        label: String,
        fields: Vec<(String, Term)>,
    },
    Context(Resource<Context>),
    Socket(Resource<Socket>),
    Message(Resource<Message>),
}

impl Term {
    pub fn atom(name: impl Into<String>) -> Self {
        Term::Atom(name.into())
    }

    pub fn int(value: impl Into<i128>) -> Self {
        Term::Int(value.into())
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Term::Bytes(data.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        Term::String(text.into())
    }

    pub fn tuple(items: impl Into<Vec<Term>>) -> Self {
        Term::Tuple(items.into())
    }

    pub fn list(items: impl Into<Vec<Term>>) -> Self {
        Term::List(items.into())
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Term::Atom(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Term::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Term::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Field of a record term
    pub fn field(&self, name: &str) -> Option<&Term> {
        match self {
            Term::Record { fields, .. } => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Term::Unit => "unit",
            Term::Bool(_) => "bool",
            Term::Int(_) => "int",
            Term::Atom(_) => "atom",
            Term::String(_) => "string",
            Term::Bytes(_) => "bytes",
            Term::List(_) => "list",
            Term::Tuple(_) => "tuple",
            Term::Record { .. } => "record",
            Term::Context(_) => "context",
            Term::Socket(_) => "socket",
            Term::Message(_) => "message",
        }
    }
}

/// Positional argument decoding for one host call
///
/// Every accessor fails with `InvalidArgument` naming the expected shape.
/// Arity has already been checked by the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    terms: &'a [Term],
}

impl<'a> Args<'a> {
    pub fn new(terms: &'a [Term]) -> Self {
        Self { terms }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn term(&self, position: usize) -> BridgeResult<&'a Term> {
        self.terms
            .get(position)
            .ok_or_else(|| BridgeError::invalid_argument(position, "an argument"))
    }

    pub fn int(&self, position: usize) -> BridgeResult<i128> {
        self.term(position)?
            .as_int()
            .ok_or_else(|| BridgeError::invalid_argument(position, "an integer"))
    }

    pub fn i32(&self, position: usize) -> BridgeResult<i32> {
        i32::try_from(self.int(position)?)
            .map_err(|_| BridgeError::invalid_argument(position, "a 32-bit integer"))
    }

    pub fn i64(&self, position: usize) -> BridgeResult<i64> {
        i64::try_from(self.int(position)?)
            .map_err(|_| BridgeError::invalid_argument(position, "a 64-bit integer"))
    }

    pub fn size(&self, position: usize) -> BridgeResult<usize> {
        usize::try_from(self.int(position)?)
            .map_err(|_| BridgeError::invalid_argument(position, "a non-negative integer"))
    }

    pub fn atom(&self, position: usize) -> BridgeResult<&'a str> {
        self.term(position)?
            .as_atom()
            .ok_or_else(|| BridgeError::invalid_argument(position, "an atom"))
    }

    /// A virtual string: string, atom, or UTF-8 byte buffer
    pub fn text(&self, position: usize) -> BridgeResult<&'a str> {
        match self.term(position)? {
            Term::String(text) | Term::Atom(text) => Ok(text),
            Term::Bytes(data) => std::str::from_utf8(data)
                .map_err(|_| BridgeError::invalid_argument(position, "a UTF-8 string")),
            _ => Err(BridgeError::invalid_argument(position, "a string")),
        }
    }

    pub fn bytes(&self, position: usize) -> BridgeResult<&'a [u8]> {
        match self.term(position)? {
            Term::Bytes(data) => Ok(data),
            Term::String(text) => Ok(text.as_bytes()),
            _ => Err(BridgeError::invalid_argument(position, "a byte string")),
        }
    }

    pub fn list(&self, position: usize) -> BridgeResult<&'a [Term]> {
        match self.term(position)? {
            Term::List(items) => Ok(items),
            _ => Err(BridgeError::invalid_argument(position, "a list")),
        }
    }

    pub fn context(&self, position: usize) -> BridgeResult<&'a Resource<Context>> {
        match self.term(position)? {
            Term::Context(context) => Ok(context),
            _ => Err(BridgeError::invalid_argument(position, "a context")),
        }
    }

    pub fn socket(&self, position: usize) -> BridgeResult<&'a Resource<Socket>> {
        match self.term(position)? {
            Term::Socket(socket) => Ok(socket),
            _ => Err(BridgeError::invalid_argument(position, "a socket")),
        }
    }

    pub fn message(&self, position: usize) -> BridgeResult<&'a Resource<Message>> {
        match self.term(position)? {
            Term::Message(message) => Ok(message),
            _ => Err(BridgeError::invalid_argument(position, "a message")),
        }
    }
}

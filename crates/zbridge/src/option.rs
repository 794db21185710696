//! Runtime-typed option codec
//!
//! The caller always says how an option's bytes are to be read: one of the
//! fixed-width primitives (`int`, `int64`, `uint64`, `uint32`) or a byte
//! buffer of a given capacity. The codec never guesses the type from the
//! bytes it gets back.

use crate::error::{BridgeError, BridgeResult};
use crate::retry::CallOutcome;
use crate::session::Session;
use crate::tables::{OptionDescriptor, OptionDomain};
use crate::term::Term;
use crate::transport::RawDescriptor;

const SELECTOR_EXPECTED: &str = "an integer or the atom 'int', 'int64', 'uint64' or 'uint32'";

/// A decoded option value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Bytes(Vec<u8>),
}

impl OptionValue {
    pub fn to_term(&self) -> Term {
        match self {
            OptionValue::Int32(value) => Term::int(*value),
            OptionValue::Int64(value) => Term::int(*value),
            OptionValue::UInt64(value) => Term::int(*value),
            OptionValue::Bytes(data) => Term::bytes(data.clone()),
        }
    }

    /// Decode a host value with the encoding chosen by `selector`
    pub fn from_term(selector: TypeSelector, term: &Term, position: usize) -> BridgeResult<Self> {
        match selector {
            TypeSelector::Primitive(primitive) => term
                .as_int()
                .and_then(|value| primitive.narrow(value))
                .ok_or_else(|| {
                    BridgeError::invalid_argument(
                        position,
                        format!("an integer in the range of '{}'", primitive.name()),
                    )
                }),
            TypeSelector::Buffer(_) => match term {
                Term::Bytes(data) => Ok(OptionValue::Bytes(data.clone())),
                Term::String(text) => Ok(OptionValue::Bytes(text.as_bytes().to_vec())),
                _ => Err(BridgeError::invalid_argument(position, "a byte string")),
            },
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            OptionValue::Int32(value) => Some(i128::from(*value)),
            OptionValue::Int64(value) => Some(i128::from(*value)),
            OptionValue::UInt64(value) => Some(i128::from(*value)),
            OptionValue::Bytes(_) => None,
        }
    }
}

/// The closed set of fixed-width option encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int,
    Int64,
    UInt64,
    UInt32,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Primitive::Int),
            "int64" => Some(Primitive::Int64),
            "uint64" => Some(Primitive::UInt64),
            "uint32" => Some(Primitive::UInt32),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Int64 => "int64",
            Primitive::UInt64 => "uint64",
            Primitive::UInt32 => "uint32",
        }
    }

    pub fn width(self) -> usize {
        match self {
            Primitive::Int => i32::WIDTH,
            Primitive::Int64 => i64::WIDTH,
            Primitive::UInt64 => u64::WIDTH,
            Primitive::UInt32 => u32::WIDTH,
        }
    }

    /// Decode the bytes the library reported, zero-filling a short read
    pub fn decode(self, bytes: &[u8]) -> OptionValue {
        match self {
            Primitive::Int => OptionValue::Int32(read_fixed(bytes)),
            Primitive::Int64 => OptionValue::Int64(read_fixed(bytes)),
            Primitive::UInt64 => OptionValue::UInt64(read_fixed(bytes)),
            Primitive::UInt32 => OptionValue::UInt64(u64::from(read_fixed::<u32>(bytes))),
        }
    }

    /// Encode a value at this primitive's width, if it fits
    pub fn encode(self, value: &OptionValue) -> Option<Vec<u8>> {
        let value = value.as_i128()?;
        match self {
            Primitive::Int => write_fixed::<i32>(value),
            Primitive::Int64 => write_fixed::<i64>(value),
            Primitive::UInt64 => write_fixed::<u64>(value),
            Primitive::UInt32 => write_fixed::<u32>(value),
        }
    }

    fn narrow(self, value: i128) -> Option<OptionValue> {
        match self {
            Primitive::Int => i32::try_from(value).ok().map(OptionValue::Int32),
            Primitive::Int64 => i64::try_from(value).ok().map(OptionValue::Int64),
            Primitive::UInt64 => u64::try_from(value).ok().map(OptionValue::UInt64),
            Primitive::UInt32 => u32::try_from(value)
                .ok()
                .map(|value| OptionValue::UInt64(u64::from(value))),
        }
    }
}

trait FixedWidth: Copy + TryFrom<i128> {
    const WIDTH: usize;

    fn from_ne(bytes: &[u8]) -> Self;

    fn to_ne(self) -> Vec<u8>;
}

impl FixedWidth for i32 {
    const WIDTH: usize = 4;

    fn from_ne(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        i32::from_ne_bytes(raw)
    }

    fn to_ne(self) -> Vec<u8> {
        self.to_ne_bytes().to_vec()
    }
}

impl FixedWidth for u32 {
    const WIDTH: usize = 4;

    fn from_ne(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        u32::from_ne_bytes(raw)
    }

    fn to_ne(self) -> Vec<u8> {
        self.to_ne_bytes().to_vec()
    }
}

impl FixedWidth for i64 {
    const WIDTH: usize = 8;

    fn from_ne(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        i64::from_ne_bytes(raw)
    }

    fn to_ne(self) -> Vec<u8> {
        self.to_ne_bytes().to_vec()
    }
}

impl FixedWidth for u64 {
    const WIDTH: usize = 8;

    fn from_ne(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        u64::from_ne_bytes(raw)
    }

    fn to_ne(self) -> Vec<u8> {
        self.to_ne_bytes().to_vec()
    }
}

fn read_fixed<T: FixedWidth>(bytes: &[u8]) -> T {
    let mut padded = vec![0u8; T::WIDTH];
    let len = bytes.len().min(T::WIDTH);
    padded[..len].copy_from_slice(&bytes[..len]);
    T::from_ne(&padded)
}

fn write_fixed<T: FixedWidth>(value: i128) -> Option<Vec<u8>> {
    T::try_from(value).ok().map(T::to_ne)
}

/// How the caller wants an option's bytes interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSelector {
    Primitive(Primitive),
    /// Byte buffer of at most this many bytes
    Buffer(usize),
}

impl TypeSelector {
    pub fn from_term(term: &Term, position: usize) -> BridgeResult<Self> {
        match term {
            Term::Atom(name) => Primitive::from_name(name).map(TypeSelector::Primitive),
            Term::Int(capacity) => usize::try_from(*capacity).ok().map(TypeSelector::Buffer),
            _ => None,
        }
        .ok_or_else(|| BridgeError::invalid_argument(position, SELECTOR_EXPECTED))
    }

    fn capacity(self) -> usize {
        match self {
            TypeSelector::Primitive(primitive) => primitive.width(),
            TypeSelector::Buffer(capacity) => capacity,
        }
    }

    fn decode(self, bytes: &[u8]) -> OptionValue {
        match self {
            TypeSelector::Primitive(primitive) => primitive.decode(bytes),
            TypeSelector::Buffer(_) => OptionValue::Bytes(bytes.to_vec()),
        }
    }
}

/// Socket option get/set through the retry protocol
pub struct OptionCodec<'a> {
    session: &'a Session,
}

impl<'a> OptionCodec<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Read an option; the result is decoded from the length the library
    /// reports, not the buffer size
    pub fn get(
        &self,
        socket: RawDescriptor,
        descriptor: &OptionDescriptor,
        selector: TypeSelector,
    ) -> BridgeResult<CallOutcome<OptionValue>> {
        check_domain(descriptor)?;
        let transport = self.session.transport();
        let mut buf = vec![0u8; selector.capacity()];
        let outcome = self
            .session
            .retry()
            .invoke(|| transport.get_option(socket, descriptor.id, &mut buf))
            .into_outcome()?;
        Ok(outcome.map(|len| selector.decode(&buf[..len.min(buf.len())])))
    }

    /// Write an option encoded as `selector` says
    pub fn set(
        &self,
        socket: RawDescriptor,
        descriptor: &OptionDescriptor,
        selector: TypeSelector,
        value: &OptionValue,
    ) -> BridgeResult<CallOutcome<()>> {
        check_domain(descriptor)?;
        let bytes = match (selector, value) {
            (TypeSelector::Buffer(_), OptionValue::Bytes(data)) => data.clone(),
            (TypeSelector::Buffer(_), _) => {
                return Err(BridgeError::invalid_argument(3, "a byte string"));
            }
            (TypeSelector::Primitive(primitive), value) => {
                primitive.encode(value).ok_or_else(|| {
                    BridgeError::invalid_argument(
                        3,
                        format!("an integer in the range of '{}'", primitive.name()),
                    )
                })?
            }
        };
        let transport = self.session.transport();
        self.session
            .retry()
            .invoke(|| transport.set_option(socket, descriptor.id, &bytes))
            .into_outcome()
    }
}

fn check_domain(descriptor: &OptionDescriptor) -> BridgeResult<()> {
    if descriptor.domain == OptionDomain::Socket {
        Ok(())
    } else {
        Err(BridgeError::invalid_argument(1, OptionDomain::Socket.family()))
    }
}

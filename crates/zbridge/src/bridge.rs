//! Host-facing operation surface
//!
//! The host calls operations by name with a slice of [`Term`] arguments.
//! [`Bridge::call`] checks arity, decodes arguments positionally (positions
//! are zero-based) and encodes results back into terms:
//!
//! - operations with no output return [`Term::Unit`]
//! - operations with several outputs return a [`Term::Tuple`]
//! - would-block and cooperative interruption come back as values, never as
//!   errors
//!
//! ```
//! use zbridge::{Bridge, Session, Term};
//! use zbridge::transport::MemoryTransport;
//! use std::sync::Arc;
//!
//! let bridge = Bridge::new(Session::new(Arc::new(MemoryTransport::new())));
//! let ctx = bridge.call_named("ctxNew", &[Term::int(1)]).unwrap();
//! let socket = bridge.call_named("socket", &[ctx, Term::atom("pair")]).unwrap();
//! assert!(matches!(socket, Term::Socket(_)));
//! ```

use crate::context::Context;
use crate::device::run_device;
use crate::error::{BridgeError, BridgeResult};
use crate::ffi::{LibraryLoader, NativeTransport};
use crate::message::Message;
use crate::option::{OptionValue, TypeSelector};
use crate::poll::{PollItem, PollMultiplexer};
use crate::retry::{CallOutcome, Timeout};
use crate::session::Session;
use crate::tables::{self, OptionDomain, POLL_EVENTS, SEND_RECV_FLAGS};
use crate::term::{Args, Resource, Term};
use crate::transport::{MemoryTransport, Transport};
use std::sync::Arc;
use zbridge_config::BridgeConfig;

/// Every operation the bridge exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Version,
    CtxNew,
    CtxDestroy,
    CtxGet,
    CtxSet,
    Socket,
    Close,
    GetSockOpt,
    SetSockOpt,
    Bind,
    Connect,
    Unbind,
    Disconnect,
    MsgCreate,
    MsgCreateWithData,
    MsgInit,
    MsgInitSize,
    MsgClose,
    MsgSize,
    MsgData,
    MsgSetData,
    MsgMove,
    MsgCopy,
    MsgGet,
    MsgSet,
    MsgSend,
    MsgRecv,
    Poll,
    Device,
}

impl Operation {
    pub const ALL: [Operation; 29] = [
        Operation::Version,
        Operation::CtxNew,
        Operation::CtxDestroy,
        Operation::CtxGet,
        Operation::CtxSet,
        Operation::Socket,
        Operation::Close,
        Operation::GetSockOpt,
        Operation::SetSockOpt,
        Operation::Bind,
        Operation::Connect,
        Operation::Unbind,
        Operation::Disconnect,
        Operation::MsgCreate,
        Operation::MsgCreateWithData,
        Operation::MsgInit,
        Operation::MsgInitSize,
        Operation::MsgClose,
        Operation::MsgSize,
        Operation::MsgData,
        Operation::MsgSetData,
        Operation::MsgMove,
        Operation::MsgCopy,
        Operation::MsgGet,
        Operation::MsgSet,
        Operation::MsgSend,
        Operation::MsgRecv,
        Operation::Poll,
        Operation::Device,
    ];

    /// Host-visible name
    pub fn name(self) -> &'static str {
        match self {
            Operation::Version => "version",
            Operation::CtxNew => "ctxNew",
            Operation::CtxDestroy => "ctxDestroy",
            Operation::CtxGet => "ctxGet",
            Operation::CtxSet => "ctxSet",
            Operation::Socket => "socket",
            Operation::Close => "close",
            Operation::GetSockOpt => "getsockopt",
            Operation::SetSockOpt => "setsockopt",
            Operation::Bind => "bind",
            Operation::Connect => "connect",
            Operation::Unbind => "unbind",
            Operation::Disconnect => "disconnect",
            Operation::MsgCreate => "msgCreate",
            Operation::MsgCreateWithData => "msgCreateWithData",
            Operation::MsgInit => "msgInit",
            Operation::MsgInitSize => "msgInitSize",
            Operation::MsgClose => "msgClose",
            Operation::MsgSize => "msgSize",
            Operation::MsgData => "msgData",
            Operation::MsgSetData => "msgSetData",
            Operation::MsgMove => "msgMove",
            Operation::MsgCopy => "msgCopy",
            Operation::MsgGet => "msgGet",
            Operation::MsgSet => "msgSet",
            Operation::MsgSend => "msgSend",
            Operation::MsgRecv => "msgRecv",
            Operation::Poll => "poll",
            Operation::Device => "device",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Number of arguments the operation takes
    pub fn arity(self) -> usize {
        match self {
            Operation::Version | Operation::MsgCreate => 0,
            Operation::CtxNew
            | Operation::CtxDestroy
            | Operation::Close
            | Operation::MsgCreateWithData
            | Operation::MsgInit
            | Operation::MsgClose
            | Operation::MsgSize
            | Operation::MsgData => 1,
            Operation::CtxGet
            | Operation::Socket
            | Operation::Bind
            | Operation::Connect
            | Operation::Unbind
            | Operation::Disconnect
            | Operation::MsgInitSize
            | Operation::MsgSetData
            | Operation::MsgMove
            | Operation::MsgCopy
            | Operation::MsgGet
            | Operation::Poll => 2,
            Operation::CtxSet
            | Operation::GetSockOpt
            | Operation::MsgSet
            | Operation::MsgSend
            | Operation::MsgRecv
            | Operation::Device => 3,
            Operation::SetSockOpt => 4,
        }
    }
}

/// Build the transport a configuration asks for
pub fn transport_from_config(config: &BridgeConfig) -> BridgeResult<Arc<dyn Transport>> {
    config.validate()?;
    match config.backend() {
        "memory" => Ok(Arc::new(MemoryTransport::new())),
        _ => {
            let loader = LibraryLoader::with_search_paths(config.search_paths());
            // The configured library is trusted to be libzmq
            let native = unsafe { NativeTransport::load(&loader, config.library())? };
            Ok(Arc::new(native))
        }
    }
}

/// The bridge as the host sees it
#[derive(Debug, Clone)]
pub struct Bridge {
    session: Arc<Session>,
    default_io_threads: i32,
}

impl Bridge {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            default_io_threads: 1,
        }
    }

    /// A bridge over the configured backend, without a cooperative signal
    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let transport = transport_from_config(config)?;
        Ok(Self {
            session: Session::new(transport),
            default_io_threads: config.io_threads(),
        })
    }

    /// I/O thread count used when `ctxNew` gets `Unit`
    pub fn with_default_io_threads(mut self, io_threads: i32) -> Self {
        self.default_io_threads = io_threads;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Invoke an operation by host name
    pub fn call_named(&self, name: &str, args: &[Term]) -> BridgeResult<Term> {
        let op = Operation::from_name(name)
            .ok_or_else(|| BridgeError::invalid_argument(0, "a bridge operation"))?;
        self.call(op, args)
    }

    pub fn call(&self, op: Operation, args: &[Term]) -> BridgeResult<Term> {
        if args.len() != op.arity() {
            return Err(BridgeError::ArityMismatch {
                operation: op.name(),
                expected: op.arity(),
                got: args.len(),
            });
        }
        tracing::debug!(operation = op.name(), "bridge call");
        let args = Args::new(args);

        match op {
            Operation::Version => Ok(self.version()),
            Operation::CtxNew => self.ctx_new(args),
            Operation::CtxDestroy => {
                let interrupted = args.context(0)?.lock().destroy()?;
                Ok(Term::Bool(interrupted))
            }
            Operation::CtxGet => {
                let option = self.option(OptionDomain::Context, args, 1)?;
                let value = args.context(0)?.lock().get(option)?;
                Ok(Term::int(value))
            }
            Operation::CtxSet => {
                let option = self.option(OptionDomain::Context, args, 1)?;
                let value = args.i32(2)?;
                args.context(0)?.lock().set(option, value)?;
                Ok(Term::Unit)
            }
            Operation::Socket => {
                let kind = tables::resolve_socket_type(args.atom(1)?, 1)?;
                let socket = args.context(0)?.lock().socket(kind)?;
                Ok(Term::Socket(Resource::new(socket)))
            }
            Operation::Close => {
                args.socket(0)?.lock().close()?;
                Ok(Term::Unit)
            }
            Operation::GetSockOpt => self.getsockopt(args),
            Operation::SetSockOpt => self.setsockopt(args),
            Operation::Bind => {
                args.socket(0)?.lock().bind(args.text(1)?)?;
                Ok(Term::Unit)
            }
            Operation::Connect => {
                args.socket(0)?.lock().connect(args.text(1)?)?;
                Ok(Term::Unit)
            }
            Operation::Unbind => {
                args.socket(0)?.lock().unbind(args.text(1)?)?;
                Ok(Term::Unit)
            }
            Operation::Disconnect => {
                args.socket(0)?.lock().disconnect(args.text(1)?)?;
                Ok(Term::Unit)
            }
            Operation::MsgCreate => Ok(message_term(Message::new(Arc::clone(&self.session)))),
            Operation::MsgCreateWithData => {
                let message = Message::with_data(Arc::clone(&self.session), args.bytes(0)?)?;
                Ok(message_term(message))
            }
            Operation::MsgInit => {
                args.message(0)?.lock().init()?;
                Ok(Term::Unit)
            }
            Operation::MsgInitSize => {
                let size = args.size(1)?;
                args.message(0)?.lock().init_with_size(size)?;
                Ok(Term::Unit)
            }
            Operation::MsgClose => {
                args.message(0)?.lock().close()?;
                Ok(Term::Unit)
            }
            Operation::MsgSize => {
                let size = args.message(0)?.lock().size()?;
                Ok(Term::int(size as u64))
            }
            Operation::MsgData => Ok(Term::bytes(args.message(0)?.lock().data()?)),
            Operation::MsgSetData => {
                let data = args.bytes(1)?;
                args.message(0)?.lock().set_data(data)?;
                Ok(Term::Unit)
            }
            Operation::MsgMove => self.transfer(args, true),
            Operation::MsgCopy => self.transfer(args, false),
            Operation::MsgGet => {
                let option = self.option(OptionDomain::Message, args, 1)?;
                let value = args.message(0)?.lock().get(option)?;
                Ok(Term::int(value))
            }
            Operation::MsgSet => {
                let option = self.option(OptionDomain::Message, args, 1)?;
                let value = args.i32(2)?;
                args.message(0)?.lock().set(option, value)?;
                Ok(Term::Unit)
            }
            Operation::MsgSend => self.message_io(args, true),
            Operation::MsgRecv => self.message_io(args, false),
            Operation::Poll => self.poll(args),
            Operation::Device => self.device(args),
        }
    }

    fn version(&self) -> Term {
        let version = self.session.capabilities().version();
        Term::Record {
            label: "version".to_string(),
            fields: vec![
                ("major".to_string(), Term::int(version.major)),
                ("minor".to_string(), Term::int(version.minor)),
                ("patch".to_string(), Term::int(version.patch)),
            ],
        }
    }

    fn ctx_new(&self, args: Args<'_>) -> BridgeResult<Term> {
        let io_threads = match args.term(0)? {
            Term::Unit => self.default_io_threads,
            _ => args.i32(0)?,
        };
        let context = Context::new(Arc::clone(&self.session), io_threads)?;
        Ok(Term::Context(Resource::new(context)))
    }

    fn option(
        &self,
        domain: OptionDomain,
        args: Args<'_>,
        position: usize,
    ) -> BridgeResult<&'static tables::OptionDescriptor> {
        let version = self.session.capabilities().version();
        tables::resolve_option(domain, args.atom(position)?, version, position)
    }

    fn getsockopt(&self, args: Args<'_>) -> BridgeResult<Term> {
        let option = self.option(OptionDomain::Socket, args, 1)?;
        let selector = TypeSelector::from_term(args.term(2)?, 2)?;
        let outcome = args.socket(0)?.lock().get_option(option, selector)?;
        Ok(match outcome {
            CallOutcome::Completed(value) => value.to_term(),
            CallOutcome::WouldBlock | CallOutcome::Interrupted(_) => Term::Unit,
        })
    }

    fn setsockopt(&self, args: Args<'_>) -> BridgeResult<Term> {
        let option = self.option(OptionDomain::Socket, args, 1)?;
        let selector = TypeSelector::from_term(args.term(2)?, 2)?;
        let value = OptionValue::from_term(selector, args.term(3)?, 3)?;
        let outcome = args.socket(0)?.lock().set_option(option, selector, &value)?;
        // `true` means the option was not applied
        Ok(Term::Bool(!outcome.is_completed()))
    }

    fn transfer(&self, args: Args<'_>, consume: bool) -> BridgeResult<Term> {
        let dest = args.message(0)?;
        let src = args.message(1)?;
        if dest.ptr_eq(src) {
            // Same cell: moving or copying onto itself changes nothing
            src.lock().raw()?;
            return Ok(Term::Unit);
        }
        let mut dest = dest.lock();
        let mut src = src.lock();
        if consume {
            dest.move_from(&mut src)?;
        } else {
            dest.copy_from(&src)?;
        }
        Ok(Term::Unit)
    }

    fn message_io(&self, args: Args<'_>, send: bool) -> BridgeResult<Term> {
        let flags = SEND_RECV_FLAGS.parse(args.term(2)?, 2)?;
        let socket = args.socket(1)?.lock();
        let mut message = args.message(0)?.lock();
        let outcome = if send {
            message.send(&socket, flags)?
        } else {
            message.recv(&socket, flags)?
        };
        Ok(Term::tuple([
            Term::Bool(outcome.is_completed()),
            Term::Bool(outcome.is_interrupted()),
        ]))
    }

    fn poll(&self, args: Args<'_>) -> BridgeResult<Term> {
        const ITEM_SHAPE: &str = "a list of (socket, events, payload) tuples";

        let timeout = Timeout::from_millis(args.i64(1)?);
        let mut items = Vec::new();
        for entry in args.list(0)? {
            let (socket, events, payload) = match entry {
                Term::Tuple(parts) => match parts.as_slice() {
                    [Term::Socket(socket), events, payload] => (socket, events, payload),
                    _ => return Err(BridgeError::invalid_argument(0, ITEM_SHAPE)),
                },
                _ => return Err(BridgeError::invalid_argument(0, ITEM_SHAPE)),
            };
            let events = POLL_EVENTS.parse(events, 0)?;
            items.push(PollItem::new(&socket.lock(), events, payload.clone())?);
        }

        let report = PollMultiplexer::new(&self.session).poll(items, timeout)?;
        let ready = report
            .ready
            .into_iter()
            .map(|(fired, payload)| {
                let names = POLL_EVENTS.names(fired).into_iter().map(Term::atom).collect::<Vec<_>>();
                Term::tuple([Term::list(names), payload])
            })
            .collect::<Vec<_>>();
        let remaining = match report.remaining {
            Some(remaining) => Term::int(remaining.as_millis()),
            None => Term::Unit,
        };
        Ok(Term::tuple([Term::Bool(report.any_ready), Term::list(ready), remaining]))
    }

    fn device(&self, args: Args<'_>) -> BridgeResult<Term> {
        let kind = tables::resolve_device_type(args.atom(0)?, 0)?;
        let frontend = args.socket(1)?;
        let backend = args.socket(2)?;
        let interrupted = if frontend.ptr_eq(backend) {
            let socket = frontend.lock();
            run_device(kind, &socket, &socket)?
        } else {
            run_device(kind, &frontend.lock(), &backend.lock())?
        };
        Ok(Term::Bool(interrupted))
    }
}

fn message_term(message: Message) -> Term {
    Term::Message(Resource::new(message))
}

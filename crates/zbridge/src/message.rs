//! Native messages
//!
//! A [`Message`] starts uninitialised. `init` or `init_with_size` gives it
//! native storage; `close` releases it. Messages are the only resource that
//! can be duplicated.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::{MessageResource, ResourceHandle};
use crate::retry::CallOutcome;
use crate::session::Session;
use crate::socket::Socket;
use crate::tables::{OptionDescriptor, OptionDomain};
use crate::transport::{Feature, RawDescriptor, RawResult};
use std::sync::Arc;

#[derive(Debug)]
pub struct Message {
    session: Arc<Session>,
    handle: Option<ResourceHandle<MessageResource>>,
}

impl Message {
    /// An uninitialised message; every operation but `init*` and `close`
    /// reports `AlreadyClosed` until it is initialised
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            handle: None,
        }
    }

    /// An initialised message holding a copy of `data`
    pub fn with_data(session: Arc<Session>, data: &[u8]) -> BridgeResult<Self> {
        let mut message = Self::new(session);
        message.init_with_size(data.len())?;
        message.set_data(data)?;
        Ok(message)
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| handle.is_open())
    }

    pub fn raw(&self) -> BridgeResult<RawDescriptor> {
        match &self.handle {
            Some(handle) => handle.get(),
            None => Err(BridgeError::AlreadyClosed {
                kind: "Message",
            }),
        }
    }

    /// (Re)initialise as an empty message, releasing any previous content
    pub fn init(&mut self) -> BridgeResult<()> {
        let created = self.session.transport().message_init(None);
        self.replace(created)
    }

    /// (Re)initialise with `size` bytes of storage
    pub fn init_with_size(&mut self, size: usize) -> BridgeResult<()> {
        let created = self.session.transport().message_init(Some(size));
        self.replace(created)
    }

    fn replace(&mut self, created: RawResult<RawDescriptor>) -> BridgeResult<()> {
        let fresh = ResourceHandle::acquire(Arc::clone(&self.session), created)?;
        match self.handle.replace(fresh) {
            Some(mut previous) => previous.close(),
            None => Ok(()),
        }
    }

    pub fn close(&mut self) -> BridgeResult<()> {
        match &mut self.handle {
            Some(handle) => handle.close(),
            None => Ok(()),
        }
    }

    pub fn size(&self) -> BridgeResult<usize> {
        let raw = self.raw()?;
        Ok(self.session.transport().message_size(raw))
    }

    pub fn data(&self) -> BridgeResult<Vec<u8>> {
        let raw = self.raw()?;
        Ok(self.session.transport().message_data(raw))
    }

    /// Overwrite the content; `data` must be exactly the current size
    pub fn set_data(&mut self, data: &[u8]) -> BridgeResult<()> {
        let raw = self.raw()?;
        let size = self.session.transport().message_size(raw);
        if data.len() != size {
            return Err(BridgeError::invalid_argument(
                1,
                format!("a byte string of the message size ({size} bytes)"),
            ));
        }
        self.session.transport().message_write(raw, data);
        Ok(())
    }

    /// Move the content of `src` into this message, leaving `src` empty
    pub fn move_from(&mut self, src: &mut Message) -> BridgeResult<()> {
        let dest = self.raw()?;
        let src = src.raw()?;
        self.session
            .transport()
            .message_move(dest, src)
            .map_err(|code| self.session.failure(code))
    }

    /// Copy the content of `src` into this message
    pub fn copy_from(&mut self, src: &Message) -> BridgeResult<()> {
        let dest = self.raw()?;
        let src = src.raw()?;
        self.session
            .transport()
            .message_copy(dest, src)
            .map_err(|code| self.session.failure(code))
    }

    /// A new, independently owned message with the same content
    pub fn duplicate(&self) -> BridgeResult<Message> {
        let handle = match &self.handle {
            Some(handle) => handle.duplicate()?,
            None => {
                return Err(BridgeError::AlreadyClosed {
                    kind: "Message",
                })
            }
        };
        Ok(Message {
            session: Arc::clone(&self.session),
            handle: Some(handle),
        })
    }

    pub fn get(&self, option: &OptionDescriptor) -> BridgeResult<i32> {
        self.session.require(Feature::MessageGet, "msgGet")?;
        check_domain(option)?;
        let raw = self.raw()?;
        self.session
            .transport()
            .message_get(raw, option.id)
            .map_err(|code| self.session.failure(code))
    }

    pub fn set(&self, option: &OptionDescriptor, value: i32) -> BridgeResult<()> {
        self.session.require(Feature::MessageSet, "msgSet")?;
        check_domain(option)?;
        let raw = self.raw()?;
        self.session
            .transport()
            .message_set(raw, option.id, value)
            .map_err(|code| self.session.failure(code))
    }

    /// Queue this message on `socket`; the content is consumed on success
    pub fn send(&mut self, socket: &Socket, flags: u32) -> BridgeResult<CallOutcome<usize>> {
        let message = self.raw()?;
        let socket = socket.raw()?;
        let transport = self.session.transport();
        self.session
            .retry()
            .invoke(|| transport.send(message, socket, flags))
            .into_outcome()
    }

    /// Receive the next message from `socket` into this one
    pub fn recv(&mut self, socket: &Socket, flags: u32) -> BridgeResult<CallOutcome<usize>> {
        let message = self.raw()?;
        let socket = socket.raw()?;
        let transport = self.session.transport();
        self.session
            .retry()
            .invoke(|| transport.recv(message, socket, flags))
            .into_outcome()
    }
}

fn check_domain(option: &OptionDescriptor) -> BridgeResult<()> {
    if option.domain == OptionDomain::Message {
        Ok(())
    } else {
        Err(BridgeError::invalid_argument(1, OptionDomain::Message.family()))
    }
}

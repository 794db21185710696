//! Message sockets

use crate::context::Context;
use crate::error::BridgeResult;
use crate::handle::{ResourceHandle, SocketResource};
use crate::option::{OptionCodec, OptionValue, TypeSelector};
use crate::retry::CallOutcome;
use crate::session::Session;
use crate::tables::OptionDescriptor;
use crate::transport::{EndpointOp, Feature, RawDescriptor};
use std::sync::Arc;

/// A native socket owned by one host object
#[derive(Debug)]
pub struct Socket {
    handle: ResourceHandle<SocketResource>,
    kind: i32,
}

impl Socket {
    /// Open a socket of native type `kind` in `context`
    pub fn new(context: &Context, kind: i32) -> BridgeResult<Self> {
        let raw_context = context.raw()?;
        let session = Arc::clone(context.session());
        let created = session.transport().socket_new(raw_context, kind);
        Ok(Self {
            handle: ResourceHandle::acquire(session, created)?,
            kind,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        self.handle.session()
    }

    pub fn raw(&self) -> BridgeResult<RawDescriptor> {
        self.handle.get()
    }

    /// Native socket type id
    pub fn kind(&self) -> i32 {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    pub fn close(&mut self) -> BridgeResult<()> {
        self.handle.close()
    }

    pub fn get_option(
        &self,
        option: &OptionDescriptor,
        selector: TypeSelector,
    ) -> BridgeResult<CallOutcome<OptionValue>> {
        let raw = self.raw()?;
        OptionCodec::new(self.session()).get(raw, option, selector)
    }

    pub fn set_option(
        &self,
        option: &OptionDescriptor,
        selector: TypeSelector,
        value: &OptionValue,
    ) -> BridgeResult<CallOutcome<()>> {
        let raw = self.raw()?;
        OptionCodec::new(self.session()).set(raw, option, selector, value)
    }

    pub fn bind(&self, address: &str) -> BridgeResult<()> {
        self.endpoint(EndpointOp::Bind, address)
    }

    pub fn connect(&self, address: &str) -> BridgeResult<()> {
        self.endpoint(EndpointOp::Connect, address)
    }

    pub fn unbind(&self, address: &str) -> BridgeResult<()> {
        self.session().require(Feature::Unbind, "unbind")?;
        self.endpoint(EndpointOp::Unbind, address)
    }

    pub fn disconnect(&self, address: &str) -> BridgeResult<()> {
        self.session().require(Feature::Disconnect, "disconnect")?;
        self.endpoint(EndpointOp::Disconnect, address)
    }

    fn endpoint(&self, op: EndpointOp, address: &str) -> BridgeResult<()> {
        let raw = self.raw()?;
        tracing::debug!(op = op.name(), %address, "socket endpoint");
        self.session()
            .transport()
            .endpoint(raw, op, address)
            .map_err(|code| self.session().failure(code))
    }
}

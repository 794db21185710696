//! Device command - forward messages between two bound sockets

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use zbridge::codes::{device, socket_type};
use zbridge::option::{OptionValue, TypeSelector};
use zbridge::tables::{self, OptionDomain};
use zbridge::{transport_from_config, Session, Socket};
use zbridge_config::BridgeConfig;

/// Socket types bound on each side of a device
fn socket_pair(kind: i32) -> (i32, i32) {
    match kind {
        device::QUEUE => (socket_type::ROUTER, socket_type::DEALER),
        device::FORWARDER => (socket_type::SUB, socket_type::PUB),
        _ => (socket_type::PULL, socket_type::PUSH),
    }
}

pub fn run(config: &BridgeConfig, kind: &str, frontend: &str, backend: &str) -> Result<()> {
    let device_kind = tables::resolve_device_type(kind, 0)
        .with_context(|| format!("Unknown device type '{}'", kind))?;

    let transport = transport_from_config(config).context("Failed to open the messaging library")?;
    let session = Session::new(transport);
    let context = zbridge::Context::new(Arc::clone(&session), config.io_threads())?;

    let (front_type, back_type) = socket_pair(device_kind);
    let front = context.socket(front_type)?;
    let back = context.socket(back_type)?;

    if front_type == socket_type::SUB {
        subscribe_all(&session, &front)?;
    }

    front
        .bind(frontend)
        .with_context(|| format!("Failed to bind frontend {}", frontend))?;
    back.bind(backend)
        .with_context(|| format!("Failed to bind backend {}", backend))?;

    tracing::info!(device = kind, %frontend, %backend, "device running");
    if zbridge::device::run_device(device_kind, &front, &back)? {
        bail!("Device interrupted");
    }
    Ok(())
}

/// Subscribe a forwarder frontend to every topic
fn subscribe_all(session: &Session, socket: &Socket) -> Result<()> {
    let version = session.capabilities().version();
    let subscribe = tables::resolve_option(OptionDomain::Socket, "subscribe", version, 1)?;
    let outcome =
        socket.set_option(subscribe, TypeSelector::Buffer(0), &OptionValue::Bytes(Vec::new()))?;
    if !outcome.is_completed() {
        bail!("Failed to subscribe the forwarder frontend");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbridge::{MemoryTransport, SignalFlag};

    fn sub_socket(
        transport: Arc<MemoryTransport>,
        signal: SignalFlag,
    ) -> (Arc<Session>, zbridge::Context, Socket) {
        let session = Session::builder(transport).signal(Arc::new(signal)).build();
        let context = zbridge::Context::new(Arc::clone(&session), 1).unwrap();
        let socket = context.socket(socket_type::SUB).unwrap();
        (session, context, socket)
    }

    #[test]
    fn test_subscribe_all() {
        let (session, _context, socket) =
            sub_socket(Arc::new(MemoryTransport::new()), SignalFlag::new());
        assert!(subscribe_all(&session, &socket).is_ok());
    }

    #[test]
    fn test_interrupted_subscription_is_an_error() {
        let transport = Arc::new(MemoryTransport::new());
        let signal = SignalFlag::new();
        let (session, _context, socket) = sub_socket(Arc::clone(&transport), signal.clone());

        transport.interrupt_next(1);
        signal.raise();
        let err = subscribe_all(&session, &socket).unwrap_err();
        assert!(err.to_string().contains("Failed to subscribe"));
    }

    #[test]
    fn test_socket_pairs() {
        assert_eq!(socket_pair(device::QUEUE), (socket_type::ROUTER, socket_type::DEALER));
        assert_eq!(socket_pair(device::FORWARDER), (socket_type::SUB, socket_type::PUB));
        assert_eq!(socket_pair(device::STREAMER), (socket_type::PULL, socket_type::PUSH));
    }
}

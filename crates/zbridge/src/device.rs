//! Built-in forwarding devices

use crate::error::BridgeResult;
use crate::retry::CallOutcome;
use crate::socket::Socket;
use crate::transport::Feature;

/// Run the native device loop between two sockets
///
/// Blocks until the library stops the device (typically with `ETERM`, which
/// is returned as a transport failure) or a pending cooperative signal
/// interrupts it, in which case this returns `true`.
pub fn run_device(kind: i32, frontend: &Socket, backend: &Socket) -> BridgeResult<bool> {
    let session = frontend.session();
    session.require(Feature::Device, "device")?;
    let front = frontend.raw()?;
    let back = backend.raw()?;
    let transport = session.transport();

    tracing::info!(kind, "starting device");
    let outcome = session
        .retry()
        .invoke(|| transport.device(kind, front, back))
        .into_outcome()?;
    Ok(matches!(outcome, CallOutcome::Interrupted(_)))
}

//! Multiplexed readiness polling
//!
//! Results come back in input order so payloads stay paired with their
//! sockets. A bounded timeout is a wall-clock budget shared by every retry
//! of the underlying native poll.

use crate::error::BridgeResult;
use crate::retry::{CallOutcome, Timeout};
use crate::session::Session;
use crate::socket::Socket;
use crate::transport::{RawDescriptor, RawPollItem};

/// One socket to watch, with the caller's payload
#[derive(Debug, Clone)]
pub struct PollItem<P> {
    socket: RawDescriptor,
    events: u16,
    payload: P,
}

impl<P> PollItem<P> {
    /// Fails with `AlreadyClosed` for a closed socket
    pub fn new(socket: &Socket, events: u16, payload: P) -> BridgeResult<Self> {
        Ok(Self {
            socket: socket.raw()?,
            events,
            payload,
        })
    }

    pub fn events(&self) -> u16 {
        self.events
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

/// What a poll observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport<P> {
    /// The native poll reported at least one ready socket
    pub any_ready: bool,
    /// `(fired events, payload)` for every ready item, in input order
    pub ready: Vec<(u16, P)>,
    /// Budget left when a cooperative signal cut the wait short
    pub remaining: Option<Timeout>,
}

impl<P> PollReport<P> {
    fn idle(remaining: Option<Timeout>) -> Self {
        Self {
            any_ready: false,
            ready: Vec::new(),
            remaining,
        }
    }

    pub fn was_interrupted(&self) -> bool {
        self.remaining.is_some()
    }
}

pub struct PollMultiplexer<'a> {
    session: &'a Session,
}

impl<'a> PollMultiplexer<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub fn poll<P>(&self, items: Vec<PollItem<P>>, timeout: Timeout) -> BridgeResult<PollReport<P>> {
        let mut poll_set: Vec<RawPollItem> = items
            .iter()
            .map(|item| RawPollItem {
                socket: item.socket,
                events: item.events,
                revents: 0,
            })
            .collect();
        let transport = self.session.transport();

        let outcome = self
            .session
            .retry()
            .invoke_timed(timeout, |budget| {
                poll_set.iter_mut().for_each(|entry| entry.revents = 0);
                transport.poll(&mut poll_set, budget.as_millis())
            })
            .into_outcome()?;

        let count = match outcome {
            CallOutcome::Completed(count) => count,
            CallOutcome::WouldBlock => return Ok(PollReport::idle(None)),
            CallOutcome::Interrupted(remaining) => {
                return Ok(PollReport::idle(Some(remaining.unwrap_or(timeout))));
            }
        };

        let ready = poll_set
            .iter()
            .zip(items)
            .filter(|(entry, _)| entry.revents != 0)
            .map(|(entry, item)| (entry.revents, item.payload))
            .collect();
        Ok(PollReport {
            any_ready: count > 0,
            ready,
            remaining: None,
        })
    }
}

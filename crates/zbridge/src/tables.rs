//! Name tables for every symbolic argument of the operation surface
//!
//! Names are resolved once at decode time. Option names carry the native
//! version window in which their id means what the name says.

use crate::codes::{ctxopt, device, event, flag, msgopt, socket_type, sockopt};
use crate::error::{BridgeError, BridgeResult};
use crate::flags::FlagTable;
use crate::transport::Version;
use serde::Serialize;

/// Which native getter/setter family an option belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionDomain {
    Context,
    Socket,
    Message,
}

impl OptionDomain {
    pub fn family(self) -> &'static str {
        match self {
            OptionDomain::Context => "context options",
            OptionDomain::Socket => "socket options",
            OptionDomain::Message => "message options",
        }
    }

    pub fn descriptors(self) -> &'static [OptionDescriptor] {
        match self {
            OptionDomain::Context => CONTEXT_OPTIONS,
            OptionDomain::Socket => SOCKET_OPTIONS,
            OptionDomain::Message => MESSAGE_OPTIONS,
        }
    }
}

/// A symbolic option name resolved to its native id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptionDescriptor {
    pub name: &'static str,
    pub id: i32,
    pub domain: OptionDomain,
    /// First version with this meaning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<Version>,
    /// First version without it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<Version>,
}

impl OptionDescriptor {
    const fn new(name: &'static str, id: i32, domain: OptionDomain) -> Self {
        Self {
            name,
            id,
            domain,
            since: None,
            until: None,
        }
    }

    const fn since(mut self, version: Version) -> Self {
        self.since = Some(version);
        self
    }

    const fn until(mut self, version: Version) -> Self {
        self.until = Some(version);
        self
    }

    /// Human-readable version window, e.g. `>= 3.1.1` or `< 3.0.0`
    pub fn window(&self) -> String {
        match (self.since, self.until) {
            (Some(since), Some(until)) => format!(">= {since}, < {until}"),
            (Some(since), None) => format!(">= {since}"),
            (None, Some(until)) => format!("< {until}"),
            (None, None) => "any".to_string(),
        }
    }

    pub fn available_in(&self, version: Version) -> bool {
        self.since.map_or(true, |since| version >= since)
            && self.until.map_or(true, |until| version < until)
    }
}

const V3: Version = Version::new(3, 0, 0);
const V3_1_1: Version = Version::new(3, 1, 1);
const V3_2: Version = Version::new(3, 2, 0);

const fn socket(name: &'static str, id: i32) -> OptionDescriptor {
    OptionDescriptor::new(name, id, OptionDomain::Socket)
}

// A name may appear once per version window; the 2.x entries alias the
// split high-water marks onto the single `hwm` id.
pub static SOCKET_OPTIONS: &[OptionDescriptor] = &[
    socket("hwm", sockopt::HWM).until(V3),
    socket("swap", sockopt::SWAP).until(V3),
    socket("mcastLoop", sockopt::MCAST_LOOP).until(V3),
    socket("sndhwm", sockopt::HWM).until(V3),
    socket("rcvhwm", sockopt::HWM).until(V3),
    socket("recoveryIvlMsec", sockopt::RECOVERY_IVL_MSEC).until(V3),
    socket("sndhwm", sockopt::SNDHWM).since(V3),
    socket("rcvhwm", sockopt::RCVHWM).since(V3),
    socket("recoveryIvlMsec", sockopt::RECOVERY_IVL).since(V3),
    socket("multicastHops", sockopt::MULTICAST_HOPS).since(V3),
    socket("ipv4only", sockopt::IPV4ONLY).since(V3),
    socket("lastEndpoint", sockopt::LAST_ENDPOINT).since(V3_1_1),
    socket("failUnroutable", sockopt::FAIL_UNROUTABLE).since(V3_1_1),
    socket("tcpKeepalive", sockopt::TCP_KEEPALIVE).since(V3_1_1),
    socket("tcpKeepaliveCnt", sockopt::TCP_KEEPALIVE_CNT).since(V3_1_1),
    socket("tcpKeepaliveIdle", sockopt::TCP_KEEPALIVE_IDLE).since(V3_1_1),
    socket("tcpKeepaliveIntvl", sockopt::TCP_KEEPALIVE_INTVL).since(V3_1_1),
    socket("tcpAcceptFilter", sockopt::TCP_ACCEPT_FILTER).since(V3_1_1),
    socket("monitor", sockopt::MONITOR).since(V3_1_1).until(V3_2),
    socket("maxmsgsize", sockopt::MAXMSGSIZE).since(V3),
    socket("rcvtimeo", sockopt::RCVTIMEO).since(V3),
    socket("sndtimeo", sockopt::SNDTIMEO).since(V3),
    socket("recoveryIvl", sockopt::RECOVERY_IVL),
    socket("affinity", sockopt::AFFINITY),
    socket("identity", sockopt::IDENTITY),
    socket("subscribe", sockopt::SUBSCRIBE),
    socket("unsubscribe", sockopt::UNSUBSCRIBE),
    socket("rate", sockopt::RATE),
    socket("sndbuf", sockopt::SNDBUF),
    socket("rcvbuf", sockopt::RCVBUF),
    socket("rcvmore", sockopt::RCVMORE),
    socket("fd", sockopt::FD),
    socket("events", sockopt::EVENTS),
    socket("type", sockopt::TYPE),
    socket("linger", sockopt::LINGER),
    socket("reconnectIvl", sockopt::RECONNECT_IVL),
    socket("backlog", sockopt::BACKLOG),
    socket("reconnectIvlMax", sockopt::RECONNECT_IVL_MAX),
];

pub static CONTEXT_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor::new("ioThreads", ctxopt::IO_THREADS, OptionDomain::Context),
    OptionDescriptor::new("maxSockets", ctxopt::MAX_SOCKETS, OptionDomain::Context),
];

pub static MESSAGE_OPTIONS: &[OptionDescriptor] = &[OptionDescriptor::new(
    "more",
    msgopt::MORE,
    OptionDomain::Message,
)];

/// Resolve an option name within a domain for the loaded library version
pub fn resolve_option(
    domain: OptionDomain,
    name: &str,
    version: Version,
    position: usize,
) -> BridgeResult<&'static OptionDescriptor> {
    let descriptor = domain
        .descriptors()
        .iter()
        .filter(|descriptor| descriptor.name == name)
        .find(|descriptor| descriptor.available_in(version));

    match descriptor {
        Some(descriptor) => Ok(descriptor),
        None => match domain.descriptors().iter().find(|d| d.name == name) {
            Some(known) => Err(BridgeError::Unsupported {
                operation: known.name,
                required: known.window(),
            }),
            None => Err(BridgeError::invalid_argument(position, domain.family())),
        },
    }
}

pub static SOCKET_TYPES: &[(&str, i32)] = &[
    ("pair", socket_type::PAIR),
    ("pub", socket_type::PUB),
    ("sub", socket_type::SUB),
    ("req", socket_type::REQ),
    ("rep", socket_type::REP),
    ("xreq", socket_type::DEALER),
    ("xrep", socket_type::ROUTER),
    ("pull", socket_type::PULL),
    ("push", socket_type::PUSH),
    ("router", socket_type::ROUTER),
    ("dealer", socket_type::DEALER),
    ("xpub", socket_type::XPUB),
    ("xsub", socket_type::XSUB),
];

pub static DEVICE_TYPES: &[(&str, i32)] = &[
    ("queue", device::QUEUE),
    ("forwarder", device::FORWARDER),
    ("streamer", device::STREAMER),
];

/// Send and receive flags; `noblock` is the 2.x spelling of `dontwait`
pub static SEND_RECV_FLAGS: FlagTable<u32> = FlagTable::new(
    "send/recv options",
    &[
        ("sndmore", flag::SNDMORE),
        ("dontwait", flag::DONTWAIT),
        ("noblock", flag::DONTWAIT),
    ],
);

pub static POLL_EVENTS: FlagTable<u16> = FlagTable::new(
    "poll events",
    &[
        ("pollin", event::POLLIN),
        ("pollout", event::POLLOUT),
        ("pollerr", event::POLLERR),
    ],
);

fn lookup(table: &[(&'static str, i32)], name: &str) -> Option<i32> {
    table
        .iter()
        .find(|(entry, _)| *entry == name)
        .map(|(_, id)| *id)
}

pub fn resolve_socket_type(name: &str, position: usize) -> BridgeResult<i32> {
    lookup(SOCKET_TYPES, name).ok_or_else(|| BridgeError::invalid_argument(position, "socket types"))
}

pub fn resolve_device_type(name: &str, position: usize) -> BridgeResult<i32> {
    lookup(DEVICE_TYPES, name).ok_or_else(|| BridgeError::invalid_argument(position, "device types"))
}

/// Reverse lookup for diagnostics
pub fn socket_type_name(id: i32) -> Option<&'static str> {
    SOCKET_TYPES
        .iter()
        .rev()
        .find(|(_, known)| *known == id)
        .map(|(name, _)| *name)
}

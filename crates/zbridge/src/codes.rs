//! Numeric constants of the native messaging API
//!
//! Values match `zmq.h` for the 2.x, 3.x and 4.x library lines. Option ids
//! that were renumbered or retired between versions carry an availability
//! window in [`crate::tables`].

/// Error codes as reported by `zmq_errno()`
pub mod errno {
    /// Base for library specific codes that have no POSIX counterpart
    pub const HAUSNUMERO: i32 = 156_384_712;

    pub const EINVAL: i32 = libc::EINVAL;
    pub const ENOENT: i32 = libc::ENOENT;
    pub const EINTR: i32 = libc::EINTR;
    pub const EAGAIN: i32 = libc::EAGAIN;
    pub const EFAULT: i32 = libc::EFAULT;
    pub const ENOMEM: i32 = libc::ENOMEM;
    pub const ENODEV: i32 = libc::ENODEV;
    pub const EMFILE: i32 = libc::EMFILE;
    pub const ENOTSUP: i32 = libc::ENOTSUP;
    pub const EPROTONOSUPPORT: i32 = libc::EPROTONOSUPPORT;
    pub const ENOBUFS: i32 = libc::ENOBUFS;
    pub const ENETDOWN: i32 = libc::ENETDOWN;
    pub const EADDRINUSE: i32 = libc::EADDRINUSE;
    pub const EADDRNOTAVAIL: i32 = libc::EADDRNOTAVAIL;
    pub const ECONNREFUSED: i32 = libc::ECONNREFUSED;
    pub const EINPROGRESS: i32 = libc::EINPROGRESS;
    pub const ENOTSOCK: i32 = libc::ENOTSOCK;
    pub const EAFNOSUPPORT: i32 = libc::EAFNOSUPPORT;
    pub const EHOSTUNREACH: i32 = libc::EHOSTUNREACH;

    pub const EFSM: i32 = HAUSNUMERO + 51;
    pub const ENOCOMPATPROTO: i32 = HAUSNUMERO + 52;
    pub const ETERM: i32 = HAUSNUMERO + 53;
    pub const EMTHREAD: i32 = HAUSNUMERO + 54;
}

/// Socket types accepted by `zmq_socket`
pub mod socket_type {
    pub const PAIR: i32 = 0;
    pub const PUB: i32 = 1;
    pub const SUB: i32 = 2;
    pub const REQ: i32 = 3;
    pub const REP: i32 = 4;
    pub const DEALER: i32 = 5;
    pub const ROUTER: i32 = 6;
    pub const PULL: i32 = 7;
    pub const PUSH: i32 = 8;
    pub const XPUB: i32 = 9;
    pub const XSUB: i32 = 10;
}

/// Socket option ids for `zmq_getsockopt`/`zmq_setsockopt`
pub mod sockopt {
    pub const HWM: i32 = 1;
    pub const SWAP: i32 = 3;
    pub const AFFINITY: i32 = 4;
    pub const IDENTITY: i32 = 5;
    pub const SUBSCRIBE: i32 = 6;
    pub const UNSUBSCRIBE: i32 = 7;
    pub const RATE: i32 = 8;
    pub const RECOVERY_IVL: i32 = 9;
    pub const MCAST_LOOP: i32 = 10;
    pub const SNDBUF: i32 = 11;
    pub const RCVBUF: i32 = 12;
    pub const RCVMORE: i32 = 13;
    pub const FD: i32 = 14;
    pub const EVENTS: i32 = 15;
    pub const TYPE: i32 = 16;
    pub const LINGER: i32 = 17;
    pub const RECONNECT_IVL: i32 = 18;
    pub const BACKLOG: i32 = 19;
    pub const RECOVERY_IVL_MSEC: i32 = 20;
    pub const RECONNECT_IVL_MAX: i32 = 21;
    pub const MAXMSGSIZE: i32 = 22;
    pub const SNDHWM: i32 = 23;
    pub const RCVHWM: i32 = 24;
    pub const MULTICAST_HOPS: i32 = 25;
    pub const RCVTIMEO: i32 = 27;
    pub const SNDTIMEO: i32 = 28;
    pub const IPV4ONLY: i32 = 31;
    pub const LAST_ENDPOINT: i32 = 32;
    pub const FAIL_UNROUTABLE: i32 = 33;
    pub const TCP_KEEPALIVE: i32 = 34;
    pub const TCP_KEEPALIVE_CNT: i32 = 35;
    pub const TCP_KEEPALIVE_IDLE: i32 = 36;
    pub const TCP_KEEPALIVE_INTVL: i32 = 37;
    pub const TCP_ACCEPT_FILTER: i32 = 38;
    pub const MONITOR: i32 = 39;
}

/// Context option ids for `zmq_ctx_get`/`zmq_ctx_set`
pub mod ctxopt {
    pub const IO_THREADS: i32 = 1;
    pub const MAX_SOCKETS: i32 = 2;

    pub const IO_THREADS_DFLT: i32 = 1;
    pub const MAX_SOCKETS_DFLT: i32 = 1024;
}

/// Message property ids for `zmq_msg_get`/`zmq_msg_set`
pub mod msgopt {
    pub const MORE: i32 = 1;
}

/// Send/receive flag bits
pub mod flag {
    pub const DONTWAIT: u32 = 1;
    pub const SNDMORE: u32 = 2;
}

/// Poll event bits
pub mod event {
    pub const POLLIN: u16 = 1;
    pub const POLLOUT: u16 = 2;
    pub const POLLERR: u16 = 4;
}

/// Built-in device types for `zmq_device`
pub mod device {
    pub const STREAMER: i32 = 1;
    pub const FORWARDER: i32 = 2;
    pub const QUEUE: i32 = 3;
}

//! In-process transport
//!
//! Implements the transport surface over shared memory so the bridge runs
//! without libzmq. Only `inproc://` endpoints exist. Blocking calls wait on a
//! condition variable and honour `rcvtimeo`/`sndtimeo` and `dontwait`.
//!
//! Destroying a context marks it terminated: blocked and later calls on its
//! sockets fail with `ETERM`, and the context is reclaimed once its last
//! socket closes. Unlike libzmq the destroy call itself does not wait.
//!
//! [`MemoryTransport::interrupt_next`] makes upcoming blocking calls fail
//! with `EINTR`, which is how tests drive the retry protocol.

use super::{EndpointOp, RawDescriptor, RawPollItem, RawResult, Transport, Version};
use crate::codes::{ctxopt, errno, event, flag, msgopt, socket_type, sockopt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Version reported unless overridden with [`MemoryTransport::with_version`]
pub const EMULATED_VERSION: Version = Version::new(4, 3, 0);

pub struct MemoryTransport {
    version: Version,
    state: Mutex<State>,
    changed: Condvar,
    interrupts: AtomicUsize,
}

#[derive(Default)]
struct State {
    next_id: usize,
    contexts: HashMap<usize, ContextState>,
    sockets: HashMap<usize, SocketState>,
    messages: HashMap<usize, MessageState>,
    endpoints: HashMap<String, usize>,
}

struct ContextState {
    io_threads: i32,
    max_sockets: i32,
    sockets: HashSet<usize>,
    terminated: bool,
}

struct SocketState {
    context: usize,
    kind: i32,
    options: HashMap<i32, Vec<u8>>,
    peers: Vec<usize>,
    inbox: VecDeque<Frame>,
    bound: Vec<String>,
    connected: Vec<(String, usize)>,
    subscriptions: Vec<Vec<u8>>,
    next_peer: usize,
    last_peer: Option<usize>,
    /// Targets of an unfinished multipart send
    pending: Option<Vec<usize>>,
    rcvmore: bool,
    last_endpoint: String,
}

struct Frame {
    data: Vec<u8>,
    more: bool,
    from: usize,
}

#[derive(Default)]
struct MessageState {
    data: Vec<u8>,
    more: bool,
}

enum Route {
    Deliver(Vec<usize>),
    NoPeer,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_version(EMULATED_VERSION)
    }

    /// Report `version`, to exercise capability checks against older libraries
    pub fn with_version(version: Version) -> Self {
        Self {
            version,
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            interrupts: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` blocking calls with `EINTR`
    ///
    /// Blocking calls are context destroy, option get/set, send, recv, poll
    /// and device.
    pub fn interrupt_next(&self, count: usize) {
        self.interrupts.store(count, Ordering::SeqCst);
    }

    /// Number of native objects (contexts, sockets, messages) still alive
    pub fn live_objects(&self) -> usize {
        let state = self.lock();
        state.contexts.len() + state.sockets.len() + state.messages.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn interrupted(&self) -> bool {
        self.interrupts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn wait_until<'g>(
        &self,
        guard: MutexGuard<'g, State>,
        deadline: Option<Instant>,
    ) -> MutexGuard<'g, State> {
        match deadline {
            None => self
                .changed
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner),
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                self.changed
                    .wait_timeout(guard, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("version", &self.version)
            .field("live_objects", &self.live_objects())
            .finish()
    }
}

fn descriptor(id: usize) -> RawResult<RawDescriptor> {
    RawDescriptor::from_id(id).ok_or(errno::EFAULT)
}

fn deadline_after(timeout_ms: i64) -> Option<Instant> {
    u64::try_from(timeout_ms)
        .ok()
        .map(|ms| Instant::now() + Duration::from_millis(ms))
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

fn int_bytes(value: i32) -> Vec<u8> {
    value.to_ne_bytes().to_vec()
}

/// Value of an option nobody has set yet; `None` for unknown ids
fn default_option(id: i32) -> Option<Vec<u8>> {
    let value = match id {
        sockopt::LINGER
        | sockopt::RCVTIMEO
        | sockopt::SNDTIMEO
        | sockopt::TCP_KEEPALIVE
        | sockopt::TCP_KEEPALIVE_CNT
        | sockopt::TCP_KEEPALIVE_IDLE
        | sockopt::TCP_KEEPALIVE_INTVL => int_bytes(-1),
        sockopt::SNDHWM | sockopt::RCVHWM => int_bytes(1000),
        sockopt::RATE | sockopt::BACKLOG | sockopt::RECONNECT_IVL => int_bytes(100),
        sockopt::RECOVERY_IVL => int_bytes(10_000),
        sockopt::MULTICAST_HOPS | sockopt::IPV4ONLY => int_bytes(1),
        sockopt::SNDBUF
        | sockopt::RCVBUF
        | sockopt::RECONNECT_IVL_MAX
        | sockopt::FAIL_UNROUTABLE => int_bytes(0),
        sockopt::MAXMSGSIZE | sockopt::RECOVERY_IVL_MSEC => (-1i64).to_ne_bytes().to_vec(),
        sockopt::SWAP => 0i64.to_ne_bytes().to_vec(),
        sockopt::MCAST_LOOP => 1i64.to_ne_bytes().to_vec(),
        sockopt::AFFINITY | sockopt::HWM => 0u64.to_ne_bytes().to_vec(),
        sockopt::IDENTITY => Vec::new(),
        _ => return None,
    };
    Some(value)
}

fn is_read_only(id: i32) -> bool {
    matches!(
        id,
        sockopt::TYPE | sockopt::RCVMORE | sockopt::EVENTS | sockopt::FD | sockopt::LAST_ENDPOINT
    )
}

fn can_send(kind: i32) -> bool {
    !matches!(kind, socket_type::SUB | socket_type::PULL)
}

fn can_recv(kind: i32) -> bool {
    !matches!(kind, socket_type::PUB | socket_type::PUSH | socket_type::XPUB)
}

fn compatible(a: i32, b: i32) -> bool {
    use socket_type::*;
    let pair = |x: i32, y: i32| (a == x && b == y) || (a == y && b == x);
    pair(PAIR, PAIR)
        || pair(PUB, SUB)
        || pair(PUB, XSUB)
        || pair(XPUB, SUB)
        || pair(XPUB, XSUB)
        || pair(REQ, REP)
        || pair(REQ, ROUTER)
        || pair(DEALER, REP)
        || pair(DEALER, ROUTER)
        || pair(DEALER, DEALER)
        || pair(ROUTER, ROUTER)
        || pair(PUSH, PULL)
}

fn parse_inproc(address: &str) -> RawResult<&str> {
    let (scheme, name) = address.split_once("://").ok_or(errno::EINVAL)?;
    if scheme != "inproc" {
        return Err(errno::EPROTONOSUPPORT);
    }
    if name.is_empty() {
        return Err(errno::EINVAL);
    }
    Ok(name)
}

impl State {
    fn alloc_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn socket(&self, id: usize) -> RawResult<&SocketState> {
        self.sockets.get(&id).ok_or(errno::ENOTSOCK)
    }

    fn socket_mut(&mut self, id: usize) -> RawResult<&mut SocketState> {
        self.sockets.get_mut(&id).ok_or(errno::ENOTSOCK)
    }

    /// The socket, failing with `ETERM` once its context is terminated
    fn live_socket(&self, id: usize) -> RawResult<&SocketState> {
        let socket = self.socket(id)?;
        match self.contexts.get(&socket.context) {
            Some(context) if !context.terminated => Ok(socket),
            _ => Err(errno::ETERM),
        }
    }

    fn message_mut(&mut self, id: usize) -> RawResult<&mut MessageState> {
        self.messages.get_mut(&id).ok_or(errno::EFAULT)
    }

    fn link(&mut self, a: usize, b: usize) {
        if let Some(socket) = self.sockets.get_mut(&a) {
            socket.peers.push(b);
        }
        if let Some(socket) = self.sockets.get_mut(&b) {
            socket.peers.push(a);
        }
    }

    fn unlink(&mut self, a: usize, b: usize) {
        for (from, to) in [(a, b), (b, a)] {
            if let Some(socket) = self.sockets.get_mut(&from) {
                if let Some(index) = socket.peers.iter().position(|peer| *peer == to) {
                    socket.peers.remove(index);
                }
                if socket.last_peer == Some(to) {
                    socket.last_peer = None;
                }
            }
        }
    }

    fn events(&self, socket: &SocketState) -> u16 {
        let mut events = 0;
        if can_recv(socket.kind) && !socket.inbox.is_empty() {
            events |= event::POLLIN;
        }
        let writable = match socket.kind {
            socket_type::PUB | socket_type::XPUB => true,
            socket_type::REP | socket_type::ROUTER => socket.last_peer.is_some(),
            kind => can_send(kind) && !socket.peers.is_empty(),
        };
        if writable {
            events |= event::POLLOUT;
        }
        events
    }

    fn int_option(&self, socket: &SocketState, id: i32) -> i32 {
        socket
            .options
            .get(&id)
            .cloned()
            .or_else(|| default_option(id))
            .map(|bytes| {
                let mut raw = [0u8; 4];
                let len = bytes.len().min(4);
                raw[..len].copy_from_slice(&bytes[..len]);
                i32::from_ne_bytes(raw)
            })
            .unwrap_or(-1)
    }

    fn route(&self, from: usize, data: &[u8]) -> RawResult<Route> {
        let sender = self.socket(from)?;
        if let Some(targets) = &sender.pending {
            return Ok(Route::Deliver(targets.clone()));
        }
        let route = match sender.kind {
            socket_type::PUB | socket_type::XPUB => Route::Deliver(
                sender
                    .peers
                    .iter()
                    .copied()
                    .filter(|peer| {
                        self.sockets.get(peer).is_some_and(|subscriber| {
                            subscriber.kind == socket_type::XSUB
                                || subscriber
                                    .subscriptions
                                    .iter()
                                    .any(|prefix| data.starts_with(prefix))
                        })
                    })
                    .collect(),
            ),
            socket_type::REP | socket_type::ROUTER => {
                Route::Deliver(sender.last_peer.into_iter().collect())
            }
            _ if sender.peers.is_empty() => Route::NoPeer,
            _ => Route::Deliver(vec![sender.peers[sender.next_peer % sender.peers.len()]]),
        };
        Ok(route)
    }

    /// Queue a frame from `from` on its routed peers
    ///
    /// Hands the frame back when there is no peer to take it yet.
    fn deliver(&mut self, from: usize, frame: Frame) -> RawResult<Result<usize, Frame>> {
        let targets = match self.route(from, &frame.data)? {
            Route::Deliver(targets) => targets,
            Route::NoPeer => return Ok(Err(frame)),
        };
        let len = frame.data.len();
        let more = frame.more;
        for target in &targets {
            if let Some(peer) = self.sockets.get_mut(target) {
                peer.inbox.push_back(Frame {
                    data: frame.data.clone(),
                    more,
                    from,
                });
            }
        }
        let sender = self.socket_mut(from)?;
        if sender.pending.is_none() {
            sender.next_peer = sender.next_peer.wrapping_add(1);
        }
        sender.pending = if more { Some(targets) } else { None };
        Ok(Ok(len))
    }

    /// Move queued frames from `from`'s inbox out through `to`
    fn forward(&mut self, from: usize, to: usize) -> RawResult<bool> {
        let mut moved = false;
        loop {
            let frame = match self.socket_mut(from)?.inbox.pop_front() {
                Some(frame) => frame,
                None => return Ok(moved),
            };
            let frame = Frame { from: to, ..frame };
            match self.deliver(to, frame)? {
                Ok(_) => moved = true,
                Err(frame) => {
                    let frame = Frame { from, ..frame };
                    self.socket_mut(from)?.inbox.push_front(frame);
                    return Ok(moved);
                }
            }
        }
    }

    fn close_socket(&mut self, id: usize) -> RawResult<()> {
        let socket = self.sockets.remove(&id).ok_or(errno::ENOTSOCK)?;
        for peer in &socket.peers {
            self.unlink(id, *peer);
        }
        for endpoint in &socket.bound {
            self.endpoints.remove(endpoint);
        }
        for other in self.sockets.values_mut() {
            other.connected.retain(|(_, target)| *target != id);
        }
        if let Some(context) = self.contexts.get_mut(&socket.context) {
            context.sockets.remove(&id);
            if context.terminated && context.sockets.is_empty() {
                self.contexts.remove(&socket.context);
            }
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn version(&self) -> Version {
        self.version
    }

    fn strerror(&self, code: i32) -> String {
        match code {
            errno::ETERM => "Context was terminated".to_string(),
            errno::EFSM => "Operation cannot be accomplished in current state".to_string(),
            errno::ENOCOMPATPROTO => "The protocol is not compatible with the socket type".to_string(),
            errno::EMTHREAD => "No thread available".to_string(),
            _ => std::io::Error::from_raw_os_error(code).to_string(),
        }
    }

    fn context_new(&self, io_threads: i32) -> RawResult<RawDescriptor> {
        if io_threads < 0 {
            return Err(errno::EINVAL);
        }
        let mut state = self.lock();
        let id = state.alloc_id();
        state.contexts.insert(
            id,
            ContextState {
                io_threads,
                max_sockets: ctxopt::MAX_SOCKETS_DFLT,
                sockets: HashSet::new(),
                terminated: false,
            },
        );
        descriptor(id)
    }

    fn context_destroy(&self, context: RawDescriptor) -> RawResult<()> {
        if self.interrupted() {
            return Err(errno::EINTR);
        }
        let mut state = self.lock();
        let ctx = state.contexts.get_mut(&context.id()).ok_or(errno::EFAULT)?;
        if ctx.terminated {
            return Err(errno::EFAULT);
        }
        ctx.terminated = true;
        if ctx.sockets.is_empty() {
            state.contexts.remove(&context.id());
        }
        self.changed.notify_all();
        Ok(())
    }

    fn context_get(&self, context: RawDescriptor, option: i32) -> RawResult<i32> {
        let state = self.lock();
        let ctx = state.contexts.get(&context.id()).ok_or(errno::EFAULT)?;
        match option {
            ctxopt::IO_THREADS => Ok(ctx.io_threads),
            ctxopt::MAX_SOCKETS => Ok(ctx.max_sockets),
            _ => Err(errno::EINVAL),
        }
    }

    fn context_set(&self, context: RawDescriptor, option: i32, value: i32) -> RawResult<()> {
        let mut state = self.lock();
        let ctx = state.contexts.get_mut(&context.id()).ok_or(errno::EFAULT)?;
        match option {
            ctxopt::IO_THREADS if value >= 0 => ctx.io_threads = value,
            ctxopt::MAX_SOCKETS if value >= 1 => ctx.max_sockets = value,
            _ => return Err(errno::EINVAL),
        }
        Ok(())
    }

    fn socket_new(&self, context: RawDescriptor, kind: i32) -> RawResult<RawDescriptor> {
        if !(socket_type::PAIR..=socket_type::XSUB).contains(&kind) {
            return Err(errno::EINVAL);
        }
        let mut state = self.lock();
        let ctx = state.contexts.get(&context.id()).ok_or(errno::EFAULT)?;
        if ctx.terminated {
            return Err(errno::ETERM);
        }
        if ctx.sockets.len() >= usize::try_from(ctx.max_sockets).unwrap_or(0) {
            return Err(errno::EMFILE);
        }
        let id = state.alloc_id();
        if let Some(ctx) = state.contexts.get_mut(&context.id()) {
            ctx.sockets.insert(id);
        }
        state.sockets.insert(
            id,
            SocketState {
                context: context.id(),
                kind,
                options: HashMap::new(),
                peers: Vec::new(),
                inbox: VecDeque::new(),
                bound: Vec::new(),
                connected: Vec::new(),
                subscriptions: Vec::new(),
                next_peer: 0,
                last_peer: None,
                pending: None,
                rcvmore: false,
                last_endpoint: String::new(),
            },
        );
        descriptor(id)
    }

    fn socket_close(&self, socket: RawDescriptor) -> RawResult<()> {
        let mut state = self.lock();
        state.close_socket(socket.id())?;
        self.changed.notify_all();
        Ok(())
    }

    fn get_option(&self, socket: RawDescriptor, option: i32, buf: &mut [u8]) -> RawResult<usize> {
        if self.interrupted() {
            return Err(errno::EINTR);
        }
        let state = self.lock();
        let sock = state.socket(socket.id())?;
        let value = match option {
            sockopt::TYPE => int_bytes(sock.kind),
            sockopt::RCVMORE => int_bytes(i32::from(sock.rcvmore)),
            sockopt::EVENTS => int_bytes(i32::from(state.events(sock))),
            sockopt::LAST_ENDPOINT => {
                let mut text = sock.last_endpoint.clone().into_bytes();
                text.push(0);
                text
            }
            sockopt::FD | sockopt::SUBSCRIBE | sockopt::UNSUBSCRIBE | sockopt::TCP_ACCEPT_FILTER => {
                return Err(errno::EINVAL)
            }
            id => match sock.options.get(&id) {
                Some(stored) => stored.clone(),
                None => default_option(id).ok_or(errno::EINVAL)?,
            },
        };
        if value.len() > buf.len() {
            return Err(errno::EINVAL);
        }
        buf[..value.len()].copy_from_slice(&value);
        Ok(value.len())
    }

    fn set_option(&self, socket: RawDescriptor, option: i32, value: &[u8]) -> RawResult<()> {
        if self.interrupted() {
            return Err(errno::EINTR);
        }
        let mut state = self.lock();
        let sock = state.socket_mut(socket.id())?;
        match option {
            id if is_read_only(id) => return Err(errno::EINVAL),
            sockopt::SUBSCRIBE | sockopt::UNSUBSCRIBE
                if !matches!(sock.kind, socket_type::SUB | socket_type::XSUB) =>
            {
                return Err(errno::EINVAL)
            }
            sockopt::SUBSCRIBE => sock.subscriptions.push(value.to_vec()),
            sockopt::UNSUBSCRIBE => {
                if let Some(index) = sock.subscriptions.iter().position(|s| s == value) {
                    sock.subscriptions.remove(index);
                }
            }
            sockopt::TCP_ACCEPT_FILTER => {}
            id if default_option(id).is_some() => {
                sock.options.insert(id, value.to_vec());
            }
            _ => return Err(errno::EINVAL),
        }
        Ok(())
    }

    fn endpoint(&self, socket: RawDescriptor, op: EndpointOp, address: &str) -> RawResult<()> {
        parse_inproc(address)?;
        let id = socket.id();
        let mut state = self.lock();
        let kind = state.live_socket(id)?.kind;

        match op {
            EndpointOp::Bind => {
                if state.endpoints.contains_key(address) {
                    return Err(errno::EADDRINUSE);
                }
                state.endpoints.insert(address.to_string(), id);
                let sock = state.socket_mut(id)?;
                sock.bound.push(address.to_string());
                sock.last_endpoint = address.to_string();
            }
            EndpointOp::Connect => {
                let target = *state.endpoints.get(address).ok_or(errno::ECONNREFUSED)?;
                if target == id {
                    return Err(errno::EINVAL);
                }
                if !compatible(kind, state.socket(target)?.kind) {
                    return Err(errno::ENOCOMPATPROTO);
                }
                state.link(id, target);
                state
                    .socket_mut(id)?
                    .connected
                    .push((address.to_string(), target));
            }
            EndpointOp::Unbind => {
                let sock = state.socket_mut(id)?;
                let index = sock
                    .bound
                    .iter()
                    .position(|bound| bound == address)
                    .ok_or(errno::ENOENT)?;
                sock.bound.remove(index);
                state.endpoints.remove(address);
                let clients: Vec<usize> = state
                    .sockets
                    .iter()
                    .filter(|(_, other)| {
                        other
                            .connected
                            .iter()
                            .any(|(endpoint, target)| endpoint == address && *target == id)
                    })
                    .map(|(client, _)| *client)
                    .collect();
                for client in clients {
                    if let Some(other) = state.sockets.get_mut(&client) {
                        other
                            .connected
                            .retain(|(endpoint, target)| !(endpoint == address && *target == id));
                    }
                    state.unlink(client, id);
                }
            }
            EndpointOp::Disconnect => {
                let sock = state.socket_mut(id)?;
                let index = sock
                    .connected
                    .iter()
                    .position(|(endpoint, _)| endpoint == address)
                    .ok_or(errno::ENOENT)?;
                let (_, target) = sock.connected.remove(index);
                state.unlink(id, target);
            }
        }
        self.changed.notify_all();
        Ok(())
    }

    fn message_init(&self, size: Option<usize>) -> RawResult<RawDescriptor> {
        let mut state = self.lock();
        let id = state.alloc_id();
        state.messages.insert(
            id,
            MessageState {
                data: vec![0; size.unwrap_or(0)],
                more: false,
            },
        );
        descriptor(id)
    }

    fn message_close(&self, message: RawDescriptor) -> RawResult<()> {
        let mut state = self.lock();
        state
            .messages
            .remove(&message.id())
            .map(|_| ())
            .ok_or(errno::EFAULT)
    }

    fn message_size(&self, message: RawDescriptor) -> usize {
        let state = self.lock();
        state
            .messages
            .get(&message.id())
            .map_or(0, |message| message.data.len())
    }

    fn message_data(&self, message: RawDescriptor) -> Vec<u8> {
        let state = self.lock();
        state
            .messages
            .get(&message.id())
            .map(|message| message.data.clone())
            .unwrap_or_default()
    }

    fn message_write(&self, message: RawDescriptor, data: &[u8]) {
        let mut state = self.lock();
        if let Some(message) = state.messages.get_mut(&message.id()) {
            message.data = data.to_vec();
        }
    }

    fn message_copy(&self, dest: RawDescriptor, src: RawDescriptor) -> RawResult<()> {
        let mut state = self.lock();
        let source = state.messages.get(&src.id()).ok_or(errno::EFAULT)?;
        let (data, more) = (source.data.clone(), source.more);
        let target = state.message_mut(dest.id())?;
        target.data = data;
        target.more = more;
        Ok(())
    }

    fn message_move(&self, dest: RawDescriptor, src: RawDescriptor) -> RawResult<()> {
        if dest == src {
            return Ok(());
        }
        let mut state = self.lock();
        state.message_mut(dest.id())?;
        let moved = std::mem::take(state.message_mut(src.id())?);
        *state.message_mut(dest.id())? = moved;
        Ok(())
    }

    fn message_get(&self, message: RawDescriptor, option: i32) -> RawResult<i32> {
        let mut state = self.lock();
        let message = state.message_mut(message.id())?;
        match option {
            msgopt::MORE => Ok(i32::from(message.more)),
            _ => Err(errno::EINVAL),
        }
    }

    fn message_set(&self, message: RawDescriptor, _option: i32, _value: i32) -> RawResult<()> {
        let mut state = self.lock();
        state.message_mut(message.id())?;
        // no message property is writable
        Err(errno::EINVAL)
    }

    fn send(&self, message: RawDescriptor, socket: RawDescriptor, flags: u32) -> RawResult<usize> {
        if self.interrupted() {
            return Err(errno::EINTR);
        }
        let id = socket.id();
        let mut state = self.lock();
        let sock = state.live_socket(id)?;
        if !can_send(sock.kind) {
            return Err(errno::ENOTSUP);
        }
        if matches!(sock.kind, socket_type::REP) && sock.last_peer.is_none() {
            return Err(errno::EFSM);
        }
        let deadline = deadline_after(i64::from(state.int_option(sock, sockopt::SNDTIMEO)));
        state.message_mut(message.id())?;

        loop {
            state.live_socket(id)?;
            let data = std::mem::take(&mut state.message_mut(message.id())?.data);
            let frame = Frame {
                data,
                more: flags & flag::SNDMORE != 0,
                from: id,
            };
            match state.deliver(id, frame)? {
                Ok(len) => {
                    self.changed.notify_all();
                    return Ok(len);
                }
                Err(frame) => {
                    state.message_mut(message.id())?.data = frame.data;
                    if flags & flag::DONTWAIT != 0 || expired(deadline) {
                        return Err(errno::EAGAIN);
                    }
                }
            }
            state = self.wait_until(state, deadline);
        }
    }

    fn recv(&self, message: RawDescriptor, socket: RawDescriptor, flags: u32) -> RawResult<usize> {
        if self.interrupted() {
            return Err(errno::EINTR);
        }
        let id = socket.id();
        let mut state = self.lock();
        let sock = state.live_socket(id)?;
        if !can_recv(sock.kind) {
            return Err(errno::ENOTSUP);
        }
        let deadline = deadline_after(i64::from(state.int_option(sock, sockopt::RCVTIMEO)));
        state.message_mut(message.id())?;

        loop {
            let sock = state.socket_mut(id)?;
            if let Some(frame) = sock.inbox.pop_front() {
                sock.rcvmore = frame.more;
                sock.last_peer = Some(frame.from);
                let len = frame.data.len();
                let target = state.message_mut(message.id())?;
                target.data = frame.data;
                target.more = frame.more;
                self.changed.notify_all();
                return Ok(len);
            }
            if flags & flag::DONTWAIT != 0 || expired(deadline) {
                return Err(errno::EAGAIN);
            }
            state = self.wait_until(state, deadline);
            state.live_socket(id)?;
        }
    }

    fn poll(&self, items: &mut [RawPollItem], timeout_ms: i64) -> RawResult<usize> {
        if self.interrupted() {
            return Err(errno::EINTR);
        }
        let deadline = deadline_after(timeout_ms);
        let mut state = self.lock();
        loop {
            let mut ready = 0;
            for item in items.iter_mut() {
                let socket = state.socket(item.socket.id())?;
                item.revents = state.events(socket) & item.events;
                if item.revents != 0 {
                    ready += 1;
                }
            }
            if ready > 0 || timeout_ms == 0 || expired(deadline) {
                return Ok(ready);
            }
            state = self.wait_until(state, deadline);
        }
    }

    fn device(&self, kind: i32, frontend: RawDescriptor, backend: RawDescriptor) -> RawResult<()> {
        use crate::codes::device;

        if self.interrupted() {
            return Err(errno::EINTR);
        }
        if !matches!(kind, device::QUEUE | device::FORWARDER | device::STREAMER) {
            return Err(errno::EINVAL);
        }
        let (front, back) = (frontend.id(), backend.id());
        let mut state = self.lock();
        loop {
            state.live_socket(front)?;
            state.live_socket(back)?;
            let mut moved = state.forward(front, back)?;
            if kind == device::QUEUE {
                moved |= state.forward(back, front)?;
            }
            if moved {
                self.changed.notify_all();
            } else {
                state = self.wait_until(state, None);
            }
        }
    }
}

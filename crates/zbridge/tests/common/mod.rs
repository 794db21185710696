//! Common test utilities for bridge integration tests
//!
//! `TestTransport` wraps the in-process transport, counts every native call
//! it forwards, and can replace `poll` with a scripted sequence that moves a
//! manual clock.

#![allow(dead_code)]

pub use pretty_assertions::{assert_eq, assert_ne};

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zbridge::clock::ManualClock;
use zbridge::codes::errno;
use zbridge::transport::{
    Capabilities, EndpointOp, MemoryTransport, RawDescriptor, RawPollItem, RawResult, Transport,
    Version,
};
use zbridge::{Session, SignalFlag};

/// One scripted return of the native poll
#[derive(Debug, Clone)]
pub enum PollStep {
    /// Spend `after_ms`, optionally raise the host signal, fail with EINTR
    Interrupt { after_ms: u64, raise_signal: bool },
    /// Spend `after_ms`, then report these revents in input order
    Ready { after_ms: u64, revents: Vec<u16> },
    /// Fail with a hard error code
    Fail(i32),
}

#[derive(Debug)]
pub struct TestTransport {
    inner: MemoryTransport,
    calls: Mutex<HashMap<&'static str, usize>>,
    poll_script: Mutex<VecDeque<PollStep>>,
    poll_timeouts: Mutex<Vec<i64>>,
    pub clock: Arc<ManualClock>,
    pub signal: SignalFlag,
}

impl TestTransport {
    pub fn new() -> Arc<Self> {
        Self::wrapping(MemoryTransport::new())
    }

    pub fn wrapping(inner: MemoryTransport) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(HashMap::new()),
            poll_script: Mutex::new(VecDeque::new()),
            poll_timeouts: Mutex::new(Vec::new()),
            clock: Arc::new(ManualClock::new()),
            signal: SignalFlag::new(),
        })
    }

    /// A session using this transport with its manual clock and signal flag
    pub fn session(self: &Arc<Self>) -> Arc<Session> {
        let transport: Arc<dyn Transport> = Arc::clone(self) as Arc<dyn Transport>;
        Session::builder(transport)
            .clock(Arc::clone(&self.clock) as Arc<dyn zbridge::clock::Clock>)
            .signal(Arc::new(self.signal.clone()))
            .build()
    }

    pub fn inner(&self) -> &MemoryTransport {
        &self.inner
    }

    /// Number of forwarded calls to the named native entry point
    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn script_poll(&self, steps: impl IntoIterator<Item = PollStep>) {
        self.poll_script.lock().unwrap().extend(steps);
    }

    /// Timeouts the native poll was called with, in call order
    pub fn poll_timeouts(&self) -> Vec<i64> {
        self.poll_timeouts.lock().unwrap().clone()
    }

    fn record(&self, name: &'static str) {
        *self.calls.lock().unwrap().entry(name).or_insert(0) += 1;
    }
}

impl Transport for TestTransport {
    fn backend(&self) -> &'static str {
        "test"
    }

    fn version(&self) -> Version {
        self.inner.version()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn strerror(&self, code: i32) -> String {
        self.inner.strerror(code)
    }

    fn context_new(&self, io_threads: i32) -> RawResult<RawDescriptor> {
        self.record("context_new");
        self.inner.context_new(io_threads)
    }

    fn context_destroy(&self, context: RawDescriptor) -> RawResult<()> {
        self.record("context_destroy");
        self.inner.context_destroy(context)
    }

    fn context_get(&self, context: RawDescriptor, option: i32) -> RawResult<i32> {
        self.record("context_get");
        self.inner.context_get(context, option)
    }

    fn context_set(&self, context: RawDescriptor, option: i32, value: i32) -> RawResult<()> {
        self.record("context_set");
        self.inner.context_set(context, option, value)
    }

    fn socket_new(&self, context: RawDescriptor, kind: i32) -> RawResult<RawDescriptor> {
        self.record("socket_new");
        self.inner.socket_new(context, kind)
    }

    fn socket_close(&self, socket: RawDescriptor) -> RawResult<()> {
        self.record("socket_close");
        self.inner.socket_close(socket)
    }

    fn get_option(&self, socket: RawDescriptor, option: i32, buf: &mut [u8]) -> RawResult<usize> {
        self.record("get_option");
        self.inner.get_option(socket, option, buf)
    }

    fn set_option(&self, socket: RawDescriptor, option: i32, value: &[u8]) -> RawResult<()> {
        self.record("set_option");
        self.inner.set_option(socket, option, value)
    }

    fn endpoint(&self, socket: RawDescriptor, op: EndpointOp, address: &str) -> RawResult<()> {
        self.record("endpoint");
        self.inner.endpoint(socket, op, address)
    }

    fn message_init(&self, size: Option<usize>) -> RawResult<RawDescriptor> {
        self.record("message_init");
        self.inner.message_init(size)
    }

    fn message_close(&self, message: RawDescriptor) -> RawResult<()> {
        self.record("message_close");
        self.inner.message_close(message)
    }

    fn message_size(&self, message: RawDescriptor) -> usize {
        self.record("message_size");
        self.inner.message_size(message)
    }

    fn message_data(&self, message: RawDescriptor) -> Vec<u8> {
        self.record("message_data");
        self.inner.message_data(message)
    }

    fn message_write(&self, message: RawDescriptor, data: &[u8]) {
        self.record("message_write");
        self.inner.message_write(message, data)
    }

    fn message_copy(&self, dest: RawDescriptor, src: RawDescriptor) -> RawResult<()> {
        self.record("message_copy");
        self.inner.message_copy(dest, src)
    }

    fn message_move(&self, dest: RawDescriptor, src: RawDescriptor) -> RawResult<()> {
        self.record("message_move");
        self.inner.message_move(dest, src)
    }

    fn message_get(&self, message: RawDescriptor, option: i32) -> RawResult<i32> {
        self.record("message_get");
        self.inner.message_get(message, option)
    }

    fn message_set(&self, message: RawDescriptor, option: i32, value: i32) -> RawResult<()> {
        self.record("message_set");
        self.inner.message_set(message, option, value)
    }

    fn send(&self, message: RawDescriptor, socket: RawDescriptor, flags: u32) -> RawResult<usize> {
        self.record("send");
        self.inner.send(message, socket, flags)
    }

    fn recv(&self, message: RawDescriptor, socket: RawDescriptor, flags: u32) -> RawResult<usize> {
        self.record("recv");
        self.inner.recv(message, socket, flags)
    }

    fn poll(&self, items: &mut [RawPollItem], timeout_ms: i64) -> RawResult<usize> {
        self.record("poll");
        self.poll_timeouts.lock().unwrap().push(timeout_ms);
        let step = self.poll_script.lock().unwrap().pop_front();
        match step {
            None => self.inner.poll(items, timeout_ms),
            Some(PollStep::Interrupt {
                after_ms,
                raise_signal,
            }) => {
                self.clock.advance(Duration::from_millis(after_ms));
                if raise_signal {
                    self.signal.raise();
                }
                Err(errno::EINTR)
            }
            Some(PollStep::Ready { after_ms, revents }) => {
                self.clock.advance(Duration::from_millis(after_ms));
                let mut ready = 0;
                for (item, fired) in items.iter_mut().zip(revents) {
                    item.revents = fired & item.events;
                    if item.revents != 0 {
                        ready += 1;
                    }
                }
                Ok(ready)
            }
            Some(PollStep::Fail(code)) => Err(code),
        }
    }

    fn device(&self, kind: i32, frontend: RawDescriptor, backend: RawDescriptor) -> RawResult<()> {
        self.record("device");
        self.inner.device(kind, frontend, backend)
    }
}

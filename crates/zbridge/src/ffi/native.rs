//! libzmq through its C ABI
//!
//! Entry points are resolved once at load time. Symbols that only exist in
//! some library generations are optional; the [`Capabilities`] of the
//! transport drop the matching features when they are absent.

use super::loader::{LibraryLoader, LoadError};
use crate::codes::{ctxopt, errno};
use crate::transport::{
    Capabilities, EndpointOp, Feature, RawDescriptor, RawPollItem, RawResult, Transport, Version,
};
use libc::{c_char, c_int, c_long, c_short, c_void, size_t};
use libloading::Library;
use std::ffi::{CStr, CString};
use std::fmt;

/// Storage for a native `zmq_msg_t`: 64 bytes at pointer alignment, which
/// covers every library generation
#[allow(dead_code)]
#[repr(C, align(8))]
struct RawMsg([u8; 64]);

#[allow(dead_code)]
#[repr(C)]
struct PollItemC {
    socket: *mut c_void,
    #[cfg(windows)]
    fd: usize,
    #[cfg(not(windows))]
    fd: c_int,
    events: c_short,
    revents: c_short,
}

type VersionFn = unsafe extern "C" fn(*mut c_int, *mut c_int, *mut c_int);
type ErrnoFn = unsafe extern "C" fn() -> c_int;
type StrerrorFn = unsafe extern "C" fn(c_int) -> *const c_char;
type CtxNewFn = unsafe extern "C" fn() -> *mut c_void;
type InitFn = unsafe extern "C" fn(c_int) -> *mut c_void;
type HandleFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type CtxGetFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
type CtxSetFn = unsafe extern "C" fn(*mut c_void, c_int, c_int) -> c_int;
type SocketFn = unsafe extern "C" fn(*mut c_void, c_int) -> *mut c_void;
type SetOptFn = unsafe extern "C" fn(*mut c_void, c_int, *const c_void, size_t) -> c_int;
type GetOptFn = unsafe extern "C" fn(*mut c_void, c_int, *mut c_void, *mut size_t) -> c_int;
type EndpointFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> c_int;
type MsgFn = unsafe extern "C" fn(*mut RawMsg) -> c_int;
type MsgInitSizeFn = unsafe extern "C" fn(*mut RawMsg, size_t) -> c_int;
type MsgSizeFn = unsafe extern "C" fn(*mut RawMsg) -> size_t;
type MsgDataFn = unsafe extern "C" fn(*mut RawMsg) -> *mut c_void;
type MsgPairFn = unsafe extern "C" fn(*mut RawMsg, *mut RawMsg) -> c_int;
type MsgGetFn = unsafe extern "C" fn(*mut RawMsg, c_int) -> c_int;
type MsgSetFn = unsafe extern "C" fn(*mut RawMsg, c_int, c_int) -> c_int;
type MsgIoFn = unsafe extern "C" fn(*mut RawMsg, *mut c_void, c_int) -> c_int;
type SocketIoFn = unsafe extern "C" fn(*mut c_void, *mut RawMsg, c_int) -> c_int;
type PollFn = unsafe extern "C" fn(*mut PollItemC, c_int, c_long) -> c_int;
type DeviceFn = unsafe extern "C" fn(c_int, *mut c_void, *mut c_void) -> c_int;
type ProxyFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void) -> c_int;

#[derive(Clone, Copy)]
enum ContextCtor {
    New(CtxNewFn),
    Init(InitFn),
}

/// Message send/recv: `zmq_msg_send` order, or the older socket-first calls
#[derive(Clone, Copy)]
enum MessageIo {
    MessageFirst(MsgIoFn),
    SocketFirst(SocketIoFn),
}

#[derive(Clone, Copy)]
enum Forwarder {
    Device(DeviceFn),
    Proxy(ProxyFn),
}

#[derive(Clone, Copy)]
struct Api {
    errno: ErrnoFn,
    strerror: StrerrorFn,
    ctx_new: ContextCtor,
    ctx_destroy: HandleFn,
    ctx_get: Option<CtxGetFn>,
    ctx_set: Option<CtxSetFn>,
    socket: SocketFn,
    close: HandleFn,
    setsockopt: SetOptFn,
    getsockopt: GetOptFn,
    bind: EndpointFn,
    connect: EndpointFn,
    unbind: Option<EndpointFn>,
    disconnect: Option<EndpointFn>,
    msg_init: MsgFn,
    msg_init_size: MsgInitSizeFn,
    msg_close: MsgFn,
    msg_size: MsgSizeFn,
    msg_data: MsgDataFn,
    msg_copy: MsgPairFn,
    msg_move: MsgPairFn,
    msg_get: Option<MsgGetFn>,
    msg_set: Option<MsgSetFn>,
    send: MessageIo,
    recv: MessageIo,
    poll: PollFn,
    forwarder: Option<Forwarder>,
}

/// libzmq loaded at runtime
pub struct NativeTransport {
    api: Api,
    version: Version,
    name: String,
    // Keeps every resolved entry point valid
    _library: Library,
}

unsafe fn required<T: Copy>(library: &Library, name: &str, symbol: &str) -> Result<T, LoadError> {
    library
        .get::<T>(symbol.as_bytes())
        .map(|found| *found)
        .map_err(|_| LoadError::SymbolNotFound {
            library: name.to_string(),
            symbol: symbol.to_string(),
        })
}

unsafe fn optional<T: Copy>(library: &Library, symbol: &str) -> Option<T> {
    library.get::<T>(symbol.as_bytes()).ok().map(|found| *found)
}

impl NativeTransport {
    /// Open `name` through `loader` and resolve the API
    ///
    /// # Safety
    ///
    /// The library found under `name` must be a genuine libzmq: every symbol
    /// is trusted to have the documented C signature.
    pub unsafe fn load(loader: &LibraryLoader, name: &str) -> Result<Self, LoadError> {
        let library = loader.open(name)?;

        let zmq_version: VersionFn = required(&library, name, "zmq_version")?;
        let (mut major, mut minor, mut patch) = (0, 0, 0);
        zmq_version(&mut major, &mut minor, &mut patch);
        let version = Version::new(
            u32::try_from(major).unwrap_or(0),
            u32::try_from(minor).unwrap_or(0),
            u32::try_from(patch).unwrap_or(0),
        );

        let ctx_new = match optional::<CtxNewFn>(&library, "zmq_ctx_new") {
            Some(ctor) => ContextCtor::New(ctor),
            None => ContextCtor::Init(required(&library, name, "zmq_init")?),
        };
        let ctx_destroy = match optional::<HandleFn>(&library, "zmq_ctx_destroy") {
            Some(destroy) => destroy,
            None => required(&library, name, "zmq_term")?,
        };
        let send = match optional::<MsgIoFn>(&library, "zmq_msg_send") {
            Some(send) => MessageIo::MessageFirst(send),
            None => MessageIo::SocketFirst(socket_first(&library, name, version, "zmq_sendmsg", "zmq_send")?),
        };
        let recv = match optional::<MsgIoFn>(&library, "zmq_msg_recv") {
            Some(recv) => MessageIo::MessageFirst(recv),
            None => MessageIo::SocketFirst(socket_first(&library, name, version, "zmq_recvmsg", "zmq_recv")?),
        };
        let forwarder = optional::<DeviceFn>(&library, "zmq_device")
            .map(Forwarder::Device)
            .or_else(|| optional::<ProxyFn>(&library, "zmq_proxy").map(Forwarder::Proxy));

        let api = Api {
            errno: required(&library, name, "zmq_errno")?,
            strerror: required(&library, name, "zmq_strerror")?,
            ctx_new,
            ctx_destroy,
            ctx_get: optional(&library, "zmq_ctx_get"),
            ctx_set: optional(&library, "zmq_ctx_set"),
            socket: required(&library, name, "zmq_socket")?,
            close: required(&library, name, "zmq_close")?,
            setsockopt: required(&library, name, "zmq_setsockopt")?,
            getsockopt: required(&library, name, "zmq_getsockopt")?,
            bind: required(&library, name, "zmq_bind")?,
            connect: required(&library, name, "zmq_connect")?,
            unbind: optional(&library, "zmq_unbind"),
            disconnect: optional(&library, "zmq_disconnect"),
            msg_init: required(&library, name, "zmq_msg_init")?,
            msg_init_size: required(&library, name, "zmq_msg_init_size")?,
            msg_close: required(&library, name, "zmq_msg_close")?,
            msg_size: required(&library, name, "zmq_msg_size")?,
            msg_data: required(&library, name, "zmq_msg_data")?,
            msg_copy: required(&library, name, "zmq_msg_copy")?,
            msg_move: required(&library, name, "zmq_msg_move")?,
            msg_get: optional(&library, "zmq_msg_get"),
            msg_set: optional(&library, "zmq_msg_set"),
            send,
            recv,
            poll: required(&library, name, "zmq_poll")?,
            forwarder,
        };

        tracing::info!(%version, library = name, "loaded native messaging library");
        Ok(Self {
            api,
            version,
            name: name.to_string(),
            _library: library,
        })
    }

    fn last_error(&self) -> i32 {
        unsafe { (self.api.errno)() }
    }

    fn check(&self, rc: c_int) -> RawResult<c_int> {
        if rc < 0 {
            Err(self.last_error())
        } else {
            Ok(rc)
        }
    }

    fn descriptor<T>(&self, ptr: *mut T) -> RawResult<RawDescriptor> {
        RawDescriptor::from_ptr(ptr).ok_or_else(|| self.last_error())
    }
}

/// `zmq_sendmsg`-style symbol; the 2.x library names it `zmq_send`
unsafe fn socket_first(
    library: &Library,
    name: &str,
    version: Version,
    modern: &str,
    legacy: &str,
) -> Result<SocketIoFn, LoadError> {
    if let Some(found) = optional(library, modern) {
        return Ok(found);
    }
    if version.major < 3 {
        return required(library, name, legacy);
    }
    Err(LoadError::SymbolNotFound {
        library: name.to_string(),
        symbol: modern.to_string(),
    })
}

impl fmt::Debug for NativeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeTransport")
            .field("library", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

impl Transport for NativeTransport {
    fn backend(&self) -> &'static str {
        "native"
    }

    fn version(&self) -> Version {
        self.version
    }

    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::for_version(self.version);
        if self.api.ctx_get.is_none() || self.api.ctx_set.is_none() {
            caps = caps.without(Feature::ContextOptions);
        }
        if self.api.unbind.is_none() {
            caps = caps.without(Feature::Unbind);
        }
        if self.api.disconnect.is_none() {
            caps = caps.without(Feature::Disconnect);
        }
        if self.api.msg_get.is_none() {
            caps = caps.without(Feature::MessageGet);
        }
        if self.api.msg_set.is_none() {
            caps = caps.without(Feature::MessageSet);
        }
        if self.api.forwarder.is_none() {
            caps = caps.without(Feature::Device);
        }
        caps
    }

    fn strerror(&self, code: i32) -> String {
        let text = unsafe { (self.api.strerror)(code) };
        if text.is_null() {
            return format!("error {code}");
        }
        unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
    }

    fn context_new(&self, io_threads: i32) -> RawResult<RawDescriptor> {
        match self.api.ctx_new {
            ContextCtor::New(ctor) => {
                let context = self.descriptor(unsafe { ctor() })?;
                if io_threads != ctxopt::IO_THREADS_DFLT {
                    if let Some(set) = self.api.ctx_set {
                        let rc = unsafe { set(context.as_ptr(), ctxopt::IO_THREADS, io_threads) };
                        if let Err(code) = self.check(rc) {
                            unsafe { (self.api.ctx_destroy)(context.as_ptr()) };
                            return Err(code);
                        }
                    }
                }
                Ok(context)
            }
            ContextCtor::Init(init) => self.descriptor(unsafe { init(io_threads) }),
        }
    }

    fn context_destroy(&self, context: RawDescriptor) -> RawResult<()> {
        self.check(unsafe { (self.api.ctx_destroy)(context.as_ptr()) })
            .map(drop)
    }

    fn context_get(&self, context: RawDescriptor, option: i32) -> RawResult<i32> {
        let get = self.api.ctx_get.ok_or(errno::ENOTSUP)?;
        self.check(unsafe { get(context.as_ptr(), option) })
    }

    fn context_set(&self, context: RawDescriptor, option: i32, value: i32) -> RawResult<()> {
        let set = self.api.ctx_set.ok_or(errno::ENOTSUP)?;
        self.check(unsafe { set(context.as_ptr(), option, value) })
            .map(drop)
    }

    fn socket_new(&self, context: RawDescriptor, kind: i32) -> RawResult<RawDescriptor> {
        self.descriptor(unsafe { (self.api.socket)(context.as_ptr(), kind) })
    }

    fn socket_close(&self, socket: RawDescriptor) -> RawResult<()> {
        self.check(unsafe { (self.api.close)(socket.as_ptr()) })
            .map(drop)
    }

    fn get_option(&self, socket: RawDescriptor, option: i32, buf: &mut [u8]) -> RawResult<usize> {
        let mut len: size_t = buf.len();
        let rc = unsafe {
            (self.api.getsockopt)(
                socket.as_ptr(),
                option,
                buf.as_mut_ptr().cast::<c_void>(),
                &mut len,
            )
        };
        self.check(rc).map(|_| len)
    }

    fn set_option(&self, socket: RawDescriptor, option: i32, value: &[u8]) -> RawResult<()> {
        let rc = unsafe {
            (self.api.setsockopt)(
                socket.as_ptr(),
                option,
                value.as_ptr().cast::<c_void>(),
                value.len(),
            )
        };
        self.check(rc).map(drop)
    }

    fn endpoint(&self, socket: RawDescriptor, op: EndpointOp, address: &str) -> RawResult<()> {
        let call = match op {
            EndpointOp::Bind => self.api.bind,
            EndpointOp::Connect => self.api.connect,
            EndpointOp::Unbind => self.api.unbind.ok_or(errno::ENOTSUP)?,
            EndpointOp::Disconnect => self.api.disconnect.ok_or(errno::ENOTSUP)?,
        };
        let address = CString::new(address).map_err(|_| errno::EINVAL)?;
        self.check(unsafe { call(socket.as_ptr(), address.as_ptr()) })
            .map(drop)
    }

    fn message_init(&self, size: Option<usize>) -> RawResult<RawDescriptor> {
        let msg = Box::into_raw(Box::new(RawMsg([0; 64])));
        let rc = unsafe {
            match size {
                None => (self.api.msg_init)(msg),
                Some(size) => (self.api.msg_init_size)(msg, size),
            }
        };
        if let Err(code) = self.check(rc) {
            drop(unsafe { Box::from_raw(msg) });
            return Err(code);
        }
        if let Some(size) = size {
            let data = unsafe { (self.api.msg_data)(msg) }.cast::<u8>();
            if !data.is_null() {
                unsafe { std::ptr::write_bytes(data, 0, size) };
            }
        }
        RawDescriptor::from_ptr(msg).ok_or(errno::EFAULT)
    }

    fn message_close(&self, message: RawDescriptor) -> RawResult<()> {
        let msg = message.as_ptr::<RawMsg>();
        let rc = unsafe { (self.api.msg_close)(msg) };
        drop(unsafe { Box::from_raw(msg) });
        self.check(rc).map(drop)
    }

    fn message_size(&self, message: RawDescriptor) -> usize {
        unsafe { (self.api.msg_size)(message.as_ptr()) }
    }

    fn message_data(&self, message: RawDescriptor) -> Vec<u8> {
        let size = self.message_size(message);
        let data = unsafe { (self.api.msg_data)(message.as_ptr()) }.cast::<u8>();
        if data.is_null() || size == 0 {
            return Vec::new();
        }
        unsafe { std::slice::from_raw_parts(data, size) }.to_vec()
    }

    fn message_write(&self, message: RawDescriptor, content: &[u8]) {
        let size = self.message_size(message);
        let data = unsafe { (self.api.msg_data)(message.as_ptr()) }.cast::<u8>();
        if data.is_null() {
            return;
        }
        let len = content.len().min(size);
        unsafe { std::ptr::copy_nonoverlapping(content.as_ptr(), data, len) };
    }

    fn message_copy(&self, dest: RawDescriptor, src: RawDescriptor) -> RawResult<()> {
        self.check(unsafe { (self.api.msg_copy)(dest.as_ptr(), src.as_ptr()) })
            .map(drop)
    }

    fn message_move(&self, dest: RawDescriptor, src: RawDescriptor) -> RawResult<()> {
        self.check(unsafe { (self.api.msg_move)(dest.as_ptr(), src.as_ptr()) })
            .map(drop)
    }

    fn message_get(&self, message: RawDescriptor, option: i32) -> RawResult<i32> {
        let get = self.api.msg_get.ok_or(errno::ENOTSUP)?;
        self.check(unsafe { get(message.as_ptr(), option) })
    }

    fn message_set(&self, message: RawDescriptor, option: i32, value: i32) -> RawResult<()> {
        let set = self.api.msg_set.ok_or(errno::ENOTSUP)?;
        self.check(unsafe { set(message.as_ptr(), option, value) })
            .map(drop)
    }

    fn send(&self, message: RawDescriptor, socket: RawDescriptor, flags: u32) -> RawResult<usize> {
        let flags = c_int::try_from(flags).map_err(|_| errno::EINVAL)?;
        match self.api.send {
            MessageIo::MessageFirst(send) => {
                let sent = self.check(unsafe { send(message.as_ptr(), socket.as_ptr(), flags) })?;
                Ok(usize::try_from(sent).unwrap_or(0))
            }
            MessageIo::SocketFirst(send) => {
                // The content is gone after a successful send
                let size = self.message_size(message);
                self.check(unsafe { send(socket.as_ptr(), message.as_ptr(), flags) })?;
                Ok(size)
            }
        }
    }

    fn recv(&self, message: RawDescriptor, socket: RawDescriptor, flags: u32) -> RawResult<usize> {
        let flags = c_int::try_from(flags).map_err(|_| errno::EINVAL)?;
        match self.api.recv {
            MessageIo::MessageFirst(recv) => {
                let got = self.check(unsafe { recv(message.as_ptr(), socket.as_ptr(), flags) })?;
                Ok(usize::try_from(got).unwrap_or(0))
            }
            MessageIo::SocketFirst(recv) => {
                self.check(unsafe { recv(socket.as_ptr(), message.as_ptr(), flags) })?;
                Ok(self.message_size(message))
            }
        }
    }

    fn poll(&self, items: &mut [RawPollItem], timeout_ms: i64) -> RawResult<usize> {
        let mut native: Vec<PollItemC> = items
            .iter()
            .map(|item| PollItemC {
                socket: item.socket.as_ptr(),
                fd: 0,
                events: item.events as c_short,
                revents: 0,
            })
            .collect();
        let count = c_int::try_from(native.len()).map_err(|_| errno::EINVAL)?;
        // 2.x counts the timeout in microseconds
        let timeout = if self.version.major < 3 && timeout_ms > 0 {
            timeout_ms.saturating_mul(1000)
        } else {
            timeout_ms
        };
        let timeout = c_long::try_from(timeout).unwrap_or(c_long::MAX);

        let ready = self.check(unsafe { (self.api.poll)(native.as_mut_ptr(), count, timeout) })?;
        for (item, polled) in items.iter_mut().zip(&native) {
            item.revents = polled.revents as u16;
        }
        Ok(usize::try_from(ready).unwrap_or(0))
    }

    fn device(&self, kind: i32, frontend: RawDescriptor, backend: RawDescriptor) -> RawResult<()> {
        let rc = match self.api.forwarder.ok_or(errno::ENOTSUP)? {
            Forwarder::Device(device) => unsafe { device(kind, frontend.as_ptr(), backend.as_ptr()) },
            Forwarder::Proxy(proxy) => unsafe {
                proxy(frontend.as_ptr(), backend.as_ptr(), std::ptr::null_mut())
            },
        };
        self.check(rc).map(drop)
    }
}

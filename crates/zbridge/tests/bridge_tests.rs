//! Host-level tests: every operation driven through `Bridge::call_named`
//! against the in-process library.

mod common;

use common::*;
#[allow(unused_imports)]
use common::{assert_eq, assert_ne};
use std::sync::Arc;
use std::thread;
use zbridge::codes::errno;
use zbridge::{Bridge, BridgeError, MemoryTransport, Session, Term, Version};

fn bridge() -> Bridge {
    Bridge::new(Session::new(Arc::new(MemoryTransport::new())))
}

fn call(bridge: &Bridge, name: &str, args: &[Term]) -> Term {
    match bridge.call_named(name, args) {
        Ok(term) => term,
        Err(e) => panic!("{} failed: {}", name, e),
    }
}

fn no_flags() -> Term {
    Term::list([])
}

fn completed() -> Term {
    Term::tuple([Term::Bool(true), Term::Bool(false)])
}

fn would_block() -> Term {
    Term::tuple([Term::Bool(false), Term::Bool(false)])
}

/// Context plus a bound/connected socket pair
fn linked(bridge: &Bridge, bound: &str, connected: &str, endpoint: &str) -> (Term, Term, Term) {
    let ctx = call(bridge, "ctxNew", &[Term::int(1)]);
    let a = call(bridge, "socket", &[ctx.clone(), Term::atom(bound)]);
    let b = call(bridge, "socket", &[ctx.clone(), Term::atom(connected)]);
    call(bridge, "bind", &[a.clone(), Term::string(endpoint)]);
    call(bridge, "connect", &[b.clone(), Term::string(endpoint)]);
    (ctx, a, b)
}

fn send(bridge: &Bridge, socket: &Term, data: &[u8], flags: Term) -> Term {
    let message = call(bridge, "msgCreateWithData", &[Term::bytes(data)]);
    let outcome = call(bridge, "msgSend", &[message.clone(), socket.clone(), flags]);
    call(bridge, "msgClose", &[message]);
    outcome
}

fn recv(bridge: &Bridge, socket: &Term, flags: Term) -> (Term, Option<Vec<u8>>) {
    let message = call(bridge, "msgCreate", &[]);
    call(bridge, "msgInit", &[message.clone()]);
    let outcome = call(bridge, "msgRecv", &[message.clone(), socket.clone(), flags]);
    let data = match &outcome {
        Term::Tuple(parts) if parts[0] == Term::Bool(true) => {
            match call(bridge, "msgData", &[message.clone()]) {
                Term::Bytes(data) => Some(data),
                other => panic!("msgData returned {:?}", other),
            }
        }
        _ => None,
    };
    call(bridge, "msgClose", &[message]);
    (outcome, data)
}

// ============================================================
// Messaging patterns
// ============================================================

#[test]
fn test_pair_round_trip() {
    let bridge = bridge();
    let (_ctx, a, b) = linked(&bridge, "pair", "pair", "inproc://pair");

    assert_eq!(send(&bridge, &b, b"hello", no_flags()), completed());
    let (outcome, data) = recv(&bridge, &a, no_flags());

    assert_eq!(outcome, completed());
    assert_eq!(data, Some(b"hello".to_vec()));
}

#[test]
fn test_request_reply() {
    let bridge = bridge();
    let (_ctx, rep, req) = linked(&bridge, "rep", "req", "inproc://rr");

    send(&bridge, &req, b"ping", no_flags());
    assert_eq!(recv(&bridge, &rep, no_flags()).1, Some(b"ping".to_vec()));
    send(&bridge, &rep, b"pong", no_flags());
    assert_eq!(recv(&bridge, &req, no_flags()).1, Some(b"pong".to_vec()));
}

#[test]
fn test_reply_before_request_is_efsm() {
    let bridge = bridge();
    let (_ctx, rep, _req) = linked(&bridge, "rep", "req", "inproc://efsm");
    let message = call(&bridge, "msgCreateWithData", &[Term::bytes(b"early".to_vec())]);

    match bridge.call_named("msgSend", &[message, rep, no_flags()]) {
        Err(BridgeError::TransportFailure { code, name, .. }) => {
            assert_eq!(code, errno::EFSM);
            assert_eq!(name, Some("EFSM"));
        }
        other => panic!("expected EFSM, got {:?}", other),
    }
}

#[test]
fn test_publish_subscribe_filters_by_prefix() {
    let bridge = bridge();
    let (_ctx, publisher, subscriber) = linked(&bridge, "pub", "sub", "inproc://news");
    let applied = call(
        &bridge,
        "setsockopt",
        &[
            subscriber.clone(),
            Term::atom("subscribe"),
            Term::int(0),
            Term::bytes(b"weather".to_vec()),
        ],
    );
    assert_eq!(applied, Term::Bool(false));

    send(&bridge, &publisher, b"sports: goal", no_flags());
    send(&bridge, &publisher, b"weather: sunny", no_flags());

    let (_, first) = recv(&bridge, &subscriber, Term::atom("dontwait"));
    assert_eq!(first, Some(b"weather: sunny".to_vec()));
    let (outcome, _) = recv(&bridge, &subscriber, Term::atom("dontwait"));
    assert_eq!(outcome, would_block());
}

#[test]
fn test_multipart_sets_rcvmore() {
    let bridge = bridge();
    let (_ctx, pull, push) = linked(&bridge, "pull", "push", "inproc://parts");

    send(&bridge, &push, b"head", Term::list([Term::atom("sndmore")]));
    send(&bridge, &push, b"tail", no_flags());

    let rcvmore = |bridge: &Bridge| {
        call(
            bridge,
            "getsockopt",
            &[pull.clone(), Term::atom("rcvmore"), Term::atom("int")],
        )
    };
    assert_eq!(recv(&bridge, &pull, no_flags()).1, Some(b"head".to_vec()));
    assert_eq!(rcvmore(&bridge), Term::int(1));
    assert_eq!(recv(&bridge, &pull, no_flags()).1, Some(b"tail".to_vec()));
    assert_eq!(rcvmore(&bridge), Term::int(0));
}

#[test]
fn test_dontwait_recv_on_empty_socket() {
    let bridge = bridge();
    let (_ctx, pull, _push) = linked(&bridge, "pull", "push", "inproc://idle");

    let (outcome, data) = recv(&bridge, &pull, Term::atom("noblock"));
    assert_eq!(outcome, would_block());
    assert_eq!(data, None);
}

// ============================================================
// Options and endpoints
// ============================================================

#[test]
fn test_last_endpoint_is_nul_terminated() {
    let bridge = bridge();
    let (_ctx, bound, _connected) = linked(&bridge, "pull", "push", "inproc://named");

    let value = call(
        &bridge,
        "getsockopt",
        &[bound, Term::atom("lastEndpoint"), Term::int(64)],
    );
    assert_eq!(value, Term::bytes(b"inproc://named\0".to_vec()));
}

#[test]
fn test_context_options() {
    let bridge = bridge();
    let ctx = call(&bridge, "ctxNew", &[Term::int(2)]);

    assert_eq!(
        call(&bridge, "ctxGet", &[ctx.clone(), Term::atom("ioThreads")]),
        Term::int(2)
    );
    call(
        &bridge,
        "ctxSet",
        &[ctx.clone(), Term::atom("maxSockets"), Term::int(16)],
    );
    assert_eq!(
        call(&bridge, "ctxGet", &[ctx, Term::atom("maxSockets")]),
        Term::int(16)
    );
}

#[test]
fn test_unbind_frees_endpoint() {
    let bridge = bridge();
    let ctx = call(&bridge, "ctxNew", &[Term::int(1)]);
    let first = call(&bridge, "socket", &[ctx.clone(), Term::atom("pull")]);
    let second = call(&bridge, "socket", &[ctx.clone(), Term::atom("pull")]);
    call(&bridge, "bind", &[first.clone(), Term::string("inproc://reuse")]);

    let clash = bridge.call_named("bind", &[second.clone(), Term::string("inproc://reuse")]);
    assert_eq!(clash.unwrap_err().code(), Some(errno::EADDRINUSE));

    call(&bridge, "unbind", &[first, Term::string("inproc://reuse")]);
    call(&bridge, "bind", &[second, Term::string("inproc://reuse")]);
}

#[test]
fn test_incompatible_socket_types() {
    let bridge = bridge();
    let ctx = call(&bridge, "ctxNew", &[Term::int(1)]);
    let publisher = call(&bridge, "socket", &[ctx.clone(), Term::atom("pub")]);
    let pull = call(&bridge, "socket", &[ctx.clone(), Term::atom("pull")]);
    call(&bridge, "bind", &[publisher.clone(), Term::string("inproc://mismatch")]);

    let result = bridge.call_named("connect", &[pull, Term::string("inproc://mismatch")]);
    assert_eq!(result.unwrap_err().code(), Some(errno::ENOCOMPATPROTO));
}

// ============================================================
// Messages
// ============================================================

#[test]
fn test_message_size_and_data() {
    let bridge = bridge();
    let message = call(&bridge, "msgCreate", &[]);
    call(&bridge, "msgInitSize", &[message.clone(), Term::int(4)]);

    assert_eq!(call(&bridge, "msgSize", &[message.clone()]), Term::int(4));
    assert_eq!(
        call(&bridge, "msgData", &[message.clone()]),
        Term::bytes(vec![0u8; 4])
    );
    call(&bridge, "msgSetData", &[message.clone(), Term::bytes(b"abcd".to_vec())]);
    assert_eq!(
        call(&bridge, "msgData", &[message]),
        Term::bytes(b"abcd".to_vec())
    );
}

#[test]
fn test_set_data_size_mismatch() {
    let bridge = bridge();
    let message = call(&bridge, "msgCreateWithData", &[Term::bytes(b"abc".to_vec())]);

    let result = bridge.call_named("msgSetData", &[message, Term::bytes(b"abcd".to_vec())]);
    assert!(matches!(
        result,
        Err(BridgeError::InvalidArgument { position: 1, .. })
    ));
}

#[test]
fn test_move_empties_source() {
    let bridge = bridge();
    let src = call(&bridge, "msgCreateWithData", &[Term::bytes(b"cargo".to_vec())]);
    let dest = call(&bridge, "msgCreate", &[]);
    call(&bridge, "msgInit", &[dest.clone()]);

    call(&bridge, "msgMove", &[dest.clone(), src.clone()]);
    assert_eq!(call(&bridge, "msgData", &[dest]), Term::bytes(b"cargo".to_vec()));
    assert_eq!(call(&bridge, "msgSize", &[src]), Term::int(0));
}

#[test]
fn test_copy_keeps_source() {
    let bridge = bridge();
    let src = call(&bridge, "msgCreateWithData", &[Term::bytes(b"twice".to_vec())]);
    let dest = call(&bridge, "msgCreate", &[]);
    call(&bridge, "msgInit", &[dest.clone()]);

    call(&bridge, "msgCopy", &[dest.clone(), src.clone()]);
    assert_eq!(call(&bridge, "msgData", &[dest]), Term::bytes(b"twice".to_vec()));
    assert_eq!(call(&bridge, "msgData", &[src]), Term::bytes(b"twice".to_vec()));
}

#[test]
fn test_move_onto_itself_is_noop() {
    let bridge = bridge();
    let message = call(&bridge, "msgCreateWithData", &[Term::bytes(b"self".to_vec())]);

    call(&bridge, "msgMove", &[message.clone(), message.clone()]);
    assert_eq!(call(&bridge, "msgData", &[message]), Term::bytes(b"self".to_vec()));
}

#[test]
fn test_message_more_property() {
    let bridge = bridge();
    let message = call(&bridge, "msgCreateWithData", &[Term::bytes(b"x".to_vec())]);
    assert_eq!(
        call(&bridge, "msgGet", &[message.clone(), Term::atom("more")]),
        Term::int(0)
    );

    let result = bridge.call_named("msgSet", &[message, Term::atom("more"), Term::int(1)]);
    assert_eq!(result.unwrap_err().code(), Some(errno::EINVAL));
}

// ============================================================
// Polling
// ============================================================

#[test]
fn test_poll_reports_ready_payloads() {
    let bridge = bridge();
    let (_ctx, pull, push) = linked(&bridge, "pull", "push", "inproc://poll");
    send(&bridge, &push, b"job", no_flags());

    let items = Term::list([
        Term::tuple([push.clone(), Term::atom("pollin"), Term::atom("push")]),
        Term::tuple([pull, Term::atom("pollin"), Term::atom("pull")]),
    ]);
    let result = call(&bridge, "poll", &[items, Term::int(0)]);

    assert_eq!(
        result,
        Term::tuple([
            Term::Bool(true),
            Term::list([Term::tuple([
                Term::list([Term::atom("pollin")]),
                Term::atom("pull"),
            ])]),
            Term::Unit,
        ])
    );
}

#[test]
fn test_poll_timeout_with_nothing_ready() {
    let bridge = bridge();
    let (_ctx, pull, _push) = linked(&bridge, "pull", "push", "inproc://quiet");

    let items = Term::list([Term::tuple([pull, Term::atom("pollin"), Term::Unit])]);
    let result = call(&bridge, "poll", &[items, Term::int(0)]);

    assert_eq!(
        result,
        Term::tuple([Term::Bool(false), Term::list([]), Term::Unit])
    );
}

#[test]
fn test_poll_rejects_malformed_items() {
    let bridge = bridge();
    let items = Term::list([Term::tuple([Term::int(1), Term::atom("pollin")])]);

    assert!(matches!(
        bridge.call_named("poll", &[items, Term::int(0)]),
        Err(BridgeError::InvalidArgument { position: 0, .. })
    ));
}

// ============================================================
// Argument validation
// ============================================================

#[test]
fn test_unknown_socket_type() {
    let bridge = bridge();
    let ctx = call(&bridge, "ctxNew", &[Term::int(1)]);

    match bridge.call_named("socket", &[ctx, Term::atom("teapot")]) {
        Err(BridgeError::InvalidArgument { position, expected }) => {
            assert_eq!(position, 1);
            assert_eq!(expected, "socket types");
        }
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
}

#[test]
fn test_unknown_send_flag() {
    let bridge = bridge();
    let (_ctx, _pull, push) = linked(&bridge, "pull", "push", "inproc://flags");
    let message = call(&bridge, "msgCreateWithData", &[Term::bytes(b"x".to_vec())]);

    let result = bridge.call_named("msgSend", &[message, push, Term::atom("urgent")]);
    assert!(matches!(
        result,
        Err(BridgeError::InvalidArgument { position: 2, .. })
    ));
}

#[test]
fn test_wrong_handle_type() {
    let bridge = bridge();
    let message = call(&bridge, "msgCreate", &[]);

    assert!(matches!(
        bridge.call_named("bind", &[message, Term::string("inproc://x")]),
        Err(BridgeError::InvalidArgument { position: 0, .. })
    ));
}

#[test]
fn test_closed_socket_is_already_closed() {
    let bridge = bridge();
    let ctx = call(&bridge, "ctxNew", &[Term::int(1)]);
    let socket = call(&bridge, "socket", &[ctx.clone(), Term::atom("pub")]);
    call(&bridge, "close", &[socket.clone()]);
    call(&bridge, "close", &[socket.clone()]);

    assert!(matches!(
        bridge.call_named("bind", &[socket, Term::string("inproc://late")]),
        Err(BridgeError::AlreadyClosed { kind: "Socket" })
    ));
}

// ============================================================
// Version gating
// ============================================================

#[test]
fn test_version_record() {
    let bridge = bridge();
    let version = call(&bridge, "version", &[]);

    assert_eq!(version.field("major"), Some(&Term::int(4)));
    assert_eq!(version.field("minor"), Some(&Term::int(3)));
}

#[test]
fn test_old_library_gates_operations() {
    let bridge = Bridge::new(Session::new(Arc::new(MemoryTransport::with_version(
        Version::new(3, 0, 0),
    ))));
    let ctx = call(&bridge, "ctxNew", &[Term::int(1)]);
    let socket = call(&bridge, "socket", &[ctx.clone(), Term::atom("pull")]);
    call(&bridge, "bind", &[socket.clone(), Term::string("inproc://old")]);

    match bridge.call_named("ctxGet", &[ctx.clone(), Term::atom("ioThreads")]) {
        Err(BridgeError::Unsupported { operation, required }) => {
            assert_eq!(operation, "ctxGet");
            assert_eq!(required, ">= 3.1.1");
        }
        other => panic!("expected Unsupported, got {:?}", other),
    }
    assert!(matches!(
        bridge.call_named("unbind", &[socket.clone(), Term::string("inproc://old")]),
        Err(BridgeError::Unsupported { .. })
    ));
    assert!(matches!(
        bridge.call_named(
            "getsockopt",
            &[socket, Term::atom("lastEndpoint"), Term::int(64)]
        ),
        Err(BridgeError::Unsupported { .. })
    ));
}

// ============================================================
// Devices
// ============================================================

#[test]
fn test_streamer_device_forwards_until_terminated() {
    let bridge = bridge();
    let ctx = call(&bridge, "ctxNew", &[Term::int(1)]);
    let front = call(&bridge, "socket", &[ctx.clone(), Term::atom("pull")]);
    let back = call(&bridge, "socket", &[ctx.clone(), Term::atom("push")]);
    let producer = call(&bridge, "socket", &[ctx.clone(), Term::atom("push")]);
    let worker = call(&bridge, "socket", &[ctx.clone(), Term::atom("pull")]);
    call(&bridge, "bind", &[front.clone(), Term::string("inproc://in")]);
    call(&bridge, "bind", &[back.clone(), Term::string("inproc://out")]);
    call(&bridge, "connect", &[producer.clone(), Term::string("inproc://in")]);
    call(&bridge, "connect", &[worker.clone(), Term::string("inproc://out")]);

    let device_bridge = bridge.clone();
    let device = thread::spawn(move || {
        device_bridge.call_named("device", &[Term::atom("streamer"), front, back])
    });

    send(&bridge, &producer, b"task-1", no_flags());
    send(&bridge, &producer, b"task-2", no_flags());
    assert_eq!(recv(&bridge, &worker, no_flags()).1, Some(b"task-1".to_vec()));
    assert_eq!(recv(&bridge, &worker, no_flags()).1, Some(b"task-2".to_vec()));

    assert_eq!(call(&bridge, "ctxDestroy", &[ctx]), Term::Bool(false));
    let stopped = device.join().unwrap();
    assert_eq!(stopped.unwrap_err().code(), Some(errno::ETERM));
}

#[test]
fn test_unknown_device_type() {
    let bridge = bridge();
    let (_ctx, a, b) = linked(&bridge, "pull", "push", "inproc://dev");

    assert!(matches!(
        bridge.call_named("device", &[Term::atom("blender"), a, b]),
        Err(BridgeError::InvalidArgument { position: 0, .. })
    ));
}

//! Socket option encoding tests against the in-process transport

mod common;

use common::*;
#[allow(unused_imports)]
use common::{assert_eq, assert_ne};
use proptest::prelude::*;
use rstest::rstest;
use std::sync::Arc;
use zbridge::codes::socket_type;
use zbridge::tables::{resolve_option, OptionDomain};
use zbridge::{
    BridgeError, CallOutcome, Context, MemoryTransport, OptionValue, Primitive, Session, Socket,
    Term, TypeSelector, Version,
};

fn socket() -> (Context, Socket) {
    let session = Session::new(Arc::new(MemoryTransport::new()));
    let ctx = Context::new(session, 1).unwrap();
    let socket = ctx.socket(socket_type::SUB).unwrap();
    (ctx, socket)
}

fn round_trip(socket: &Socket, name: &str, selector: TypeSelector, value: OptionValue) -> OptionValue {
    let version = socket.session().capabilities().version();
    let option = resolve_option(OptionDomain::Socket, name, version, 1).unwrap();
    assert_eq!(
        socket.set_option(option, selector, &value).unwrap(),
        CallOutcome::Completed(())
    );
    socket
        .get_option(option, selector)
        .unwrap()
        .completed()
        .unwrap()
}

// ============================================================
// Fixed-width encodings
// ============================================================

#[rstest]
#[case("sndhwm", Primitive::Int, OptionValue::Int32(0))]
#[case("sndhwm", Primitive::Int, OptionValue::Int32(-1))]
#[case("rcvhwm", Primitive::Int, OptionValue::Int32(i32::MAX))]
#[case("maxmsgsize", Primitive::Int64, OptionValue::Int64(0))]
#[case("maxmsgsize", Primitive::Int64, OptionValue::Int64(-1))]
#[case("maxmsgsize", Primitive::Int64, OptionValue::Int64(i64::MAX))]
#[case("affinity", Primitive::UInt64, OptionValue::UInt64(0))]
#[case("affinity", Primitive::UInt64, OptionValue::UInt64(u64::MAX))]
fn test_primitive_round_trip(
    #[case] name: &str,
    #[case] primitive: Primitive,
    #[case] value: OptionValue,
) {
    let (_ctx, socket) = socket();
    let read = round_trip(&socket, name, TypeSelector::Primitive(primitive), value.clone());
    assert_eq!(read, value);
}

#[test]
fn test_linger_as_int64() {
    let (_ctx, socket) = socket();
    let read = round_trip(
        &socket,
        "linger",
        TypeSelector::Primitive(Primitive::Int64),
        OptionValue::Int64(5000),
    );
    assert_eq!(read, OptionValue::Int64(5000));
    assert_eq!(read.to_term(), Term::int(5000));
}

#[test]
fn test_default_linger_reads_as_minus_one() {
    let (_ctx, socket) = socket();
    let version = socket.session().capabilities().version();
    let option = resolve_option(OptionDomain::Socket, "linger", version, 1).unwrap();
    let read = socket
        .get_option(option, TypeSelector::Primitive(Primitive::Int))
        .unwrap();
    assert_eq!(read, CallOutcome::Completed(OptionValue::Int32(-1)));
}

#[test]
fn test_type_option_reports_socket_kind() {
    let (_ctx, socket) = socket();
    let version = socket.session().capabilities().version();
    let option = resolve_option(OptionDomain::Socket, "type", version, 1).unwrap();
    let read = socket
        .get_option(option, TypeSelector::Primitive(Primitive::Int))
        .unwrap();
    assert_eq!(read, CallOutcome::Completed(OptionValue::Int32(socket_type::SUB)));
}

// ============================================================
// Byte buffers
// ============================================================

#[test]
fn test_identity_five_byte_buffer() {
    let (_ctx, socket) = socket();
    let read = round_trip(
        &socket,
        "identity",
        TypeSelector::Buffer(5),
        OptionValue::Bytes(b"node1".to_vec()),
    );
    assert_eq!(read, OptionValue::Bytes(b"node1".to_vec()));
}

#[test]
fn test_buffer_result_uses_reported_length() {
    let (_ctx, socket) = socket();
    let read = round_trip(
        &socket,
        "identity",
        TypeSelector::Buffer(255),
        OptionValue::Bytes(b"ab".to_vec()),
    );
    assert_eq!(read, OptionValue::Bytes(b"ab".to_vec()));
}

#[test]
fn test_buffer_too_small_is_transport_failure() {
    let (_ctx, socket) = socket();
    round_trip(
        &socket,
        "identity",
        TypeSelector::Buffer(5),
        OptionValue::Bytes(b"node1".to_vec()),
    );
    let version = socket.session().capabilities().version();
    let option = resolve_option(OptionDomain::Socket, "identity", version, 1).unwrap();

    let err = socket.get_option(option, TypeSelector::Buffer(3)).unwrap_err();
    assert_eq!(err.code(), Some(zbridge::codes::errno::EINVAL));
}

#[test]
fn test_buffer_selector_rejects_integer_value() {
    let (_ctx, socket) = socket();
    let version = socket.session().capabilities().version();
    let option = resolve_option(OptionDomain::Socket, "identity", version, 1).unwrap();

    let result = socket.set_option(option, TypeSelector::Buffer(4), &OptionValue::Int32(4));
    assert!(matches!(
        result,
        Err(BridgeError::InvalidArgument { position: 3, .. })
    ));
}

// ============================================================
// Host value decoding
// ============================================================

#[rstest]
#[case(Primitive::UInt32, Term::int(-1))]
#[case(Primitive::UInt64, Term::int(-1))]
#[case(Primitive::Int, Term::int(i64::from(i32::MAX) + 1))]
#[case(Primitive::Int64, Term::atom("five"))]
fn test_out_of_range_host_value(#[case] primitive: Primitive, #[case] term: Term) {
    let result = OptionValue::from_term(TypeSelector::Primitive(primitive), &term, 3);
    assert!(matches!(
        result,
        Err(BridgeError::InvalidArgument { position: 3, .. })
    ));
}

#[test]
fn test_uint32_decodes_into_uint64() {
    let value =
        OptionValue::from_term(TypeSelector::Primitive(Primitive::UInt32), &Term::int(7), 3)
            .unwrap();
    assert_eq!(value, OptionValue::UInt64(7));
}

#[test]
fn test_string_becomes_bytes_for_buffer_selector() {
    let value =
        OptionValue::from_term(TypeSelector::Buffer(0), &Term::string("topic"), 3).unwrap();
    assert_eq!(value, OptionValue::Bytes(b"topic".to_vec()));
}

// ============================================================
// Version windows
// ============================================================

#[test]
fn test_removed_option_is_unsupported_on_new_library() {
    let result = resolve_option(OptionDomain::Socket, "hwm", Version::new(4, 3, 0), 1);
    match result {
        Err(BridgeError::Unsupported { operation, required }) => {
            assert_eq!(operation, "hwm");
            assert_eq!(required, "< 3.0.0");
        }
        other => panic!("expected Unsupported, got {:?}", other),
    }
}

#[test]
fn test_added_option_is_unsupported_on_old_library() {
    let result = resolve_option(OptionDomain::Socket, "lastEndpoint", Version::new(3, 0, 0), 1);
    assert!(matches!(result, Err(BridgeError::Unsupported { .. })));
}

#[test]
fn test_unknown_option_is_invalid_argument() {
    let result = resolve_option(OptionDomain::Socket, "colour", Version::new(4, 3, 0), 2);
    assert!(matches!(
        result,
        Err(BridgeError::InvalidArgument { position: 2, .. })
    ));
}

proptest! {
    #[test]
    fn test_any_int64_round_trips(value in any::<i64>()) {
        let (_ctx, socket) = socket();
        let read = round_trip(
            &socket,
            "maxmsgsize",
            TypeSelector::Primitive(Primitive::Int64),
            OptionValue::Int64(value),
        );
        prop_assert_eq!(read, OptionValue::Int64(value));
    }
}

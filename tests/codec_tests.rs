#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for the CoAP codec and the request/response mapping
//!
//! # Test Coverage
//!
//! - header validation (length, version, token length)
//! - Uri-Path / Uri-Query / Accept interpretation
//! - unknown options carried through untouched
//! - response messages: code, Content-Format, payload marker

use minicoap::message::{
    option, Code, ContentFormat, DecodeError, Message, MessageOption, MessageType, Method,
    Request, RequestError, Response, ResponseCode,
};

#[test]
fn test_header_errors() {
    assert_eq!(
        Message::decode(&[0x40, 0x01, 0x00]),
        Err(DecodeError::TruncatedHeader(3))
    );
    assert_eq!(
        Message::decode(&[0x80, 0x01, 0x00, 0x01]),
        Err(DecodeError::BadVersion(2))
    );
    assert_eq!(
        Message::decode(&[0x49, 0x01, 0x00, 0x01]),
        Err(DecodeError::BadTokenLength(9))
    );
    assert_eq!(
        Message::decode(&[0x44, 0x01, 0x00, 0x01, 0xaa]),
        Err(DecodeError::TruncatedToken)
    );
}

#[test]
fn test_option_and_payload_errors() {
    // Uri-Path claiming 4 bytes with 2 present
    assert_eq!(
        Message::decode(&[0x40, 0x01, 0x00, 0x01, 0xb4, b'a', b'b']),
        Err(DecodeError::TruncatedOption(4))
    );
    // Marker with nothing after it
    assert_eq!(
        Message::decode(&[0x40, 0x01, 0x00, 0x01, 0xff]),
        Err(DecodeError::EmptyPayload)
    );
}

#[test]
fn test_request_from_nested_path_and_query() {
    let mut msg = Message::new(MessageType::Confirmable, Method::Get.code(), 0xbeef);
    msg.token = vec![1, 2, 3];
    msg.push_option(MessageOption::new(option::URI_QUERY, "unit=c"));
    msg.push_option(MessageOption::new(option::URI_PATH, "sensors"));
    msg.push_option(MessageOption::new(option::URI_PATH, "temp"));
    msg.push_option(MessageOption::uint(option::ACCEPT, 0));

    let decoded = Message::decode(&msg.encode()).unwrap();
    let request = Request::from_message(&decoded).unwrap();
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.path, "/sensors/temp");
    assert_eq!(request.query, vec!["unit=c".to_string()]);
    assert_eq!(request.accept, Some(ContentFormat::TEXT_PLAIN));
    assert_eq!(request.message_id, 0xbeef);
    assert_eq!(request.token, vec![1, 2, 3]);
    assert!(request.confirmable);
    assert!(request.payload.is_none());
}

#[test]
fn test_request_without_path_is_root() {
    let msg = Message::new(MessageType::NonConfirmable, Method::Get.code(), 1);
    let request = Request::from_message(&msg).unwrap();
    assert_eq!(request.path, "/");
    assert!(!request.confirmable);
}

#[test]
fn test_unknown_method_code_is_not_a_request() {
    // 0.05 FETCH is outside the supported method set
    let msg = Message::new(MessageType::Confirmable, Code::new(0, 5), 1);
    assert!(msg.code.is_request());
    let err = Request::from_message(&msg).unwrap_err();
    assert_eq!(err, RequestError::UnknownMethod(Code::new(0, 5)));
    assert_eq!(err.status(), ResponseCode::MethodNotAllowed);
}

#[test]
fn test_malformed_request_options_are_bad_request() {
    let mut msg = Message::new(MessageType::Confirmable, Method::Get.code(), 2);
    msg.push_option(MessageOption::new(option::URI_PATH, vec![0xff, 0xfe]));
    let err = Request::from_message(&msg).unwrap_err();
    assert!(matches!(
        err,
        RequestError::BadOption {
            number: option::URI_PATH,
            ..
        }
    ));
    assert_eq!(err.status(), ResponseCode::BadRequest);

    // Accept wider than any content format
    let mut msg = Message::new(MessageType::Confirmable, Method::Get.code(), 3);
    msg.push_option(MessageOption::new(option::URI_PATH, "temp"));
    msg.push_option(MessageOption::new(option::ACCEPT, vec![1, 0, 0]));
    assert_eq!(
        Request::from_message(&msg).unwrap_err().status(),
        ResponseCode::BadRequest
    );
}

#[test]
fn test_unknown_options_survive() {
    let mut msg = Message::new(MessageType::Confirmable, Method::Get.code(), 9);
    msg.push_option(MessageOption::new(option::URI_PATH, "temp"));
    // Observe (6) and a large private option number
    msg.push_option(MessageOption::new(6, vec![]));
    msg.push_option(MessageOption::new(65000, vec![0xde, 0xad]));

    let decoded = Message::decode(&msg.encode()).unwrap();
    let numbers: Vec<u16> = decoded.options.iter().map(|o| o.number).collect();
    assert_eq!(numbers, vec![6, option::URI_PATH, 65000]);
    assert_eq!(decoded.option(65000).unwrap().value, vec![0xde, 0xad]);
}

#[test]
fn test_piggybacked_response_wire_format() {
    let msg = Response::text("42.5").into_message(MessageType::Acknowledgement, 0x1234, &[0x7a]);
    let bytes = msg.encode();
    // ACK, TKL 1, 2.05, mid 0x1234, token 0x7a, Content-Format 0 (empty uint), marker, payload
    assert_eq!(
        bytes,
        vec![0x61, 0x45, 0x12, 0x34, 0x7a, 0xc0, 0xff, b'4', b'2', b'.', b'5']
    );

    let back = Response::from_message(&Message::decode(&bytes).unwrap()).unwrap();
    assert_eq!(back.status, ResponseCode::Content);
    assert_eq!(back.content_format, Some(ContentFormat::TEXT_PLAIN));
    assert_eq!(back.payload_str().as_deref(), Some("42.5"));
}

#[test]
fn test_empty_ack_and_reset_are_four_bytes() {
    assert_eq!(Message::empty_ack(0x0102).encode(), vec![0x60, 0x00, 0x01, 0x02]);
    assert_eq!(Message::reset(0x0102).encode(), vec![0x70, 0x00, 0x01, 0x02]);
}

#[test]
fn test_client_request_encoding() {
    let request = Request::new(Method::Post, "/a/b")
        .with_payload(ContentFormat::TEXT_PLAIN, "hi")
        .with_accept(ContentFormat::JSON);
    let msg = request.to_message();
    assert_eq!(msg.code, Method::Post.code());
    let paths: Vec<&[u8]> = msg.option_values(option::URI_PATH).collect();
    assert_eq!(paths, vec![b"a".as_slice(), b"b".as_slice()]);
    assert_eq!(msg.option(option::ACCEPT).unwrap().as_uint(), Some(50));
    assert_eq!(msg.payload, b"hi");
}

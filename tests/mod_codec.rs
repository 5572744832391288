use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson};
use docgate::codec::{decode_binary, encode_binary, BINARY_FIELD};

fn bin(bytes: &[u8]) -> Bson {
    Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes: bytes.to_vec() })
}

#[test]
fn decode_replaces_base64_text_with_bytes() {
    let payload = b"hello bytes";
    let mut d = doc! { "name": "a", BINARY_FIELD: BASE64.encode(payload) };
    decode_binary(&mut d);
    assert_eq!(d.get(BINARY_FIELD).unwrap(), &bin(payload));
    assert_eq!(d.get_str("name").unwrap(), "a");
}

#[test]
fn encode_replaces_bytes_with_base64_text() {
    let payload = b"\x00\x01\xfe\xff";
    let mut d = doc! { BINARY_FIELD: bin(payload) };
    encode_binary(&mut d);
    assert_eq!(d.get_str(BINARY_FIELD).unwrap(), BASE64.encode(payload));
}

#[test]
fn traversal_reaches_nested_documents_and_arrays() {
    let payload = b"deep";
    let mut d = doc! {
        "outer": {
            "inner": { BINARY_FIELD: BASE64.encode(payload) },
        },
        "list": [
            { BINARY_FIELD: BASE64.encode(payload) },
            { "plain": 1 },
        ],
    };
    decode_binary(&mut d);
    let inner = d.get_document("outer").unwrap().get_document("inner").unwrap();
    assert_eq!(inner.get(BINARY_FIELD).unwrap(), &bin(payload));
    let Bson::Array(items) = d.get("list").unwrap() else { panic!("list missing") };
    let Bson::Document(first) = &items[0] else { panic!("not a document") };
    assert_eq!(first.get(BINARY_FIELD).unwrap(), &bin(payload));
}

#[test]
fn round_trip_is_identity() {
    let original = doc! {
        "text": "hi",
        BINARY_FIELD: bin(b"raw payload"),
        "nested": { BINARY_FIELD: bin(&[0u8, 255, 128]) },
    };
    let mut d = original.clone();
    encode_binary(&mut d);
    decode_binary(&mut d);
    assert_eq!(d, original);
}

#[test]
fn wrong_direction_is_a_no_op() {
    // decode on already-binary data
    let binary = doc! { BINARY_FIELD: bin(b"already raw") };
    let mut d = binary.clone();
    decode_binary(&mut d);
    assert_eq!(d, binary);

    // encode on already-text data
    let text = doc! { BINARY_FIELD: BASE64.encode(b"already text") };
    let mut d = text.clone();
    encode_binary(&mut d);
    assert_eq!(d, text);
}

#[test]
fn tree_without_marker_is_untouched() {
    let original = doc! { "a": 1, "b": { "c": [1, 2, 3] }, "d": "ZGF0YQ==" };
    let mut encoded = original.clone();
    encode_binary(&mut encoded);
    assert_eq!(encoded, original);
    let mut decoded = original.clone();
    decode_binary(&mut decoded);
    assert_eq!(decoded, original);
}

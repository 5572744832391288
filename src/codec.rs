//! Binary field codec.
//!
//! Documents carry embedded binary payloads under the reserved
//! [`BINARY_FIELD`] key. On the way into the store the payload arrives as
//! base64 text and is decoded to raw bytes; on the way out it is encoded
//! back to base64 so the wire stays text-only. Both transforms walk the
//! whole tree in place, recursing into nested documents and into arrays
//! of documents, and leave everything else untouched.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};

/// Reserved marker key for embedded binary payloads.
pub const BINARY_FIELD: &str = "bin:data";

/// Replaces base64 text under [`BINARY_FIELD`] with raw bytes.
/// Values already binary, or text that is not valid base64, are left
/// as they are.
pub fn decode_binary(doc: &mut Document) {
    transform(doc, &|value| match value {
        Bson::String(s) => BASE64.decode(s.as_bytes()).ok().map(|bytes| {
            Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes })
        }),
        _ => None,
    });
}

/// Replaces raw bytes under [`BINARY_FIELD`] with base64 text.
/// Values already text are left as they are.
pub fn encode_binary(doc: &mut Document) {
    transform(doc, &|value| match value {
        Bson::Binary(bin) => Some(Bson::String(BASE64.encode(&bin.bytes))),
        _ => None,
    });
}

fn transform(doc: &mut Document, convert: &dyn Fn(&Bson) -> Option<Bson>) {
    let keys: Vec<String> = doc.keys().map(ToString::to_string).collect();
    for key in keys {
        let Some(value) = doc.get_mut(&key) else { continue };
        if key == BINARY_FIELD {
            if let Some(replacement) = convert(value) {
                *value = replacement;
            }
            continue;
        }
        descend(value, convert);
    }
}

fn descend(value: &mut Bson, convert: &dyn Fn(&Bson) -> Option<Bson>) {
    match value {
        Bson::Document(d) => transform(d, convert),
        Bson::Array(items) => {
            for item in items {
                descend(item, convert);
            }
        }
        _ => {}
    }
}

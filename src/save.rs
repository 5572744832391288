//! Operation translator: generic mutation descriptors to store writes.
//!
//! A descriptor without an oid is a creation: the `set` map becomes the
//! document, stamped with `_updated` and a freshly allocated `_seq`, and
//! is inserted once. A descriptor with an oid is a mutation: the operator
//! groups are folded into one update document and issued as a single
//! atomic upsert returning the new document — so a caller may "mutate" a
//! not-yet-existing document if it supplies operators beyond a plain set.
//! Binary payloads are decoded on the way in and re-encoded on the way
//! out.

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use chrono::Utc;
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::codec::{decode_binary, encode_binary};
use crate::errors::GatewayError;
use crate::sequence;
use crate::store::{ModifyOptions, Store};

/// Reserved field: per-entity sequence number, assigned at creation.
pub const SEQ_FIELD: &str = "_seq";
/// Reserved field: Unix timestamp of the last mutating write.
pub const UPDATED_FIELD: &str = "_updated";

/// Wire shape of one save operation. Batched as an ordered sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDescriptor {
    #[serde(default)]
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unset: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inc: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_all: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_to_set: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pop: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_all: Option<Document>,
}

/// Applies one descriptor, returning the resulting document.
///
/// A plain create issues exactly one insert and nothing else; a mutation
/// issues exactly one atomic upsert. Only a create that also carries
/// operator groups needs both: the insert, then the one upsert those
/// operators require.
///
/// # Errors
/// Validation failures surface before any store call; store failures
/// come back as `SaveFailed` (or its duplicate-key sub-kind) with the
/// cause attached.
pub fn apply(store: &dyn Store, desc: SaveDescriptor) -> Result<Document, GatewayError> {
    if desc.entity.is_empty() {
        return Err(GatewayError::EntityNotSet);
    }
    let oid = match &desc.oid {
        Some(s) => {
            Some(ObjectId::parse_str(s).map_err(|_| GatewayError::ObjectIdInvalid)?)
        }
        None => None,
    };

    let mut set = desc.set.unwrap_or_default();
    let mut push = desc.push;
    let mut push_all = desc.push_all;
    let mut add_to_set = desc.add_to_set;
    let mut pull_all = desc.pull_all;
    decode_binary(&mut set);
    for group in [&mut push, &mut push_all, &mut add_to_set, &mut pull_all]
        .into_iter()
        .flatten()
    {
        decode_binary(group);
    }

    set.insert(UPDATED_FIELD, Bson::Int64(Utc::now().timestamp()));

    let is_new = oid.is_none();
    let mut result: Option<Document> = None;
    let oid = match oid {
        Some(id) => id,
        None => {
            let seq = sequence::next(store, &desc.entity).map_err(GatewayError::save_failed)?;
            set.insert(SEQ_FIELD, Bson::Int64(seq));
            let inserted =
                store.insert(&desc.entity, set.clone()).map_err(GatewayError::save_failed)?;
            let id = match inserted.get_object_id("_id") {
                Ok(id) => id,
                Err(e) => {
                    return Err(GatewayError::SaveFailed(crate::store::StoreError::Backend(
                        format!("store returned no identifier: {e}"),
                    )))
                }
            };
            result = Some(inserted);
            id
        }
    };

    let mut update = Document::new();
    if !is_new {
        update.insert("$set", set);
    }
    if let Some(unset) = desc.unset {
        update.insert("$unset", unset);
    }
    if let Some(inc) = desc.inc {
        update.insert("$inc", inc);
    }
    if let Some(push) = push {
        update.insert("$push", push);
    }
    if let Some(push_all) = push_all {
        update.insert("$pushAll", push_all);
    }
    if let Some(ats) = add_to_set {
        // Each value rides in an $each wrapper so duplicates are not
        // re-added when the target already holds them.
        let mut wrapped = Document::new();
        for (field, value) in ats {
            let each = match value {
                Bson::Array(items) => Bson::Array(items),
                other => Bson::Array(vec![other]),
            };
            wrapped.insert(field, doc! { "$each": each });
        }
        update.insert("$addToSet", wrapped);
    }
    if let Some(pop) = desc.pop {
        update.insert("$pop", pop);
    }
    if let Some(pull_all) = pull_all {
        update.insert("$pullAll", pull_all);
    }

    // A plain create already wrote everything; only issue the atomic
    // upsert when mutating or when a create carried extra operators.
    if !is_new || !update.is_empty() {
        debug!("save {} _id={oid} ops={:?}", desc.entity, update.keys().collect::<Vec<_>>());
        let modified = store
            .find_and_modify(
                &desc.entity,
                &doc! { "_id": oid },
                &update,
                ModifyOptions { upsert: true, return_new: true },
            )
            .map_err(GatewayError::save_failed)?;
        if let Some(d) = modified {
            result = Some(d);
        }
    }

    let mut out = result.unwrap_or_default();
    encode_binary(&mut out);
    Ok(out)
}

/// Applies a batch in order. Validation errors abort immediately; store
/// failures are logged, later descriptors still run, and the whole batch
/// reports only the last failure — documents committed before it stand.
///
/// # Errors
/// See [`apply`].
pub fn apply_batch(
    store: &dyn Store,
    batch: Vec<SaveDescriptor>,
) -> Result<Vec<Document>, GatewayError> {
    let mut results = Vec::with_capacity(batch.len());
    let mut failure: Option<GatewayError> = None;
    for desc in batch {
        match apply(store, desc) {
            Ok(doc) => results.push(doc),
            Err(
                e @ (GatewayError::EntityNotSet
                | GatewayError::ObjectIdNotSet
                | GatewayError::ObjectIdInvalid),
            ) => return Err(e),
            Err(e) => {
                error!("save descriptor failed: {e} ({:?})", e.to_body().err);
                failure = Some(e);
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

//! Query builder: generic read descriptors to store-native queries.
//!
//! The builder only re-shapes the client's filter — it merges the
//! `or`/`and` combinators under the store's boolean keys, coerces `_id`
//! strings into native ObjectIds, and derives the sort sequence — it
//! never validates or optimizes the filter itself. The four read modes
//! are mutually exclusive: find, find-one, count, and a fixed-size
//! random sample compiled down to the store's aggregation pipeline.

use bson::oid::ObjectId;
use bson::{Bson, Document};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::codec::encode_binary;
use crate::errors::GatewayError;
use crate::store::{FindOptions, Order, PipelineStage, SortSpec, Store};

/// Result sizes above this only log a warning; nothing is truncated.
pub const RESULT_WARN_THRESHOLD: usize = 1000;

/// Wire shape of one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub q: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<Document>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<Document>>,
    /// Field name to signed order value; the sign picks the direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default)]
    pub find_one: bool,
    #[serde(default)]
    pub count: bool,
    /// Random-sample size; takes precedence over the other modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Find,
    FindOne,
    Count,
    Sample(usize),
}

/// A store-native query, ready to execute.
#[derive(Debug, Clone)]
pub struct StoreQuery {
    pub entity: String,
    pub filter: Document,
    pub opts: FindOptions,
    pub mode: ReadMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Documents(Vec<Document>),
    Count(u64),
    /// Identifiers of the sampled documents.
    Sample(Vec<Bson>),
}

/// Re-shapes a descriptor into the store's native query form.
///
/// # Errors
/// `EntityNotSet` for a missing entity name, `ObjectIdInvalid` when an
/// `_id` value anywhere in the filter is not a well-formed identifier —
/// both detected before any store call.
pub fn build(desc: QueryDescriptor) -> Result<StoreQuery, GatewayError> {
    if desc.entity.is_empty() {
        return Err(GatewayError::EntityNotSet);
    }

    let mut filter = desc.q;
    if let Some(or) = desc.or {
        filter.insert("$or", Bson::Array(or.into_iter().map(Bson::Document).collect()));
    }
    if let Some(and) = desc.and {
        filter.insert("$and", Bson::Array(and.into_iter().map(Bson::Document).collect()));
    }
    coerce_ids(&mut filter)?;

    let mut opts = FindOptions { sort: Vec::new(), skip: desc.skip, limit: desc.limit };
    if let Some(sort) = desc.sort {
        for (field, order) in sort {
            let order = match order {
                Bson::Int32(v) if v < 0 => Order::Desc,
                Bson::Int64(v) if v < 0 => Order::Desc,
                Bson::Double(v) if v < 0.0 => Order::Desc,
                _ => Order::Asc,
            };
            opts.sort.push(SortSpec { field, order });
        }
    }

    let mode = match (desc.sample, desc.find_one, desc.count) {
        (Some(k), _, _) => ReadMode::Sample(k),
        (None, true, _) => ReadMode::FindOne,
        (None, false, true) => ReadMode::Count,
        (None, false, false) => ReadMode::Find,
    };

    Ok(StoreQuery { entity: desc.entity, filter, opts, mode })
}

/// Builds and executes a descriptor, encoding binary payloads in any
/// documents returned.
///
/// # Errors
/// Build failures as in [`build`]; store failures as `QueryFailed`.
pub fn run(store: &dyn Store, desc: QueryDescriptor) -> Result<QueryOutcome, GatewayError> {
    let query = build(desc)?;
    match query.mode {
        ReadMode::Sample(size) => {
            let pipeline = [
                PipelineStage::RandomKey,
                PipelineStage::TakeSmallest { size },
                PipelineStage::IdOnly,
            ];
            let ids = store
                .aggregate(&query.entity, &pipeline)
                .map_err(GatewayError::QueryFailed)?;
            Ok(QueryOutcome::Sample(ids))
        }
        ReadMode::FindOne => {
            let doc = store
                .find_one(&query.entity, &query.filter, &[])
                .map_err(GatewayError::QueryFailed)?;
            let mut docs: Vec<Document> = doc.into_iter().collect();
            for d in &mut docs {
                encode_binary(d);
            }
            Ok(QueryOutcome::Documents(docs))
        }
        ReadMode::Count => {
            let n = store
                .count(&query.entity, &query.filter)
                .map_err(GatewayError::QueryFailed)?;
            Ok(QueryOutcome::Count(n))
        }
        ReadMode::Find => {
            let mut docs = store
                .find(&query.entity, &query.filter, &query.opts)
                .map_err(GatewayError::QueryFailed)?;
            if docs.len() > RESULT_WARN_THRESHOLD {
                warn!(
                    "query on '{}' returned {} documents; consider narrowing the filter",
                    query.entity,
                    docs.len()
                );
            }
            for d in &mut docs {
                encode_binary(d);
            }
            Ok(QueryOutcome::Documents(docs))
        }
    }
}

/// Recursively rewrites `_id` keys whose value is a string into native
/// ObjectIds, descending into nested documents and arrays.
fn coerce_ids(filter: &mut Document) -> Result<(), GatewayError> {
    let keys: Vec<String> = filter.keys().map(ToString::to_string).collect();
    for key in keys {
        let Some(value) = filter.get_mut(&key) else { continue };
        if key == "_id" {
            if let Bson::String(s) = value {
                let oid =
                    ObjectId::parse_str(s.as_str()).map_err(|_| GatewayError::ObjectIdInvalid)?;
                *value = Bson::ObjectId(oid);
                continue;
            }
        }
        coerce_value(value)?;
    }
    Ok(())
}

fn coerce_value(value: &mut Bson) -> Result<(), GatewayError> {
    match value {
        Bson::Document(d) => coerce_ids(d),
        Bson::Array(items) => {
            for item in items {
                coerce_value(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

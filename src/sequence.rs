//! Per-entity sequence allocation.
//!
//! Counters live in their own entity, one document per user entity, keyed
//! by entity name. Allocation is two store calls: seed the counter at
//! zero (a duplicate-key rejection means it already exists and is
//! swallowed), then one atomic `$inc` returning the new value. The
//! atomic step is what guarantees distinct values under concurrent
//! callers; a failed call may leave a gap in the sequence, never a
//! duplicate.

use bson::doc;

use crate::store::{ModifyOptions, Store, StoreError};

/// Entity holding the per-entity counters.
pub const SEQUENCE_ENTITY: &str = "_docgate:seq";

/// Allocates the next sequence number for `entity`.
///
/// # Errors
/// Propagates any store failure other than the seed insert hitting an
/// existing counter.
pub fn next(store: &dyn Store, entity: &str) -> Result<i64, StoreError> {
    match store.insert(SEQUENCE_ENTITY, doc! { "_id": entity, "seq": 0_i64 }) {
        Ok(_) | Err(StoreError::DuplicateKey { .. }) => {}
        Err(e) => return Err(e),
    }

    let counter = store
        .find_and_modify(
            SEQUENCE_ENTITY,
            &doc! { "_id": entity },
            &doc! { "$inc": { "seq": 1_i64 } },
            ModifyOptions { upsert: false, return_new: true },
        )?
        .ok_or_else(|| StoreError::Backend(format!("sequence counter for '{entity}' vanished")))?;

    counter
        .get_i64("seq")
        .map_err(|e| StoreError::Backend(format!("sequence counter for '{entity}': {e}")))
}

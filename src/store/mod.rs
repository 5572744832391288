//! Document store seam.
//!
//! The gateway consumes a document store through the [`Store`] trait and
//! never assumes anything beyond its contract. The bundled
//! [`memory::MemoryStore`] backend implements it for tests and embedded
//! use; a driver for a networked store can implement the same trait.

pub mod filter;
pub mod memory;
pub mod update;

use bson::{Bson, Document};
use thiserror::Error;

/// Mongo's well-known duplicate key code, mirrored by every backend so the
/// gateway can classify the failure uniformly.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key in '{entity}': {key}")]
    DuplicateKey { entity: String, key: String },

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Structured error code, when the backend exposes one.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::DuplicateKey { .. } => Some(DUPLICATE_KEY_CODE),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

/// Options for [`Store::find`]. Sorting is applied before skip/limit.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<SortSpec>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Options for [`Store::find_and_modify`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModifyOptions {
    /// Create the document when the filter matches nothing.
    pub upsert: bool,
    /// Return the post-update document instead of the pre-update one.
    pub return_new: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    pub unique: bool,
    /// When creating a unique index over data that already violates it,
    /// drop the offending documents instead of failing.
    pub drop_dups: bool,
}

/// One stage of an aggregation pipeline. The gateway only ever emits the
/// random-sampling reduction: tag every document with a uniform random
/// key, keep the K smallest, project the survivors to their identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Map: pair each document with a uniform random key.
    RandomKey,
    /// Reduce: sort ascending by key and truncate to the first `size`.
    TakeSmallest { size: usize },
    /// Finalize: project each surviving entry down to its `_id`.
    IdOnly,
}

/// The primitives the gateway requires from a document store.
///
/// `find_and_modify` is the one operation that must be indivisible with
/// respect to concurrent callers; everything else is an independent
/// single round trip.
pub trait Store: Send + Sync {
    /// Inserts `doc`, assigning a fresh ObjectId `_id` when absent.
    /// Returns the stored document.
    ///
    /// # Errors
    /// `DuplicateKey` when `_id` or a unique-indexed field is taken.
    fn insert(&self, entity: &str, doc: Document) -> Result<Document, StoreError>;

    /// Atomic read-modify-write: find one document by `filter`, apply
    /// `update`, optionally upserting, and return the document selected
    /// by `opts.return_new`. Returns `None` only when nothing matched
    /// and `opts.upsert` is off.
    ///
    /// # Errors
    /// `InvalidUpdate` for malformed operator payloads, `DuplicateKey`
    /// when the update violates a unique index.
    fn find_and_modify(
        &self,
        entity: &str,
        filter: &Document,
        update: &Document,
        opts: ModifyOptions,
    ) -> Result<Option<Document>, StoreError>;

    /// Fetches one matching document, restricted to `projection` when it
    /// is non-empty (`_id` is always included).
    fn find_one(
        &self,
        entity: &str,
        filter: &Document,
        projection: &[String],
    ) -> Result<Option<Document>, StoreError>;

    fn find(
        &self,
        entity: &str,
        filter: &Document,
        opts: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Removes every matching document, returning how many went away.
    fn remove(&self, entity: &str, filter: &Document) -> Result<u64, StoreError>;

    fn count(&self, entity: &str, filter: &Document) -> Result<u64, StoreError>;

    fn create_index(
        &self,
        entity: &str,
        field: &str,
        opts: IndexOptions,
    ) -> Result<(), StoreError>;

    fn aggregate(&self, entity: &str, pipeline: &[PipelineStage])
        -> Result<Vec<Bson>, StoreError>;

    fn drop_entity(&self, entity: &str) -> Result<(), StoreError>;
}

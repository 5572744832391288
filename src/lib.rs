//! docgate: a schema-less document gateway.
//!
//! Clients submit untyped operation descriptors; the gateway translates
//! them into atomic operations against a pluggable document store and
//! layers on three capabilities the store does not provide: per-entity
//! monotonic sequence stamping (`_seq`/`_updated`), transparent encoding
//! of embedded binary payloads, and capability tokens that authorize an
//! unauthenticated, field-restricted read of one document.

pub mod codec;
pub mod config;
pub mod errors;
pub mod logger;
pub mod publish;
pub mod query;
pub mod save;
pub mod sequence;
pub mod store;

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use log::error;
use std::sync::Arc;

use crate::config::Config;
use crate::errors::GatewayError;
use crate::query::{QueryDescriptor, QueryOutcome};
use crate::save::SaveDescriptor;
use crate::store::memory::MemoryStore;
use crate::store::{IndexOptions, Store};

/// Wire shape of an index request.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub drop: bool,
}

/// Wire shape of a publish request.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishDescriptor {
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub oid: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// What a resolved capability token yields: the one requested field's
/// raw value, or the projected document with its identifier stripped.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicValue {
    Field(Bson),
    Document(Document),
}

/// The gateway façade. Holds the store handle and configuration
/// immutably; safe to share across arbitrarily many threads.
pub struct Gateway {
    store: Arc<dyn Store>,
    config: Config,
}

impl Gateway {
    /// # Errors
    /// `Config` when the configuration fails validation.
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self, GatewayError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Gateway over the bundled in-memory backend.
    ///
    /// # Errors
    /// `Config` when the configuration fails validation.
    pub fn in_memory(config: Config) -> Result<Self, GatewayError> {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Saves a batch of descriptors in order. See [`save::apply_batch`]
    /// for the partial-failure contract.
    ///
    /// # Errors
    /// Validation errors abort the batch; a store failure is reported as
    /// `SaveFailed` after the remaining descriptors have run.
    pub fn save(&self, batch: Vec<SaveDescriptor>) -> Result<Vec<Document>, GatewayError> {
        save::apply_batch(self.store.as_ref(), batch)
    }

    /// Deletes one document by identifier. Succeeds even when nothing
    /// matched.
    ///
    /// # Errors
    /// `EntityNotSet`/`ObjectIdNotSet`/`ObjectIdInvalid` before any
    /// store call; `DeleteFailed` on a store failure.
    pub fn delete(&self, entity: &str, oid: Option<&str>) -> Result<(), GatewayError> {
        let (entity, oid) = addressed(entity, oid)?;
        self.store.remove(entity, &doc! { "_id": oid }).map_err(|e| {
            error!("delete {entity}/{oid} failed: {e}");
            GatewayError::DeleteFailed(e)
        })?;
        Ok(())
    }

    /// Fetches one document by identifier, with binary payloads encoded
    /// for the wire. A missing document is a failure.
    ///
    /// # Errors
    /// Validation as in [`Self::delete`]; `RefreshFailed` when the
    /// document is absent or the store fails.
    pub fn refresh(&self, entity: &str, oid: Option<&str>) -> Result<Document, GatewayError> {
        let (entity, oid) = addressed(entity, oid)?;
        let found = self
            .store
            .find_one(entity, &doc! { "_id": oid }, &[])
            .map_err(|e| {
                error!("refresh {entity}/{oid} failed: {e}");
                GatewayError::RefreshFailed(Some(e))
            })?;
        let mut doc = found.ok_or(GatewayError::RefreshFailed(None))?;
        codec::encode_binary(&mut doc);
        Ok(doc)
    }

    /// Runs a query descriptor. See the [`query`] module for the read
    /// modes.
    ///
    /// # Errors
    /// See [`query::run`].
    pub fn query(&self, desc: QueryDescriptor) -> Result<QueryOutcome, GatewayError> {
        query::run(self.store.as_ref(), desc)
    }

    /// Creates an index on one field of an entity.
    ///
    /// # Errors
    /// `EntityNotSet`/`EntityKeyNotSet` before any store call;
    /// `IndexFailed` on a store failure.
    pub fn ensure_index(&self, desc: IndexDescriptor) -> Result<(), GatewayError> {
        if desc.entity.is_empty() {
            return Err(GatewayError::EntityNotSet);
        }
        if desc.key.is_empty() {
            return Err(GatewayError::EntityKeyNotSet);
        }
        let opts = IndexOptions { unique: desc.unique, drop_dups: desc.drop };
        self.store.create_index(&desc.entity, &desc.key, opts).map_err(|e| {
            error!("index {}:{} failed: {e}", desc.entity, desc.key);
            GatewayError::IndexFailed(e)
        })
    }

    /// Issues a capability token for a field-restricted read of one
    /// document.
    ///
    /// # Errors
    /// `EntityNotSet`/`ObjectIdInvalid` for a bad address;
    /// `PublishFailed` when token construction fails.
    pub fn publish(&self, desc: &PublishDescriptor) -> Result<String, GatewayError> {
        if desc.entity.is_empty() {
            return Err(GatewayError::EntityNotSet);
        }
        let oid =
            ObjectId::parse_str(&desc.oid).map_err(|_| GatewayError::ObjectIdInvalid)?;
        let addr = publish::Address {
            entity: desc.entity.clone(),
            oid,
            fields: desc.fields.clone(),
        };
        publish::issue(&self.config.secret, &addr)
    }

    /// The unauthenticated read path: resolves a token and fetches the
    /// projection it authorizes. An invalid or undecryptable token, and
    /// a token addressing a missing document, both come back as
    /// `Ok(None)` — indistinguishable from not-found by design.
    ///
    /// # Errors
    /// Only store failures surface, as `QueryFailed`.
    pub fn public(&self, token: &str) -> Result<Option<PublicValue>, GatewayError> {
        let Some(addr) = publish::resolve(&self.config.secret, token) else {
            return Ok(None);
        };
        let found = self
            .store
            .find_one(&addr.entity, &doc! { "_id": addr.oid }, &addr.fields)
            .map_err(GatewayError::QueryFailed)?;
        let Some(mut doc) = found else { return Ok(None) };
        doc.remove("_id");
        if addr.fields.len() == 1 {
            // A single requested field is returned raw, not wrapped.
            let value = doc.get(&addr.fields[0]).cloned().unwrap_or(Bson::Null);
            Ok(Some(PublicValue::Field(value)))
        } else {
            Ok(Some(PublicValue::Document(doc)))
        }
    }

    /// Administrative drop of a whole entity, disabled unless the
    /// configuration allows it.
    ///
    /// # Errors
    /// `DestroyNotAllowed` when disabled; `DestroyFailed` on a store
    /// failure.
    pub fn destroy(&self, entity: &str) -> Result<(), GatewayError> {
        if !self.config.allow_destroy {
            return Err(GatewayError::DestroyNotAllowed);
        }
        if entity.is_empty() {
            return Err(GatewayError::EntityNotSet);
        }
        self.store.drop_entity(entity).map_err(|e| {
            error!("destroy {entity} failed: {e}");
            GatewayError::DestroyFailed(e)
        })
    }
}

fn addressed<'a>(
    entity: &'a str,
    oid: Option<&str>,
) -> Result<(&'a str, ObjectId), GatewayError> {
    if entity.is_empty() {
        return Err(GatewayError::EntityNotSet);
    }
    let oid = oid.ok_or(GatewayError::ObjectIdNotSet)?;
    let oid = ObjectId::parse_str(oid).map_err(|_| GatewayError::ObjectIdInvalid)?;
    Ok((entity, oid))
}

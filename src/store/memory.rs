//! Bundled in-memory backend.
//!
//! Keeps every entity in a `parking_lot`-guarded map and runs
//! `find_and_modify` entirely under one write guard, which is what makes
//! it a true atomic read-modify-write. Documents are kept in insertion
//! order; `find` returns them in that natural order unless a sort is
//! requested.

use bson::oid::ObjectId;
use bson::{Bson, Document};
use log::debug;
use parking_lot::RwLock;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use super::filter::{bson_cmp, eval_filter, get_path};
use super::update::apply_update;
use super::{
    FindOptions, IndexOptions, ModifyOptions, Order, PipelineStage, SortSpec, Store, StoreError,
};

#[derive(Default)]
struct EntityData {
    docs: Vec<Document>,
    /// Fields with a unique index.
    unique: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<String, Arc<RwLock<EntityData>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entity(&self, name: &str) -> Arc<RwLock<EntityData>> {
        {
            let map = self.entities.read();
            if let Some(e) = map.get(name) {
                return e.clone();
            }
        }
        let mut map = self.entities.write();
        map.entry(name.to_string()).or_default().clone()
    }

    /// Existing entity handle, without creating one as a side effect.
    fn entity_if_present(&self, name: &str) -> Option<Arc<RwLock<EntityData>>> {
        self.entities.read().get(name).cloned()
    }
}

fn ensure_id(doc: &mut Document) -> Bson {
    match doc.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            doc.insert("_id", id.clone());
            id
        }
    }
}

fn id_equal(a: &Bson, b: &Bson) -> bool {
    super::filter::bson_equal(a, b)
}

/// Checks `candidate` against `_id` uniqueness and every unique index,
/// ignoring the document at `skip_idx` (the candidate's own slot).
fn check_unique(
    data: &EntityData,
    entity: &str,
    candidate: &Document,
    skip_idx: Option<usize>,
) -> Result<(), StoreError> {
    let cand_id = candidate.get("_id");
    for (i, other) in data.docs.iter().enumerate() {
        if Some(i) == skip_idx {
            continue;
        }
        if let (Some(a), Some(b)) = (cand_id, other.get("_id")) {
            if id_equal(a, b) {
                return Err(StoreError::DuplicateKey {
                    entity: entity.to_string(),
                    key: format!("_id: {a}"),
                });
            }
        }
        for field in &data.unique {
            if let (Some(a), Some(b)) = (get_path(candidate, field), get_path(other, field)) {
                if super::filter::bson_equal(a, b) {
                    return Err(StoreError::DuplicateKey {
                        entity: entity.to_string(),
                        key: format!("{field}: {a}"),
                    });
                }
            }
        }
    }
    Ok(())
}

fn sort_docs(docs: &mut [Document], specs: &[SortSpec]) {
    docs.sort_by(|a, b| compare_docs(a, b, specs));
}

fn compare_docs(a: &Document, b: &Document, specs: &[SortSpec]) -> Ordering {
    for s in specs {
        let av = get_path(a, &s.field);
        let bv = get_path(b, &s.field);
        let ord = match (av, bv) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(ax), Some(bx)) => bson_cmp(ax, bx).unwrap_or(Ordering::Equal),
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

fn project(doc: &Document, fields: &[String]) -> Document {
    if fields.is_empty() {
        return doc.clone();
    }
    let mut out = Document::new();
    if let Some(id) = doc.get("_id") {
        out.insert("_id", id.clone());
    }
    for f in fields {
        if let Some(v) = get_path(doc, f) {
            out.insert(f.clone(), v.clone());
        }
    }
    out
}

/// Seed document for an upsert that matched nothing: the filter's plain
/// equality fields become the initial document.
fn seed_from_filter(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (k, v) in filter {
        if k.starts_with('$') {
            continue;
        }
        if matches!(v, Bson::Document(d) if d.keys().any(|dk| dk.starts_with('$'))) {
            continue;
        }
        seed.insert(k.clone(), v.clone());
    }
    seed
}

impl Store for MemoryStore {
    fn insert(&self, entity: &str, mut doc: Document) -> Result<Document, StoreError> {
        let handle = self.entity(entity);
        let mut data = handle.write();
        let id = ensure_id(&mut doc);
        check_unique(&data, entity, &doc, None)?;
        debug!("insert {entity} _id={id}");
        data.docs.push(doc.clone());
        Ok(doc)
    }

    fn find_and_modify(
        &self,
        entity: &str,
        filter: &Document,
        update: &Document,
        opts: ModifyOptions,
    ) -> Result<Option<Document>, StoreError> {
        let handle = self.entity(entity);
        let mut data = handle.write();

        let pos = data.docs.iter().position(|d| eval_filter(d, filter));
        match pos {
            Some(i) => {
                let before = data.docs[i].clone();
                let mut after = before.clone();
                apply_update(&mut after, update)?;
                check_unique(&data, entity, &after, Some(i))?;
                data.docs[i] = after.clone();
                Ok(Some(if opts.return_new { after } else { before }))
            }
            None if opts.upsert => {
                let mut doc = seed_from_filter(filter);
                apply_update(&mut doc, update)?;
                ensure_id(&mut doc);
                check_unique(&data, entity, &doc, None)?;
                debug!("upsert {entity}");
                data.docs.push(doc.clone());
                Ok(Some(doc).filter(|_| opts.return_new))
            }
            None => Ok(None),
        }
    }

    fn find_one(
        &self,
        entity: &str,
        filter: &Document,
        projection: &[String],
    ) -> Result<Option<Document>, StoreError> {
        let Some(handle) = self.entity_if_present(entity) else {
            return Ok(None);
        };
        let data = handle.read();
        Ok(data.docs.iter().find(|d| eval_filter(d, filter)).map(|d| project(d, projection)))
    }

    fn find(
        &self,
        entity: &str,
        filter: &Document,
        opts: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let Some(handle) = self.entity_if_present(entity) else {
            return Ok(Vec::new());
        };
        let data = handle.read();
        let mut docs: Vec<Document> =
            data.docs.iter().filter(|d| eval_filter(d, filter)).cloned().collect();
        drop(data);
        if !opts.sort.is_empty() {
            sort_docs(&mut docs, &opts.sort);
        }
        let skip = usize::try_from(opts.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = opts.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(docs.into_iter().skip(skip).take(limit).collect())
    }

    fn remove(&self, entity: &str, filter: &Document) -> Result<u64, StoreError> {
        let Some(handle) = self.entity_if_present(entity) else {
            return Ok(0);
        };
        let mut data = handle.write();
        let before = data.docs.len();
        data.docs.retain(|d| !eval_filter(d, filter));
        Ok((before - data.docs.len()) as u64)
    }

    fn count(&self, entity: &str, filter: &Document) -> Result<u64, StoreError> {
        let Some(handle) = self.entity_if_present(entity) else {
            return Ok(0);
        };
        let data = handle.read();
        Ok(data.docs.iter().filter(|d| eval_filter(d, filter)).count() as u64)
    }

    fn create_index(
        &self,
        entity: &str,
        field: &str,
        opts: IndexOptions,
    ) -> Result<(), StoreError> {
        let handle = self.entity(entity);
        let mut data = handle.write();
        if !opts.unique {
            // Plain indexes carry no semantics in this backend.
            return Ok(());
        }
        // Walk in natural order keeping the first holder of each value.
        let mut keep: Vec<bool> = Vec::with_capacity(data.docs.len());
        for (i, doc) in data.docs.iter().enumerate() {
            let dup = get_path(doc, field).is_some_and(|v| {
                data.docs[..i].iter().zip(&keep).any(|(prev, kept)| {
                    *kept && get_path(prev, field).is_some_and(|p| super::filter::bson_equal(p, v))
                })
            });
            if dup && !opts.drop_dups {
                return Err(StoreError::DuplicateKey {
                    entity: entity.to_string(),
                    key: field.to_string(),
                });
            }
            keep.push(!dup);
        }
        let mut it = keep.iter();
        data.docs.retain(|_| *it.next().unwrap_or(&true));
        if !data.unique.iter().any(|f| f == field) {
            data.unique.push(field.to_string());
        }
        Ok(())
    }

    fn aggregate(
        &self,
        entity: &str,
        pipeline: &[PipelineStage],
    ) -> Result<Vec<Bson>, StoreError> {
        let docs: Vec<Document> = match self.entity_if_present(entity) {
            Some(handle) => handle.read().docs.clone(),
            None => Vec::new(),
        };
        let mut working: Vec<(f64, Bson)> =
            docs.into_iter().map(|d| (0.0, Bson::Document(d))).collect();
        let mut rng = rand::rng();
        for stage in pipeline {
            match stage {
                PipelineStage::RandomKey => {
                    for entry in &mut working {
                        entry.0 = rng.random::<f64>();
                    }
                }
                PipelineStage::TakeSmallest { size } => {
                    working.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
                    working.truncate(*size);
                }
                PipelineStage::IdOnly => {
                    working = working
                        .into_iter()
                        .filter_map(|(k, v)| match v {
                            Bson::Document(d) => d.get("_id").cloned().map(|id| (k, id)),
                            _ => None,
                        })
                        .collect();
                }
            }
        }
        Ok(working.into_iter().map(|(_, v)| v).collect())
    }

    fn drop_entity(&self, entity: &str) -> Result<(), StoreError> {
        self.entities.write().remove(entity);
        Ok(())
    }
}

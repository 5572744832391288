//! Update-operator interpreter for the bundled backend.
//!
//! Applies a store-native update document (`$set`, `$unset`, `$inc`,
//! `$push`, `$pushAll`, `$addToSet`, `$pop`, `$pullAll`) to a document
//! in place. Operator payloads are documents mapping field paths to
//! arguments; a payload of the wrong shape is an `InvalidUpdate`.

use bson::{Bson, Document};

use super::filter::{bson_equal, get_path};
use super::StoreError;

pub fn apply_update(doc: &mut Document, update: &Document) -> Result<(), StoreError> {
    for (op, arg) in update {
        let op: &str = op;
        let fields = match arg {
            Bson::Document(d) => d,
            _ => return Err(StoreError::InvalidUpdate(format!("{op} payload must be a document"))),
        };
        for (path, val) in fields {
            let path: &str = path;
            match op {
                "$set" => {
                    set_path(doc, path, val.clone());
                }
                "$unset" => {
                    unset_path(doc, path);
                }
                "$inc" => inc_path(doc, path, val)?,
                "$push" => push_path(doc, path, std::slice::from_ref(val))?,
                "$pushAll" => match val {
                    Bson::Array(items) => push_path(doc, path, items)?,
                    _ => {
                        return Err(StoreError::InvalidUpdate(
                            "$pushAll requires an array".into(),
                        ))
                    }
                },
                "$addToSet" => add_to_set_path(doc, path, val)?,
                "$pop" => pop_path(doc, path, val)?,
                "$pullAll" => match val {
                    Bson::Array(items) => pull_all_path(doc, path, items)?,
                    _ => {
                        return Err(StoreError::InvalidUpdate(
                            "$pullAll requires an array".into(),
                        ))
                    }
                },
                other => {
                    return Err(StoreError::InvalidUpdate(format!("unknown operator {other}")))
                }
            }
        }
    }
    Ok(())
}

/// Writes `val` at a dotted path, creating intermediate documents.
pub fn set_path(doc: &mut Document, path: &str, val: Bson) -> bool {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.is_empty() {
        return false;
    }
    let mut cur = doc;
    for key in parts.iter().take(parts.len() - 1) {
        let key: &str = key;
        if !matches!(cur.get(key), Some(Bson::Document(_))) {
            cur.insert(key.to_string(), Bson::Document(Document::new()));
        }
        match cur.get_mut(key) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    let Some(last) = parts.last() else { return false };
    let prev = cur.get(*last).cloned();
    let changed = prev.as_ref().is_none_or(|p| !bson_equal(p, &val));
    cur.insert((*last).to_string(), val);
    changed
}

pub fn unset_path(doc: &mut Document, path: &str) -> bool {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.is_empty() {
        return false;
    }
    let mut cur = doc;
    for key in parts.iter().take(parts.len() - 1) {
        match cur.get_mut(*key) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    let Some(last) = parts.last() else { return false };
    cur.remove(*last).is_some()
}

/// Numeric increment. Integer fields stay integral (Int64) so counters
/// never drift into floating point; mixed operands widen to Double.
fn inc_path(doc: &mut Document, path: &str, delta: &Bson) -> Result<(), StoreError> {
    let delta_i = match delta {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    };
    let delta_f = match delta {
        Bson::Double(f) => Some(*f),
        _ => None,
    };
    if delta_i.is_none() && delta_f.is_none() {
        return Err(StoreError::InvalidUpdate("$inc requires a numeric argument".into()));
    }

    #[allow(clippy::cast_precision_loss)]
    let new_val = match (get_path(doc, path), delta_i) {
        (None, Some(di)) => Bson::Int64(di),
        (None, None) => Bson::Double(delta_f.unwrap_or(0.0)),
        (Some(Bson::Int32(c)), Some(di)) => Bson::Int64(i64::from(*c) + di),
        (Some(Bson::Int64(c)), Some(di)) => Bson::Int64(*c + di),
        (Some(Bson::Int32(c)), None) => Bson::Double(f64::from(*c) + delta_f.unwrap_or(0.0)),
        (Some(Bson::Int64(c)), None) => Bson::Double(*c as f64 + delta_f.unwrap_or(0.0)),
        (Some(Bson::Double(c)), di) => {
            Bson::Double(*c + di.map_or_else(|| delta_f.unwrap_or(0.0), |i| i as f64))
        }
        (Some(_), _) => {
            return Err(StoreError::InvalidUpdate(format!("$inc target {path} is not numeric")))
        }
    };
    set_path(doc, path, new_val);
    Ok(())
}

fn array_at_path<'a>(
    doc: &'a mut Document,
    path: &str,
    create: bool,
) -> Result<Option<&'a mut Vec<Bson>>, StoreError> {
    if create && get_path(doc, path).is_none() {
        set_path(doc, path, Bson::Array(Vec::new()));
    }
    let parts: Vec<&str> = path.split('.').collect();
    let mut cur = doc;
    for key in parts.iter().take(parts.len() - 1) {
        match cur.get_mut(*key) {
            Some(Bson::Document(d)) => cur = d,
            _ => return Ok(None),
        }
    }
    let Some(last) = parts.last() else { return Ok(None) };
    match cur.get_mut(*last) {
        Some(Bson::Array(items)) => Ok(Some(items)),
        Some(_) => Err(StoreError::InvalidUpdate(format!("field {path} is not an array"))),
        None => Ok(None),
    }
}

fn push_path(doc: &mut Document, path: &str, values: &[Bson]) -> Result<(), StoreError> {
    if let Some(items) = array_at_path(doc, path, true)? {
        items.extend_from_slice(values);
    }
    Ok(())
}

/// `$addToSet` with the `$each` wrapper the translator always emits;
/// a bare value is treated as a one-element batch.
fn add_to_set_path(doc: &mut Document, path: &str, arg: &Bson) -> Result<(), StoreError> {
    let batch: Vec<Bson> = match arg {
        Bson::Document(d) => match d.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            Some(_) => {
                return Err(StoreError::InvalidUpdate("$addToSet $each requires an array".into()))
            }
            None => vec![arg.clone()],
        },
        other => vec![other.clone()],
    };
    if let Some(items) = array_at_path(doc, path, true)? {
        for v in batch {
            if !items.iter().any(|x| bson_equal(x, &v)) {
                items.push(v);
            }
        }
    }
    Ok(())
}

/// `$pop`: 1 removes from the tail, -1 from the head.
fn pop_path(doc: &mut Document, path: &str, arg: &Bson) -> Result<(), StoreError> {
    let from_head = match arg {
        Bson::Int32(-1) | Bson::Int64(-1) => true,
        Bson::Int32(1) | Bson::Int64(1) => false,
        _ => return Err(StoreError::InvalidUpdate("$pop requires 1 or -1".into())),
    };
    if let Some(items) = array_at_path(doc, path, false)? {
        if !items.is_empty() {
            if from_head {
                items.remove(0);
            } else {
                items.pop();
            }
        }
    }
    Ok(())
}

fn pull_all_path(doc: &mut Document, path: &str, values: &[Bson]) -> Result<(), StoreError> {
    if let Some(items) = array_at_path(doc, path, false)? {
        items.retain(|x| !values.iter().any(|v| bson_equal(x, v)));
    }
    Ok(())
}

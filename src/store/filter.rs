//! Filter evaluation for the bundled backend.
//!
//! Filters arrive in the store's native shape: a document whose top-level
//! keys are either field paths (dotted paths allowed) or the boolean
//! combinators `$or`/`$and`. A field's value is matched by equality
//! unless it is an operator document (`$gt`, `$gte`, `$lt`, `$lte`,
//! `$ne`, `$in`, `$exists`). Unknown operators match nothing.

use bson::{Bson, Document};
use std::cmp::Ordering;

const MAX_PATH_DEPTH: usize = 32;

#[must_use]
pub fn eval_filter(doc: &Document, filter: &Document) -> bool {
    for (key, cond) in filter {
        let key: &str = key;
        let hit = match (key, cond) {
            ("$or", Bson::Array(branches)) => branches
                .iter()
                .any(|b| matches!(b, Bson::Document(f) if eval_filter(doc, f))),
            ("$and", Bson::Array(branches)) => branches
                .iter()
                .all(|b| matches!(b, Bson::Document(f) if eval_filter(doc, f))),
            ("$or" | "$and", _) => false,
            (path, cond) => eval_field(doc, path, cond),
        };
        if !hit {
            return false;
        }
    }
    true
}

fn eval_field(doc: &Document, path: &str, cond: &Bson) -> bool {
    if let Bson::Document(ops) = cond {
        if ops.keys().any(|k| k.starts_with('$')) {
            return ops.iter().all(|(op, arg)| eval_op(doc, path, op, arg));
        }
    }
    get_path(doc, path).is_some_and(|v| bson_equal(v, cond))
}

fn eval_op(doc: &Document, path: &str, op: &str, arg: &Bson) -> bool {
    let value = get_path(doc, path);
    match op {
        "$exists" => {
            let want = matches!(arg, Bson::Boolean(true));
            value.is_some() == want
        }
        "$ne" => !value.is_some_and(|v| bson_equal(v, arg)),
        "$in" => match (value, arg) {
            (Some(v), Bson::Array(set)) => set.iter().any(|x| bson_equal(v, x)),
            _ => false,
        },
        "$gt" => cmp_is(value, arg, |o| o == Ordering::Greater),
        "$gte" => cmp_is(value, arg, |o| o != Ordering::Less),
        "$lt" => cmp_is(value, arg, |o| o == Ordering::Less),
        "$lte" => cmp_is(value, arg, |o| o != Ordering::Greater),
        _ => false,
    }
}

fn cmp_is(value: Option<&Bson>, arg: &Bson, pred: impl Fn(Ordering) -> bool) -> bool {
    value.is_some_and(|v| bson_cmp(v, arg).is_some_and(&pred))
}

/// Resolves a dotted path against a document, descending through nested
/// documents only.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut iter = path.split('.');
    let first = iter.next()?;
    let mut depth = 1usize;
    let mut cur: Option<&Bson> = doc.get(first);
    for part in iter {
        depth += 1;
        if depth > MAX_PATH_DEPTH {
            return None;
        }
        match cur {
            Some(Bson::Document(d)) => cur = d.get(part),
            _ => return None,
        }
    }
    cur
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Equality across the numeric BSON types, exact elsewhere.
#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
#[must_use]
pub fn bson_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Int32(x), Bson::Int64(y)) => i64::from(*x) == *y,
        (Bson::Int64(x), Bson::Int32(y)) => *x == i64::from(*y),
        (Bson::Int32(x), Bson::Double(y)) => f64::from(*x) == *y,
        (Bson::Double(x), Bson::Int32(y)) => *x == f64::from(*y),
        (Bson::Int64(x), Bson::Double(y)) => (*x as f64) == *y,
        (Bson::Double(x), Bson::Int64(y)) => *x == (*y as f64),
        _ => a == b,
    }
}

/// Orders two values when they are mutually comparable (numbers with
/// numbers, strings with strings, booleans with booleans).
#[must_use]
pub fn bson_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(af), Some(bf)) = (to_f64(a), to_f64(b)) {
        return af.partial_cmp(&bf);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

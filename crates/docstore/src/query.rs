//! Query evaluation shared by backends that filter documents locally.
//!
//! Supported filter forms:
//! - `{ field: value }` equality; a missing field equals `null`
//! - dotted paths into embedded documents (`metadata.owner`)
//! - operator documents: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
//!   `$nin`, `$exists`
//! - top-level `$and` / `$or` over arrays of filters

use crate::error::{DocStoreError, DocStoreResult};
use crate::traits::{Projection, SortOrder};
use gridstore_core::file::ID_FIELD;
use gridstore_core::{Document, Value};
use std::cmp::Ordering;

/// Resolve a dotted path against a document.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = document.get(first)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

/// Check whether `document` satisfies `filter`.
pub fn matches(document: &Document, filter: &Document) -> DocStoreResult<bool> {
    for (key, condition) in filter.iter() {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches(document, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, condition)? {
                    if matches(document, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(DocStoreError::InvalidQuery(format!(
                    "unsupported top-level operator {op}"
                )));
            }
            path => field_matches(lookup(document, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(op: &str, condition: &'a Value) -> DocStoreResult<Vec<&'a Document>> {
    let Value::Array(items) = condition else {
        return Err(DocStoreError::InvalidQuery(format!(
            "{op} expects an array of documents"
        )));
    };
    items
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                DocStoreError::InvalidQuery(format!("{op} expects an array of documents"))
            })
        })
        .collect()
}

fn is_operator_document(condition: &Value) -> bool {
    match condition.as_document() {
        Some(doc) => !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')),
        None => false,
    }
}

fn field_matches(field: Option<&Value>, condition: &Value) -> DocStoreResult<bool> {
    if !is_operator_document(condition) {
        return Ok(equals(field, condition));
    }

    let Some(operators) = condition.as_document() else {
        return Ok(false);
    };
    for (op, operand) in operators.iter() {
        let matched = match op.as_str() {
            "$eq" => equals(field, operand),
            "$ne" => !equals(field, operand),
            "$gt" => ordered(field, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(field, operand, |o| o != Ordering::Less),
            "$lt" => ordered(field, operand, |o| o == Ordering::Less),
            "$lte" => ordered(field, operand, |o| o != Ordering::Greater),
            "$in" => in_list(op, field, operand)?,
            "$nin" => !in_list(op, field, operand)?,
            "$exists" => {
                let wanted = match operand {
                    Value::Bool(b) => *b,
                    other => other.as_i64().is_some_and(|v| v != 0),
                };
                field.is_some() == wanted
            }
            other => {
                return Err(DocStoreError::InvalidQuery(format!(
                    "unsupported operator {other}"
                )));
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(Value::Array(items)) if !matches!(expected, Value::Array(_)) => {
            items.iter().any(|item| item.loosely_equals(expected))
        }
        Some(value) => value.loosely_equals(expected),
    }
}

fn ordered(field: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match field {
        // Range operators never match across types.
        Some(value) if same_kind(value, operand) => accept(value.compare(operand)),
        _ => false,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    a.as_f64().is_some() && b.as_f64().is_some() || a.type_name() == b.type_name()
}

fn in_list(op: &str, field: Option<&Value>, operand: &Value) -> DocStoreResult<bool> {
    let Value::Array(candidates) = operand else {
        return Err(DocStoreError::InvalidQuery(format!("{op} expects an array")));
    };
    Ok(candidates.iter().any(|candidate| equals(field, candidate)))
}

/// Order documents by a list of `(path, direction)` keys.
pub fn sort_documents(documents: &mut [Document], sort: &[(String, SortOrder)]) {
    if sort.is_empty() {
        return;
    }
    documents.sort_by(|a, b| compare_by(a, b, sort));
}

/// Compare two documents under a sort specification. Missing fields sort as `null`.
pub fn compare_by(a: &Document, b: &Document, sort: &[(String, SortOrder)]) -> Ordering {
    for (path, order) in sort {
        let left = lookup(a, path).unwrap_or(&Value::Null);
        let right = lookup(b, path).unwrap_or(&Value::Null);
        let ord = match order {
            SortOrder::Ascending => left.compare(right),
            SortOrder::Descending => right.compare(left),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Keep `_id` plus the projected top-level fields.
pub fn project(document: Document, projection: &Projection) -> Document {
    document
        .into_iter()
        .filter(|(key, _)| key == ID_FIELD || projection.include.iter().any(|f| f == key))
        .collect()
}

/// Apply an update document in place.
///
/// Documents whose keys are all operators use `$set` / `$unset` / `$inc`;
/// any other document replaces every field but `_id`.
pub fn apply_update(target: &mut Document, update: &Document) -> DocStoreResult<()> {
    let operator_form = update.keys().any(|k| k.starts_with('$'));
    if !operator_form {
        let id = target.get(ID_FIELD).cloned();
        *target = update.clone();
        if let Some(id) = id {
            target.insert(ID_FIELD, id);
        }
        return Ok(());
    }

    for (op, operand) in update.iter() {
        let fields = operand.as_document().ok_or_else(|| {
            DocStoreError::InvalidQuery(format!("{op} expects a document operand"))
        })?;
        for (field, value) in fields.iter() {
            if field == ID_FIELD {
                return Err(DocStoreError::InvalidQuery(
                    "the _id field cannot be modified".to_string(),
                ));
            }
            match op.as_str() {
                "$set" => {
                    target.insert(field.clone(), value.clone());
                }
                "$unset" => {
                    target.remove(field);
                }
                "$inc" => {
                    let current = target.get(field).cloned().unwrap_or(Value::Int32(0));
                    let next = increment(&current, value).ok_or_else(|| {
                        DocStoreError::InvalidQuery(format!(
                            "cannot $inc {} field {field}",
                            current.type_name()
                        ))
                    })?;
                    target.insert(field.clone(), next);
                }
                other => {
                    return Err(DocStoreError::InvalidQuery(format!(
                        "unsupported update operator {other}"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn increment(current: &Value, by: &Value) -> Option<Value> {
    match (current, by) {
        (Value::Int32(a), Value::Int32(b)) => Some(a.checked_add(*b).map_or_else(
            || Value::Int64(i64::from(*a) + i64::from(*b)),
            Value::Int32,
        )),
        (Value::Double(_), _) | (_, Value::Double(_)) => {
            Some(Value::Double(current.as_f64()? + by.as_f64()?))
        }
        _ => Some(Value::Int64(current.as_i64()?.checked_add(by.as_i64()?)?)),
    }
}

/// Build the seed document for an upsert from the equality terms of a filter.
pub fn upsert_seed(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(key, value)| {
            !key.starts_with('$') && !key.contains('.') && !is_operator_document(value)
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

//! C3: the reassembler (spec §4.3).
//!
//! Rebuilds the original value from a set of leaf fragments, using the
//! explicit `key_path`/`split_index`/`split_kind` coordinates the chunker
//! attached at emission time (see `chunk.rs`) instead of parsing `chunk_id`.

use crate::chunk::SplitKind;
use crate::error::{Result, StorageError};
use crate::model::FragmentRecord;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Outcome of a reassembly attempt: the recovered value, and whether any
/// fragments were missing or had to be dropped for ambiguity (spec §7:
/// search-time warnings don't poison the successful portion of a response).
#[derive(Debug, Clone)]
pub struct Reassembled {
    pub value: Value,
    pub incomplete: bool,
}

struct Piece {
    key_path: Vec<String>,
    split: Option<(u64, SplitKind)>,
    idx: u64,
    data: Value,
}

/// Reassembles all leaf-level fragments of one (rid, op) write group.
pub fn reassemble(fragments: &[FragmentRecord]) -> Result<Reassembled> {
    if fragments.is_empty() {
        return StorageError::empty_fragment_set();
    }

    let total = fragments[0].total;
    if total == 1 {
        return Ok(Reassembled { value: fragments[0].data.clone(), incomplete: false });
    }

    let present = fragments.len();
    let incomplete = (present as u64) < total;
    if incomplete {
        log::warn!(
            "reassembling {} of {} declared fragments for rid={} op={}; surfacing partial result",
            present,
            total,
            fragments[0].rid,
            fragments[0].operation,
        );
    } else {
        // A full (or over-full) fragment set still has to be the exact
        // multiset {0, .., total-1} (spec §8 invariant 3) — a duplicate or
        // out-of-range index here means the data is corrupt, not merely
        // incomplete, and must not be tolerated the way a short fetch is.
        check_contiguous(fragments)?;
    }

    let pieces: Vec<Piece> = fragments
        .iter()
        .map(|f| Piece {
            key_path: f.key_path.clone(),
            split: f.split_index.zip(f.split_kind),
            idx: f.index,
            data: f.data.clone(),
        })
        .collect();

    // Every piece's full position is its key_path alone — a split only ever
    // happens on top of one key_path, never nested within another split — so
    // collapsing split groups into single (key_path, value) pieces is one
    // flat pass, not a depth-by-depth ancestry walk.
    let mut groups: BTreeMap<Vec<String>, Vec<Piece>> = BTreeMap::new();
    for p in pieces {
        groups.entry(p.key_path.clone()).or_default().push(p);
    }

    let mut entries: Vec<(Vec<String>, Value)> = Vec::new();
    for (key_path, mut members) in groups {
        if members.len() == 1 && members[0].split.is_none() {
            entries.push((key_path, members.pop().unwrap().data));
            continue;
        }
        members.sort_by_key(|m| m.split.map(|(k, _)| k).unwrap_or(0));
        // Every member at this key_path was produced by the same split call,
        // so its kind is uniform across the group — read it off the first
        // member rather than guessing from the data, which breaks when an
        // oversized leaf's merged piece (a string) sits next to plain
        // array/mapping buckets (see chunk.rs's `SplitKind`).
        let kind = members[0].split.map(|(_, kind)| kind);
        if kind == Some(SplitKind::Arr) {
            // A bucket's own `split` index is its first element's *global*
            // array position (see chunk_array), so its elements can't just
            // be concatenated back together: an oversized sibling element,
            // recursed into separately under key_path + [index], may sit in
            // the gap between two buckets. Explode each bucket into its
            // individually-indexed elements instead and let tree composition
            // place every element — bucketed or recursed — by its true
            // index, same as an object field lands by name.
            for m in members {
                let start = m.split.map(|(k, _)| k).unwrap_or(0);
                match m.data {
                    Value::Array(items) => {
                        for (i, item) in items.into_iter().enumerate() {
                            let mut path = key_path.clone();
                            path.push((start + i as u64).to_string());
                            entries.push((path, item));
                        }
                    }
                    other => log::warn!("dropping non-array piece {other:?} while exploding an array fragment group"),
                }
            }
        } else {
            let merged = concat_values(kind, members.into_iter().map(|m| m.data).collect());
            entries.push((key_path, merged));
        }
    }

    let value = compose_tree(entries);
    Ok(Reassembled { value, incomplete })
}

/// Checks that the *multiset* of `idx` values is exactly `{0, .., total-1}`
/// — no gaps, and no duplicates either, since a duplicate would silently
/// make some other index missing from the multiset (spec §3, §8 invariant 3).
pub fn check_contiguous(fragments: &[FragmentRecord]) -> Result<()> {
    if fragments.is_empty() {
        return StorageError::empty_fragment_set();
    }
    let total = fragments[0].total;
    if fragments.len() as u64 != total {
        return Err(StorageError::FragmentSequenceError {
            rid: fragments[0].rid.to_string(),
            op: fragments[0].operation.to_string(),
        }
        .into());
    }
    let mut seen = vec![false; total as usize];
    for f in fragments {
        if f.index >= total || seen[f.index as usize] {
            return Err(StorageError::FragmentSequenceError {
                rid: f.rid.to_string(),
                op: f.operation.to_string(),
            }
            .into());
        }
        seen[f.index as usize] = true;
    }
    if seen.iter().all(|s| *s) {
        Ok(())
    } else {
        Err(StorageError::FragmentSequenceError {
            rid: fragments[0].rid.to_string(),
            op: fragments[0].operation.to_string(),
        }
        .into())
    }
}

/// Concatenates same-content-path pieces per spec §4.3 rule 2, dispatching
/// on the *explicit* split kind recorded at emission time rather than
/// sniffing the first piece's data type. `SplitKind::Arr` groups are handled
/// separately (see `reassemble`'s per-element explosion) since bucket
/// concatenation can't account for a gap left by an oversized sibling
/// element recursed into under its own index segment.
///
/// A piece whose data disagrees with the declared kind (only reachable via
/// a corrupted/adversarial fragment set) is dropped with a warning (the
/// ambiguity policy) rather than poisoning the merge.
fn concat_values(kind: Option<SplitKind>, values: Vec<Value>) -> Value {
    match kind {
        Some(SplitKind::Str) => {
            let mut s = String::new();
            for v in &values {
                match v {
                    Value::String(piece) => s.push_str(piece),
                    other => log::warn!("dropping non-string piece {other:?} while concatenating a string fragment group"),
                }
            }
            Value::String(s)
        }
        Some(SplitKind::Obj) => {
            let mut map = Map::new();
            for v in &values {
                match v {
                    Value::Object(entries) => {
                        for (k, val) in entries {
                            map.insert(k.clone(), val.clone());
                        }
                    }
                    other => log::warn!("dropping non-object piece {other:?} while merging a mapping fragment group"),
                }
            }
            Value::Object(map)
        }
        Some(SplitKind::Arr) => unreachable!("Arr groups are exploded before concat_values is called"),
        None => values.into_iter().next().unwrap_or(Value::Null),
    }
}

/// Places every resolved (key_path, value) piece into the overall container,
/// per spec §4.3 rule 3 — but driven by the explicit key_path rather than a
/// regex-recovered one. A segment that parses as a non-negative integer
/// indexes an array; any other segment indexes a mapping.
fn compose_tree(pieces: Vec<(Vec<String>, Value)>) -> Value {
    let mut root: Option<Value> = None;
    let mut children: Vec<(Vec<String>, Value)> = Vec::new();

    for (path, data) in pieces {
        if path.is_empty() {
            root = Some(data);
        } else {
            children.push((path, data));
        }
    }

    if children.is_empty() {
        return root.unwrap_or(Value::Null);
    }

    let mut base = match root {
        Some(v @ Value::Object(_)) | Some(v @ Value::Array(_)) => v,
        Some(other) => {
            log::warn!("dropping fragment at the root: {other:?} has keyed children but isn't a container");
            Value::Null
        }
        None => Value::Null,
    };

    // Insert longer paths first so that a slot two fragment groups both
    // target (a bucket's whole-element value and a deeper oversized-field
    // value recursed out of that same element) sees the deeper write first
    // and the shallower one merges into it rather than overwriting it.
    children.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    for (path, value) in children {
        insert_at(&mut base, &path, value);
    }
    base
}

fn is_index(segment: &str) -> Option<usize> {
    if segment == "0" {
        return Some(0);
    }
    if segment.starts_with('0') || !segment.chars().all(|c| c.is_ascii_digit()) || segment.is_empty() {
        return None;
    }
    segment.parse().ok()
}

fn insert_at(container: &mut Value, path: &[String], value: Value) {
    let (head, rest) = (&path[0], &path[1..]);

    if let Some(i) = is_index(head) {
        if !matches!(container, Value::Array(_)) {
            *container = Value::Array(vec![]);
        }
        let Value::Array(arr) = container else { unreachable!() };
        if arr.len() <= i {
            arr.resize(i + 1, Value::Null);
        }
        if rest.is_empty() {
            merge_leaf(&mut arr[i], value);
        } else {
            insert_at(&mut arr[i], rest, value);
        }
        return;
    }

    if !matches!(container, Value::Object(_)) {
        *container = Value::Object(Map::new());
    }
    let Value::Object(map) = container else { unreachable!() };
    if rest.is_empty() {
        let entry = map.entry(head.clone()).or_insert(Value::Null);
        merge_leaf(entry, value);
        return;
    }
    let entry = map.entry(head.clone()).or_insert(Value::Null);
    insert_at(entry, rest, value);
}

/// Combines a value already sitting at a path with one that resolves to the
/// same path from a different fragment group. The only legitimate overlap
/// is an array/mapping element whose non-oversized fields landed here as a
/// bucket and whose oversized field landed here separately (both sharing
/// this element's index segment) — in that case both are mappings and get
/// merged field-by-field; anything else means one of the two groups simply
/// hasn't been written yet (`Value::Null` placeholder) and the other wins.
fn merge_leaf(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(existing_map), Value::Object(incoming_map)) => {
            for (k, v) in incoming_map {
                existing_map.insert(k, v);
            }
        }
        (slot, incoming) => {
            if !matches!(slot, Value::Null) {
                log::warn!("overwriting non-mapping value at a content path with {incoming:?}");
            }
            *slot = incoming;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk;
    use crate::model::Op;
    use serde_json::json;
    use uuid::Uuid;

    fn build_group(value: &Value, max_len: usize, op: Op) -> Vec<FragmentRecord> {
        let pieces = chunk(value, max_len);
        let total = pieces.len() as u64;
        let rid = Uuid::new_v4();
        pieces
            .into_iter()
            .enumerate()
            .map(|(idx, p)| FragmentRecord {
                rid,
                operation: op,
                chunk_id: p.cid,
                key_path: p.key_path,
                split_index: p.split.map(|(k, _)| k),
                split_kind: p.split.map(|(_, kind)| kind),
                index: idx as u64,
                total,
                encrypted: false,
                data: p.data,
                seq: idx as u64,
            })
            .collect()
    }

    #[test]
    fn round_trip_scalar() {
        let value = json!(42);
        let frags = build_group(&value, 60_000, Op::Create);
        let out = reassemble(&frags).unwrap();
        assert_eq!(out.value, value);
        assert!(!out.incomplete);
    }

    #[test]
    fn round_trip_oversized_string() {
        let value = json!("abcdefghij");
        let frags = build_group(&value, 4, Op::Create);
        assert_eq!(frags.len(), 3);
        let out = reassemble(&frags).unwrap();
        assert_eq!(out.value, value);
    }

    #[test]
    fn round_trip_nested_mapping() {
        let value = json!({"a": "X".repeat(10), "b": 1});
        let frags = build_group(&value, 4, Op::Create);
        let out = reassemble(&frags).unwrap();
        assert_eq!(out.value, value);
    }

    #[test]
    fn round_trip_array_with_oversized_element() {
        let value = json!(["small", "y".repeat(30), "also-small", [1, 2, 3]]);
        let frags = build_group(&value, 8, Op::Create);
        let out = reassemble(&frags).unwrap();
        assert_eq!(out.value, value);
    }

    #[test]
    fn round_trip_array_whose_first_element_is_the_oversized_one() {
        // Regression test: when the oversized element lands at bucket index
        // 0, its merged piece (a String) must not make the whole sibling
        // group's concatenation type look like "string" and drop the
        // plain-array buckets that follow it.
        let value = json!(["y".repeat(30), "small", "also"]);
        let frags = build_group(&value, 8, Op::Create);
        let out = reassemble(&frags).unwrap();
        assert_eq!(out.value, value);
    }

    #[test]
    fn round_trip_deeply_nested_object() {
        let value = json!({
            "users": [
                {"name": "a".repeat(20), "age": 1},
                {"name": "b".repeat(20), "age": 2},
            ],
            "meta": {"count": 2, "note": "z".repeat(40)},
        });
        let frags = build_group(&value, 10, Op::Update);
        let out = reassemble(&frags).unwrap();
        assert_eq!(out.value, value);
    }

    #[test]
    fn round_trip_array_of_objects_each_with_its_own_oversized_field() {
        // Regression test: every element shares the same key_path for its
        // oversized field ("users.<i>.bio"); only the index segment each
        // element's recursive sub-chunk carries tells them apart, so two
        // different users' bios must never be concatenated together.
        let value = json!({
            "users": (0..5).map(|i| json!({"name": format!("user-{i}"), "bio": "x".repeat(40)})).collect::<Vec<_>>(),
        });
        let frags = build_group(&value, 16, Op::Create);
        let out = reassemble(&frags).unwrap();
        assert_eq!(out.value, value);
    }

    #[test]
    fn empty_fragment_set_errors() {
        let err = reassemble(&[]);
        assert!(err.is_err());
    }

    #[test]
    fn partial_fragment_set_is_marked_incomplete() {
        let value = json!("abcdefghijklmnop");
        let mut frags = build_group(&value, 4, Op::Create);
        frags.remove(1);
        let out = reassemble(&frags).unwrap();
        assert!(out.incomplete);
    }

    #[test]
    fn duplicate_index_with_full_count_is_a_sequence_error_not_incomplete() {
        // All `total` fragments are present, but index 1 is duplicated and
        // index 2 is missing — a corrupt multiset, not merely a short fetch.
        let value = json!("abcdefghijklmnop");
        let mut frags = build_group(&value, 4, Op::Create);
        let dup = frags[1].clone();
        frags[2] = dup;
        let err = reassemble(&frags);
        assert!(matches!(
            err,
            Err(e) if matches!(e.kind(), crate::error::ErrorKind::StorageError(StorageError::FragmentSequenceError { .. }))
        ));
    }

    #[test]
    fn contiguous_full_set_passes_check_contiguous() {
        let value = json!("abcdefghijklmnop");
        let frags = build_group(&value, 4, Op::Create);
        assert!(check_contiguous(&frags).is_ok());
    }
}

//! C2: the chunker (spec §4.2).
//!
//! Splits an arbitrarily large JSON value into fragments no larger than the
//! configured virtual length `L`. Every piece carries explicit structural
//! coordinates instead of the original design's sentinel objects and a later
//! regex pass over `chunk_id` strings (flagged as brittle in spec §9):
//!
//! - `key_path` — the full path from the root down to this piece, as a
//!   sequence of segments. A mapping edge is the field name; an array edge
//!   (taken only when an array element is individually oversized and gets
//!   its own recursive sub-chunking) is the stringified index — spec §4.3
//!   rule 3's "segments that parse as non-negative integers index arrays".
//! - `split` — `Some((k, kind))` when this piece is the k-th slice of a
//!   value that didn't fit whole at `key_path` (a string cut into pieces, or
//!   one bucket of an array/mapping's greedy packing), `None` when it's the
//!   entire value at that path. `kind` records which of those three ways
//!   produced the split, so the reassembler concatenates by the way the
//!   piece was actually built instead of guessing from its data's JSON type.
//!
//! Because every descent — mapping field *or* array index — extends
//! `key_path`, a value never needs more than one level of `split` on top of
//! its path: there is no separate "nested under a bucket under a bucket"
//! bookkeeping to get wrong.

use crate::size::{scalar_string, virtual_length};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default per-fragment virtual-length ceiling (spec §6 `max_chunk_length`).
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 60_000;

/// What kind of container a `split` index was produced by — recorded
/// explicitly at emission time (spec §9's redesign note) rather than left
/// for the read side to infer from a fragment's data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    Str,
    Arr,
    Obj,
}

#[derive(Debug, Clone)]
pub struct FragPiece {
    pub cid: String,
    pub key_path: Vec<String>,
    pub split: Option<(u64, SplitKind)>,
    pub data: Value,
}

/// Splits `value` into an ordered list of pieces, none exceeding `max_len`
/// virtual length (barring an individually oversized leaf, which is
/// recursively split further rather than ever emitted whole).
pub fn chunk(value: &Value, max_len: usize) -> Vec<FragPiece> {
    chunk_at(value, max_len, "root0", &[])
}

fn chunk_at(value: &Value, l: usize, cid: &str, key_path: &[String]) -> Vec<FragPiece> {
    match value {
        Value::String(s) => chunk_string(s, l, cid, key_path),
        Value::Array(items) => chunk_array(items, l, cid, key_path),
        Value::Object(map) => chunk_object(map, l, cid, key_path),
        other => {
            if virtual_length(other) <= l {
                vec![FragPiece { cid: cid.to_string(), key_path: key_path.to_vec(), split: None, data: other.clone() }]
            } else {
                chunk_string(&scalar_string(other), l, cid, key_path)
            }
        }
    }
}

fn chunk_string(s: &str, l: usize, cid: &str, key_path: &[String]) -> Vec<FragPiece> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= l.max(1) {
        return vec![FragPiece {
            cid: cid.to_string(),
            key_path: key_path.to_vec(),
            split: None,
            data: Value::String(s.to_string()),
        }];
    }

    chars
        .chunks(l.max(1))
        .enumerate()
        .map(|(k, piece)| FragPiece {
            cid: format!("{cid}.c{k}"),
            key_path: key_path.to_vec(),
            split: Some((k as u64, SplitKind::Str)),
            data: Value::String(piece.iter().collect()),
        })
        .collect()
}

fn chunk_array(items: &[Value], l: usize, cid: &str, key_path: &[String]) -> Vec<FragPiece> {
    let mut out = Vec::new();
    let mut bucket: Vec<Value> = Vec::new();
    let mut bucket_start = 0u64;
    let mut bucket_len = 0usize;
    let mut pos = 0u64;

    // A bucket's `split` index is the *global* array position of its first
    // element, not a sequential bucket counter — an oversized element
    // recursed into separately still consumes a position, and the
    // reassembler needs every bucket's elements to land at their true
    // index even when an oversized element's slot falls in between two
    // buckets.
    macro_rules! flush_bucket {
        () => {
            if !bucket.is_empty() {
                out.push(FragPiece {
                    cid: format!("{cid}.c{bucket_start}"),
                    key_path: key_path.to_vec(),
                    split: Some((bucket_start, SplitKind::Arr)),
                    data: Value::Array(std::mem::take(&mut bucket)),
                });
                bucket_len = 0;
            }
        };
    }

    for item in items {
        let item_len = virtual_length(item);
        if item_len > l {
            flush_bucket!();
            // An individually oversized element gets its own path segment
            // (its array index) and is chunked as a fresh sub-problem — its
            // internal fields never need to inherit anything from this
            // array's own bucket numbering, so a field of this element that
            // is *itself* oversized (e.g. one array-of-objects element with
            // an oversized string field) still resolves to a unique
            // `key_path` no sibling element can collide with.
            let mut nested_key_path = key_path.to_vec();
            nested_key_path.push(pos.to_string());
            let nested_cid = format!("{cid}.c{pos}");
            out.extend(chunk_at(item, l, &nested_cid, &nested_key_path));
        } else if bucket_len + item_len > l && !bucket.is_empty() {
            flush_bucket!();
            bucket_start = pos;
            bucket.push(item.clone());
            bucket_len = item_len;
        } else {
            if bucket.is_empty() {
                bucket_start = pos;
            }
            bucket.push(item.clone());
            bucket_len += item_len;
        }
        pos += 1;
    }
    flush_bucket!();

    if out.is_empty() {
        out.push(FragPiece { cid: cid.to_string(), key_path: key_path.to_vec(), split: None, data: Value::Array(vec![]) });
    }

    out
}

fn chunk_object(map: &Map<String, Value>, l: usize, cid: &str, key_path: &[String]) -> Vec<FragPiece> {
    let mut out = Vec::new();
    let mut bucket: Map<String, Value> = Map::new();
    let mut bucket_len = 0usize;
    let mut k = 0u64;

    macro_rules! flush_bucket {
        () => {
            if !bucket.is_empty() {
                out.push(FragPiece {
                    cid: format!("{cid}.c{k}"),
                    key_path: key_path.to_vec(),
                    split: Some((k, SplitKind::Obj)),
                    data: Value::Object(std::mem::take(&mut bucket)),
                });
                k += 1;
                bucket_len = 0;
            }
        };
    }

    for (key, value) in map {
        let weight = key.chars().count() + virtual_length(value);
        if weight > l {
            flush_bucket!();
            let mut nested_key_path = key_path.to_vec();
            nested_key_path.push(key.clone());
            let nested_cid = format!("{cid}.{key}");
            out.extend(chunk_at(value, l, &nested_cid, &nested_key_path));
        } else if bucket_len + weight > l && !bucket.is_empty() {
            flush_bucket!();
            bucket.insert(key.clone(), value.clone());
            bucket_len = weight;
        } else {
            bucket.insert(key.clone(), value.clone());
            bucket_len += weight;
        }
    }
    flush_bucket!();

    if out.is_empty() {
        out.push(FragPiece { cid: cid.to_string(), key_path: key_path.to_vec(), split: None, data: Value::Object(Map::new()) });
    }

    out
}

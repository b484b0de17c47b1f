//! Shared data model (spec §3): the record identifier, the operation tag
//! every write/read/delete carries, and the wire shape of one log line.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Opaque 128-bit record identifier, minted at create time.
pub type Rid = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Create,
    Update,
    Read,
    Delete,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Create => "create",
            Op::Update => "update",
            Op::Read => "read",
            Op::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fragment, as it appears on the wire (one JSON object per log line).
///
/// `key_path` is the explicit structural coordinate the chunker assigns at
/// emission time (see `chunk` module docs) — it lets the reassembler
/// recover a fragment's place in the original value without parsing
/// `chunk_id`, which only exists for human-readable log display. `split_*`
/// is set only when this fragment is one of several slices at `key_path`
/// (a cut-up string, or one bucket of an array/mapping's greedy packing);
/// it's `None` when the fragment is the whole value at that path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentRecord {
    #[serde(rename = "__id")]
    pub rid: Rid,
    pub operation: Op,
    #[serde(rename = "chunkId")]
    pub chunk_id: String,
    #[serde(rename = "keyPath", default)]
    pub key_path: Vec<String>,
    #[serde(rename = "splitIndex", default, skip_serializing_if = "Option::is_none")]
    pub split_index: Option<u64>,
    #[serde(rename = "splitKind", default, skip_serializing_if = "Option::is_none")]
    pub split_kind: Option<crate::chunk::SplitKind>,
    pub index: u64,
    pub total: u64,
    pub encrypted: bool,
    pub data: Value,
    /// Per-process monotonic tie-breaker for platforms with coarse log
    /// timestamps (spec §9 design note).
    #[serde(default)]
    pub seq: u64,
}

/// The result of a create/update/read: what the caller gets back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub rid: Rid,
    pub value: Value,
    /// Set when a read recovered fewer fragments than the write group
    /// declared, even after the repair pass (spec §7 `IncompleteFragmentSet`,
    /// surfaced as a sentinel rather than a hard failure). Absent on a
    /// normal, fully-reassembled record.
    #[serde(rename = "_incomplete", default, skip_serializing_if = "is_false")]
    pub incomplete: bool,
}

fn is_false(b: &bool) -> bool {
    !b
}

impl Record {
    pub fn complete(rid: Rid, value: Value) -> Self {
        Self { rid, value, incomplete: false }
    }
}

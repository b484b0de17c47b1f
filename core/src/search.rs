//! C6: the search protocol (spec §4.6).
//!
//! Translates a query into the platform's filter syntax, runs it, repairs
//! incomplete chunk groups with a targeted follow-up query, and reduces the
//! surviving fragments to records.

use crate::backboard::LogSearchBackend;
use crate::cipher::{self, KeyInput};
use crate::config::Config;
use crate::error::Result;
use crate::model::{FragmentRecord, Op, Rid};
use crate::reassemble::reassemble;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// A query against the log-search index (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct SearchSpec {
    pub rid: Option<Rid>,
    pub op: Option<Op>,
    pub attributes: BTreeMap<String, String>,
    /// Raw passthrough, appended to the translated filter with `AND`.
    pub filter: Option<String>,
    pub exclude: Predicate,
    pub limit: usize,
}

/// The negated half of a search spec — same shape, joined with a leading `-`.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    pub rid: Option<Rid>,
    pub op: Option<Op>,
    pub attributes: BTreeMap<String, String>,
}

impl SearchSpec {
    /// `dataFromId(rid)`, spec §4.6: excludes `op=read` so retrieval audit
    /// lines never shadow the real state.
    pub fn data_from_id(rid: Rid) -> Self {
        SearchSpec {
            rid: Some(rid),
            exclude: Predicate { op: Some(Op::Read), ..Default::default() },
            limit: 1,
            ..Default::default()
        }
    }
}

fn translate_filter(spec: &SearchSpec) -> String {
    let mut clauses = Vec::new();

    if let Some(rid) = spec.rid {
        clauses.push(format!("@__id:\"{rid}\""));
    }
    if let Some(op) = spec.op {
        clauses.push(format!("@operation:\"{op}\""));
    }
    for (key, value) in &spec.attributes {
        clauses.push(format!("@{key}:\"{value}\""));
    }

    if let Some(rid) = spec.exclude.rid {
        clauses.push(format!("-@__id:\"{rid}\""));
    }
    if let Some(op) = spec.exclude.op {
        clauses.push(format!("-@operation:\"{op}\""));
    }
    for (key, value) in &spec.exclude.attributes {
        clauses.push(format!("-@{key}:\"{value}\""));
    }

    if let Some(raw) = &spec.filter {
        clauses.push(raw.clone());
    }

    clauses.join(" AND ")
}

/// One reduced write group: which operation produced it and its recovered
/// value. Exposing `op` (rather than collapsing straight to a `Record`) lets
/// callers recognize a tombstone — the façade's `read` uses this to make
/// `delete` hide state per spec §3's lifecycle invariant.
#[derive(Debug, Clone)]
pub struct Hit {
    pub rid: Rid,
    pub op: Op,
    pub value: Value,
    /// Set when this hit's write group came back short of its declared
    /// `total` even after the repair pass (spec §7 `IncompleteFragmentSet`).
    pub incomplete: bool,
    /// Fragments actually present / declared `total`, populated only when
    /// `incomplete` is set — enough detail for a caller in strict mode to
    /// construct `StorageError::IncompleteFragmentSet` itself.
    pub present: usize,
    pub total: u64,
}

struct ParsedFragment {
    fragment: FragmentRecord,
    timestamp: DateTime<Utc>,
}

/// Log timestamp paired with the per-process `seq` tie-breaker (spec §9):
/// the platform's log timestamp is the primary ordering axis, `seq` breaks
/// ties when its resolution is coarse.
type SortKey = (DateTime<Utc>, u64);

fn parse_entries(entries: Vec<crate::backboard::LogEntry>) -> Vec<ParsedFragment> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut map = serde_json::Map::new();
        for attr in &entry.attributes {
            match serde_json::from_str::<serde_json::Value>(&attr.value) {
                Ok(value) => {
                    map.insert(attr.key.clone(), value);
                }
                Err(e) => {
                    log::warn!("dropping unparsable log attribute {}: {e}", attr.key);
                }
            }
        }
        match serde_json::from_value::<FragmentRecord>(serde_json::Value::Object(map)) {
            Ok(fragment) => out.push(ParsedFragment { fragment, timestamp: entry.timestamp }),
            Err(e) => log::warn!("dropping log entry that doesn't shape into a fragment: {e}"),
        }
    }
    out
}

/// Runs `spec` against the backboard, repairs incomplete (rid, op) groups,
/// reassembles each to a record, and returns up to `spec.limit` hits with
/// the newest write group for each rid winning (spec §4.6 "reduce to
/// records"). Callers that need to distinguish a tombstone from a live
/// value (the façade's `read`, per spec §3's lifecycle) use `Hit::op`.
pub async fn search(client: &dyn LogSearchBackend, config: &Config, spec: &SearchSpec, key: Option<&KeyInput>) -> Result<Vec<Hit>> {
    let deployment = config.deployment_id.as_deref();
    let environment = config.environment_id.as_deref();
    let deadline = Duration::from_secs(config.request_timeout_secs);

    let filter = translate_filter(spec);
    let fetch_limit = (spec.limit.max(1) * 10).max(config.max_log_request_size);

    let raw = client.search_logs(deployment, environment, &filter, fetch_limit, deadline).await?;
    let mut parsed = parse_entries(raw);

    // Group by (rid, op) — a write group is defined at that granularity
    // (spec §3) — then repair any group short of its declared total.
    let mut groups: BTreeMap<(Rid, Op), Vec<ParsedFragment>> = BTreeMap::new();
    for p in parsed.drain(..) {
        groups.entry((p.fragment.rid, p.fragment.operation)).or_default().push(p);
    }

    let mut repaired_groups = Vec::with_capacity(groups.len());
    for ((rid, op), mut members) in groups {
        let total = members.first().map(|m| m.fragment.total).unwrap_or(1);
        if (members.len() as u64) < total {
            let repair_filter = format!("@__id:\"{rid}\" AND @operation:\"{op}\"");
            let repair_limit = (2 * total) as usize;
            match client.search_logs(deployment, environment, &repair_filter, repair_limit, deadline).await {
                Ok(entries) => {
                    let mut seen: std::collections::HashSet<u64> = members.iter().map(|m| m.fragment.index).collect();
                    for p in parse_entries(entries) {
                        if p.fragment.rid == rid && p.fragment.operation == op && seen.insert(p.fragment.index) {
                            members.push(p);
                        }
                    }
                }
                Err(e) => log::warn!("repair fetch for rid={rid} op={op} failed: {e}"),
            }
        }
        repaired_groups.push((rid, op, members));
    }

    // Reduce each (rid, op) group to a hit, then let the newest write group
    // per rid win — including a `delete` group, which must win over an
    // older `create`/`update` so a tombstoned rid reads back as gone. Ties
    // in the log platform's timestamp (coarse on some platforms, per spec
    // §9) are broken by the per-process monotonic `seq` attached at
    // emission time: the higher `seq` within a tied timestamp is newer.
    let mut latest_per_rid: BTreeMap<Rid, (SortKey, Hit)> = BTreeMap::new();
    for (rid, op, members) in repaired_groups {
        let ordering = members
            .iter()
            .map(|m| (m.timestamp, m.fragment.seq))
            .max()
            .unwrap_or_else(|| (Utc::now(), 0));
        let fragments: Vec<FragmentRecord> = members.into_iter().map(|m| m.fragment).collect();
        if fragments.is_empty() {
            continue;
        }

        if op == Op::Delete {
            let candidate = Hit { rid, op, value: Value::Null, incomplete: false, present: 0, total: 0 };
            match latest_per_rid.get(&rid) {
                Some((ts, _)) if *ts >= ordering => {}
                _ => {
                    latest_per_rid.insert(rid, (ordering, candidate));
                }
            }
            continue;
        }

        let total = fragments[0].total;
        let present = fragments.len();
        let (value, incomplete) = if total == 1 {
            (fragments[0].data.clone(), false)
        } else {
            let reassembled = reassemble(&fragments)?;
            (reassembled.value, reassembled.incomplete)
        };

        // Encryption-key absence or a mismatched key is fatal to this read
        // (spec §7): unlike the tolerant drop-and-warn treatment of
        // incomplete chunk groups above, a decrypt failure never silently
        // degrades to "not found" — it surfaces as `DecryptionError`.
        let encrypted = fragments.iter().any(|f| f.encrypted);
        let value = if encrypted {
            let key = key.ok_or_else(|| {
                crate::error::StorageError::DecryptionError(format!("rid={rid} is encrypted but no key was supplied"))
            })?;
            let blob = value.as_str().map(|s| s.to_string()).unwrap_or_default();
            cipher::decrypt(&blob, key)?
        } else {
            value
        };

        let candidate = Hit { rid, op, value, incomplete, present, total };
        match latest_per_rid.get(&rid) {
            Some((ts, _)) if *ts >= ordering => {}
            _ => {
                latest_per_rid.insert(rid, (ordering, candidate));
            }
        }
    }

    let mut hits: Vec<(SortKey, Hit)> = latest_per_rid.into_values().collect();
    hits.sort_by(|a, b| b.0.cmp(&a.0));
    hits.truncate(spec.limit.max(1));

    Ok(hits.into_iter().map(|(_, h)| h).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_filter_joins_with_and_and_negates_exclusions() {
        let spec = SearchSpec {
            rid: None,
            op: Some(Op::Create),
            attributes: BTreeMap::from([("status".to_string(), "ok".to_string())]),
            filter: Some("@extra:\"1\"".to_string()),
            exclude: Predicate { op: Some(Op::Read), ..Default::default() },
            limit: 10,
        };

        let filter = translate_filter(&spec);
        assert!(filter.contains("@operation:\"create\""));
        assert!(filter.contains("@status:\"ok\""));
        assert!(filter.contains("-@operation:\"read\""));
        assert!(filter.contains("@extra:\"1\""));
        assert!(filter.contains(" AND "));
    }

    #[test]
    fn data_from_id_excludes_reads() {
        let rid = Rid::new_v4();
        let spec = SearchSpec::data_from_id(rid);
        assert_eq!(spec.exclude.op, Some(Op::Read));
        assert_eq!(spec.limit, 1);
        let filter = translate_filter(&spec);
        assert!(filter.contains(&format!("@__id:\"{rid}\"")));
        assert!(filter.contains("-@operation:\"read\""));
    }
}

//! C7: the record façade (spec §4.7).
//!
//! Ties the chunker, emit protocol, cipher and search protocol together into
//! the public create/read/update/delete operations. This is the only part
//! of the crate most callers (the HTTP layer) should need to touch.

use crate::backboard::LogSearchBackend;
use crate::chunk::{self, FragPiece};
use crate::cipher::{self, KeyInput};
use crate::config::Config;
use crate::emit::{self, EmitSink};
use crate::error::{Result, StorageError};
use crate::model::{FragmentRecord, Op, Record, Rid};
use crate::search::{self, SearchSpec};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Per-call overrides accepted by `create`/`update` (spec §4.7).
#[derive(Debug, Clone, Default)]
pub struct WriteOpts {
    /// Overrides `Config::encryption_key`; also forces encryption on for
    /// this write even if `encryption_enabled` is false.
    pub key: Option<String>,
}

/// Per-call overrides accepted by `read`.
#[derive(Debug, Clone, Default)]
pub struct ReadOpts {
    pub key: Option<String>,
    /// When set, an incomplete fragment group (spec §7) is a hard
    /// `StorageError::IncompleteFragmentSet` instead of the default
    /// tolerant `_incomplete:true` sentinel — the caller's choice the spec
    /// leaves open ("either surface... or fail per caller choice").
    pub strict: bool,
}

/// The storage engine's public face: a record-shaped create/read/update/
/// delete API backed by the emit sink and the search backend.
pub struct LogCar {
    sink: Arc<dyn EmitSink>,
    backend: Arc<dyn LogSearchBackend>,
    config: Config,
}

impl LogCar {
    pub fn new(sink: Arc<dyn EmitSink>, backend: Arc<dyn LogSearchBackend>, config: Config) -> Self {
        Self { sink, backend, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn key_input(&self, opts_key: Option<&str>) -> Option<KeyInput> {
        opts_key
            .or(self.config.encryption_key.as_deref())
            .map(KeyInput::parse)
    }

    fn should_encrypt(&self, opts_key: Option<&str>) -> bool {
        self.config.encryption_enabled || opts_key.is_some()
    }

    /// **Create(value, opts) → {rid, value}** (spec §4.7). Mints a fresh rid
    /// and emits a `create` write group.
    pub fn create(&self, value: Value, opts: WriteOpts) -> Result<Record> {
        self.write(Uuid::new_v4(), Op::Create, value, opts)
    }

    /// **Update(rid, value, opts) → {rid, value}**. Same write path as
    /// `create`, with a caller-supplied rid and `op=update` — the only
    /// supported convention for this operation (spec §9 open question).
    pub fn update(&self, rid: Rid, value: Value, opts: WriteOpts) -> Result<Record> {
        self.write(rid, Op::Update, value, opts)
    }

    fn write(&self, rid: Rid, op: Op, value: Value, opts: WriteOpts) -> Result<Record> {
        let encrypt = self.should_encrypt(opts.key.as_deref());

        let encrypted_blob = if encrypt {
            let key = self
                .key_input(opts.key.as_deref())
                .ok_or_else(|| StorageError::DecryptionError("encryption enabled but no key configured".to_string()))?;
            Some(Value::String(cipher::encrypt(&value, &key)?))
        } else {
            None
        };
        let payload = encrypted_blob.as_ref().unwrap_or(&value);

        let pieces: Vec<FragPiece> = chunk::chunk(payload, self.config.max_chunk_length);
        if pieces.len() > self.config.max_fragments_per_write {
            return Err(StorageError::TooManyFragments {
                count: pieces.len(),
                max: self.config.max_fragments_per_write,
            }
            .into());
        }

        let total = pieces.len() as u64;
        let fragments: Vec<FragmentRecord> = pieces
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
                encrypted: encrypt,
                data: p.data,
                seq: emit::next_sequence(),
            })
            .collect();

        emit::emit_group(self.sink.as_ref(), "info", &fragments)?;
        Ok(Record::complete(rid, value))
    }

    /// **Delete(rid)**. Emits a single tombstone fragment carrying no data
    /// (spec §3, §4.7). Because the log is append-only, prior states remain
    /// observable but are hidden by the search protocol's "newest write
    /// group wins" rule once the tombstone out-dates them.
    pub fn delete(&self, rid: Rid) -> Result<()> {
        let fragment = FragmentRecord {
            rid,
            operation: Op::Delete,
            chunk_id: "root0".to_string(),
            key_path: vec![],
            split_index: None,
            split_kind: None,
            index: 0,
            total: 1,
            encrypted: false,
            data: Value::Null,
            seq: emit::next_sequence(),
        };
        emit::emit_group(self.sink.as_ref(), "info", std::slice::from_ref(&fragment))
    }

    /// **Read(rid, opts) → Option<Record>**. Requires a configured
    /// deployment/environment scope (spec §4.7). Returns `Ok(None)` once the
    /// rid's latest write group is a tombstone or no write group exists at
    /// all (spec §3's "subsequent reads return not found"). Emits a single
    /// `op=read` audit fragment that the search protocol always excludes
    /// from state reconstruction, so repeated reads never shadow real state
    /// (spec §8 invariant 6).
    pub async fn read(&self, rid: Rid, opts: ReadOpts) -> Result<Option<Record>> {
        if !self.config.has_deployment_scope() {
            return StorageError::missing_deployment_id();
        }

        let key = self.key_input(opts.key.as_deref());
        let spec = SearchSpec::data_from_id(rid);
        let mut hits = search::search(self.backend.as_ref(), &self.config, &spec, key.as_ref()).await?;

        let record = match hits.pop() {
            Some(hit) if hit.op == Op::Delete => None,
            Some(hit) if hit.incomplete && opts.strict => {
                return Err(StorageError::IncompleteFragmentSet {
                    rid: hit.rid.to_string(),
                    op: hit.op.to_string(),
                    present: hit.present,
                    total: hit.total as usize,
                }
                .into());
            }
            Some(hit) => Some(Record { rid: hit.rid, value: hit.value, incomplete: hit.incomplete }),
            None => None,
        };

        if let Some(record) = &record {
            let audit = FragmentRecord {
                rid,
                operation: Op::Read,
                chunk_id: "root0".to_string(),
                key_path: vec![],
                split_index: None,
                split_kind: None,
                index: 0,
                total: 1,
                encrypted: false,
                data: record.value.clone(),
                seq: emit::next_sequence(),
            };
            emit::emit_group(self.sink.as_ref(), "info", std::slice::from_ref(&audit))?;
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backboard::mock::MockBackboard;
    use crate::backboard::{LogAttribute, LogEntry};
    use crate::emit::MemorySink;
    use chrono::Utc;
    use serde_json::json;

    /// Drains every fragment collected by `sink` into `backend` as log
    /// entries, the way the real pipeline would once the log platform
    /// ingested and indexed an emitted line.
    fn drain_to_backboard(sink: &MemorySink, backend: &MockBackboard) {
        for fragment in sink.fragments.lock().unwrap().drain(..) {
            let mut attrs = vec![
                LogAttribute { key: "__id".to_string(), value: serde_json::to_string(&fragment.rid).unwrap() },
                LogAttribute { key: "operation".to_string(), value: serde_json::to_string(&fragment.operation).unwrap() },
                LogAttribute { key: "chunkId".to_string(), value: serde_json::to_string(&fragment.chunk_id).unwrap() },
                LogAttribute { key: "keyPath".to_string(), value: serde_json::to_string(&fragment.key_path).unwrap() },
                LogAttribute { key: "splitIndex".to_string(), value: serde_json::to_string(&fragment.split_index).unwrap() },
                LogAttribute { key: "splitKind".to_string(), value: serde_json::to_string(&fragment.split_kind).unwrap() },
                LogAttribute { key: "index".to_string(), value: serde_json::to_string(&fragment.index).unwrap() },
                LogAttribute { key: "total".to_string(), value: serde_json::to_string(&fragment.total).unwrap() },
                LogAttribute { key: "encrypted".to_string(), value: serde_json::to_string(&fragment.encrypted).unwrap() },
                LogAttribute { key: "data".to_string(), value: serde_json::to_string(&fragment.data).unwrap() },
                LogAttribute { key: "seq".to_string(), value: serde_json::to_string(&fragment.seq).unwrap() },
            ];
            attrs.retain(|a| !a.value.is_empty());
            backend.push(LogEntry { attributes: attrs, timestamp: Utc::now(), severity: None, message: None });
        }
    }

    fn harness() -> (Arc<MemorySink>, Arc<MockBackboard>, LogCar) {
        let sink = Arc::new(MemorySink::default());
        let backend = Arc::new(MockBackboard::default());
        let mut config = Config::default();
        config.deployment_id = Some("dep_test".to_string());
        let car = LogCar::new(sink.clone(), backend.clone(), config);
        (sink, backend, car)
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let (sink, backend, car) = harness();
        let created = car.create(json!({"hello": "world"}), WriteOpts::default()).unwrap();
        drain_to_backboard(&sink, &backend);

        let read = car.read(created.rid, ReadOpts::default()).await.unwrap().unwrap();
        assert_eq!(read.rid, created.rid);
        assert_eq!(read.value, json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn delete_then_read_returns_none() {
        let (sink, backend, car) = harness();
        let created = car.create(json!("to be deleted"), WriteOpts::default()).unwrap();
        drain_to_backboard(&sink, &backend);
        car.delete(created.rid).unwrap();
        drain_to_backboard(&sink, &backend);

        let read = car.read(created.rid, ReadOpts::default()).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn update_then_read_returns_latest_value() {
        let (sink, backend, car) = harness();
        let created = car.create(json!({"v": 1}), WriteOpts::default()).unwrap();
        drain_to_backboard(&sink, &backend);
        // A later timestamp needs to sort after create's; MockBackboard
        // timestamps each push with `Utc::now()`, which already advances.
        car.update(created.rid, json!({"v": 2}), WriteOpts::default()).unwrap();
        drain_to_backboard(&sink, &backend);

        let read = car.read(created.rid, ReadOpts::default()).await.unwrap().unwrap();
        assert_eq!(read.value, json!({"v": 2}));
    }

    #[tokio::test]
    async fn read_without_deployment_scope_errors() {
        let sink = Arc::new(MemorySink::default());
        let backend = Arc::new(MockBackboard::default());
        let car = LogCar::new(sink, backend, Config::default());
        let err = car.read(Uuid::new_v4(), ReadOpts::default()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn encrypted_write_round_trips_with_matching_key() {
        let (sink, backend, car) = harness();
        let key = "00".repeat(32);
        let created = car
            .create(json!([1, 2, 3]), WriteOpts { key: Some(key.clone()) })
            .unwrap();
        drain_to_backboard(&sink, &backend);

        let read = car
            .read(created.rid, ReadOpts { key: Some(key), ..Default::default() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.value, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn encrypted_write_fails_to_decrypt_with_wrong_key() {
        let (sink, backend, car) = harness();
        let created = car
            .create(json!("secret"), WriteOpts { key: Some("11".repeat(32)) })
            .unwrap();
        drain_to_backboard(&sink, &backend);

        let read = car.read(created.rid, ReadOpts { key: Some("22".repeat(32)), ..Default::default() }).await;
        assert!(
            matches!(read, Err(e) if matches!(e.kind(), crate::error::ErrorKind::StorageError(StorageError::DecryptionError(_)))),
            "a wrong key is fatal to this read (spec §7), not silently surfaced as not-found"
        );
    }

    #[tokio::test]
    async fn oversized_write_is_rejected_by_the_fragment_cap() {
        let (_sink, backend, _car) = harness();
        let sink = Arc::new(MemorySink::default());
        let mut config = Config::default();
        config.deployment_id = Some("dep_test".to_string());
        config.max_chunk_length = 1;
        config.max_fragments_per_write = 2;
        let car = LogCar::new(sink, backend, config);

        let err = car.create(json!("abcdefghij"), WriteOpts::default());
        assert!(matches!(
            err,
            Err(e) if matches!(e.kind(), crate::error::ErrorKind::StorageError(StorageError::TooManyFragments { .. }))
        ));
    }

    #[tokio::test]
    async fn strict_read_fails_hard_on_an_incomplete_fragment_set() {
        let (sink, backend, _car) = harness();
        let mut config = Config::default();
        config.deployment_id = Some("dep_test".to_string());
        config.max_chunk_length = 4;
        let car = LogCar::new(sink.clone(), backend.clone(), config);

        let created = car.create(json!("abcdefghijklmnop"), WriteOpts::default()).unwrap();
        sink.fragments.lock().unwrap().remove(1);
        drain_to_backboard(&sink, &backend);

        let lenient = car.read(created.rid, ReadOpts::default()).await.unwrap().unwrap();
        assert!(lenient.incomplete);

        let strict = car.read(created.rid, ReadOpts { strict: true, ..Default::default() }).await;
        assert!(matches!(
            strict,
            Err(e) if matches!(e.kind(), crate::error::ErrorKind::StorageError(StorageError::IncompleteFragmentSet { .. }))
        ));
    }
}

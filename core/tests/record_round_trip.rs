//! Exercises the public façade end-to-end against an in-memory emit sink
//! and backboard double, standing in for a real deployment-log pipeline
//! (spec §8's S3/S5/S6 scenarios).

use chrono::Utc;
use logcar_core::backboard::mock::MockBackboard;
use logcar_core::backboard::{LogAttribute, LogEntry};
use logcar_core::emit::MemorySink;
use logcar_core::record::{ReadOpts, WriteOpts};
use logcar_core::{Config, LogCar};
use serde_json::json;
use std::sync::Arc;

fn harness() -> (Arc<MemorySink>, Arc<MockBackboard>, LogCar) {
    let sink = Arc::new(MemorySink::default());
    let backend = Arc::new(MockBackboard::default());
    let mut config = Config::default();
    config.deployment_id = Some("dep_integration".to_string());
    let car = LogCar::new(sink.clone(), backend.clone(), config);
    (sink, backend, car)
}

/// Simulates the log platform ingesting and indexing every line a sink has
/// collected so far.
fn publish(sink: &MemorySink, backend: &MockBackboard) {
    for fragment in sink.fragments.lock().unwrap().drain(..) {
        let attrs = vec![
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
        backend.push(LogEntry { attributes: attrs, timestamp: Utc::now(), severity: None, message: None });
    }
}

#[tokio::test]
async fn create_then_read_recovers_a_large_value_across_many_fragments() {
    let (sink, backend, car) = harness();
    let mut config = car.config().clone();
    config.max_chunk_length = 32;
    let car = LogCar::new(sink.clone(), backend.clone(), config);

    let value = json!({
        "users": (0..20).map(|i| json!({"name": format!("user-{i}"), "bio": "x".repeat(80)})).collect::<Vec<_>>(),
        "note": "y".repeat(500),
    });

    let created = car.create(value.clone(), WriteOpts::default()).unwrap();
    publish(&sink, &backend);

    let read = car.read(created.rid, ReadOpts::default()).await.unwrap().unwrap();
    assert_eq!(read.value, value);
}

#[tokio::test]
async fn update_wins_over_create_and_intervening_reads_dont_shadow_it() {
    let (sink, backend, car) = harness();

    let created = car.create(json!({"status": "draft"}), WriteOpts::default()).unwrap();
    publish(&sink, &backend);

    // An intervening read emits an audit fragment; it must not affect what
    // a later read returns (spec §8 invariant 6).
    let _ = car.read(created.rid, ReadOpts::default()).await.unwrap();
    publish(&sink, &backend);

    car.update(created.rid, json!({"status": "published"}), WriteOpts::default()).unwrap();
    publish(&sink, &backend);

    let read = car.read(created.rid, ReadOpts::default()).await.unwrap().unwrap();
    assert_eq!(read.value, json!({"status": "published"}));
}

#[tokio::test]
async fn delete_masks_all_prior_writes() {
    let (sink, backend, car) = harness();

    let created = car.create(json!("v1"), WriteOpts::default()).unwrap();
    publish(&sink, &backend);
    car.update(created.rid, json!("v2"), WriteOpts::default()).unwrap();
    publish(&sink, &backend);
    car.delete(created.rid).unwrap();
    publish(&sink, &backend);

    let read = car.read(created.rid, ReadOpts::default()).await.unwrap();
    assert!(read.is_none());
}

#[tokio::test]
async fn unrelated_records_do_not_interfere() {
    let (sink, backend, car) = harness();

    let a = car.create(json!({"who": "a"}), WriteOpts::default()).unwrap();
    publish(&sink, &backend);
    let b = car.create(json!({"who": "b"}), WriteOpts::default()).unwrap();
    publish(&sink, &backend);

    let read_a = car.read(a.rid, ReadOpts::default()).await.unwrap().unwrap();
    let read_b = car.read(b.rid, ReadOpts::default()).await.unwrap().unwrap();
    assert_eq!(read_a.value, json!({"who": "a"}));
    assert_eq!(read_b.value, json!({"who": "b"}));
}

#[tokio::test]
async fn permanently_missing_fragment_surfaces_as_incomplete_sentinel() {
    let (sink, backend, car) = harness();
    let mut config = car.config().clone();
    config.max_chunk_length = 4;
    let car = LogCar::new(sink.clone(), backend.clone(), config);

    let created = car.create(json!("abcdefghijklmnop"), WriteOpts::default()).unwrap();
    // Drop one fragment before it's ever published, simulating a write group
    // the log index never finished ingesting — the repair pass can't recover
    // a fragment that was never emitted in the first place.
    sink.fragments.lock().unwrap().remove(1);
    publish(&sink, &backend);

    let read = car.read(created.rid, ReadOpts::default()).await.unwrap().unwrap();
    assert!(read.incomplete, "a short fragment group must surface as a sentinel, not silently look complete");
}

//! C5: the emit protocol (spec §4.5).
//!
//! Serializes a record write into one or more tagged log lines. The default
//! sink writes newline-terminated JSON to stdout, guarded by a mutex — the
//! emit sink is the only resource the core shares across tasks (spec §5).

use crate::error::Result;
use crate::model::FragmentRecord;
use chrono::Utc;
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Assigns the per-process monotonic tie-breaker (spec §9) used to order
/// write groups when the platform's log timestamp resolution is coarse.
pub fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Where emitted log lines go. Implementations must guarantee that, within
/// one write group, fragments arrive in strictly increasing `idx` (spec §5);
/// `Record` callers already hand fragments to `emit` in that order.
pub trait EmitSink: Send + Sync {
    fn emit_line(&self, line: serde_json::Value) -> Result<()>;
}

/// Writes one JSON object per line to the given writer (stdout in
/// production), the way a deployment platform's log collector expects.
pub struct LineSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }
}

impl LineSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> EmitSink for LineSink<W> {
    fn emit_line(&self, line: serde_json::Value) -> Result<()> {
        let mut w = self.writer.lock().expect("emit sink mutex poisoned");
        serde_json::to_writer(&mut *w, &line)?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }
}

/// In-memory sink used by tests and the REPL's offline mode: collects every
/// fragment emitted instead of writing log lines anywhere.
#[derive(Default)]
pub struct MemorySink {
    pub fragments: Mutex<Vec<FragmentRecord>>,
}

impl EmitSink for MemorySink {
    fn emit_line(&self, line: serde_json::Value) -> Result<()> {
        let fragment: FragmentRecord = serde_json::from_value(line)?;
        self.fragments.lock().expect("memory sink mutex poisoned").push(fragment);
        Ok(())
    }
}

/// Emits one write group, in `idx` order, as the wire-format log lines
/// described in spec §6.
pub fn emit_group(sink: &dyn EmitSink, level: &str, fragments: &[FragmentRecord]) -> Result<()> {
    for fragment in fragments {
        let line = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "origin": "LogCar",
            "message": fragment.operation.as_str(),
            "__id": fragment.rid,
            "operation": fragment.operation,
            "chunkId": fragment.chunk_id,
            "keyPath": fragment.key_path,
            "splitIndex": fragment.split_index,
            "splitKind": fragment.split_kind,
            "index": fragment.index,
            "total": fragment.total,
            "encrypted": fragment.encrypted,
            "data": fragment.data,
            "seq": fragment.seq,
        });
        sink.emit_line(line)?;
    }
    Ok(())
}

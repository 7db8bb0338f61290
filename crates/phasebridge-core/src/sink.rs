//! Destinations for outbound records.
//!
//! The step loop hands every record it is allowed to publish to a
//! [`RecordSink`]. Publishing is fire-and-forget: a sink must not block the
//! step loop and reports its own failures through logging.

use std::sync::{Arc, Mutex};

use phasebridge_types::OutboundRecord;
use tracing::warn;

/// Receives records produced by tasks.
pub trait RecordSink: Send + Sync {
    /// Publish one record without waiting for delivery.
    fn publish(&self, record: OutboundRecord);
}

/// A sink that keeps records in memory, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<OutboundRecord>>>,
}

impl MemorySink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every record published so far.
    pub fn take(&self) -> Vec<OutboundRecord> {
        match self.records.lock() {
            Ok(mut records) => std::mem::take(&mut *records),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl RecordSink for MemorySink {
    fn publish(&self, record: OutboundRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(_) => warn!(record_type = %record.record_type, "memory sink poisoned, dropping record"),
        }
    }
}

//! Bounded, drop-oldest audit and metering sinks. Fire-and-forget
//! from the processor's perspective: a full sink drops its oldest
//! entry rather than applying backpressure to the hot path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use agent_bus_governance::DecisionLog;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkStats {
    pub recorded_total: u64,
    pub dropped_total: u64,
    pub current_len: usize,
}

/// Bounded in-memory ring of [`DecisionLog`] records.
pub struct AuditSink {
    records: Mutex<VecDeque<DecisionLog>>,
    capacity: usize,
    recorded_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl AuditSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            recorded_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Record a decision. Never blocks and never errors: at capacity,
    /// the oldest record is dropped and `dropped_total` increments.
    pub fn record(&self, log: DecisionLog) {
        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
        records.push_back(log);
        self.recorded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            recorded_total: self.recorded_total.load(Ordering::Relaxed),
            dropped_total: self.dropped_total.load(Ordering::Relaxed),
            current_len: self.records.lock().len(),
        }
    }

    /// Drain every buffered record, for a graceful shutdown flush.
    pub fn drain(&self) -> Vec<DecisionLog> {
        self.records.lock().drain(..).collect()
    }
}

/// One metering event: a unit of work attributed to an agent/tenant
/// for later billing or rate-limiting analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringEvent {
    pub agent_id: String,
    pub tenant_id: Option<String>,
    pub message_type: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Bounded in-memory ring of [`MeteringEvent`]s, same drop-oldest
/// discipline as [`AuditSink`].
pub struct MeteringSink {
    events: Mutex<VecDeque<MeteringEvent>>,
    capacity: usize,
    recorded_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl MeteringSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            recorded_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
        }
    }

    pub fn record(&self, event: MeteringEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
        self.recorded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            recorded_total: self.recorded_total.load(Ordering::Relaxed),
            dropped_total: self.dropped_total.load(Ordering::Relaxed),
            current_len: self.events.lock().len(),
        }
    }

    pub fn drain(&self) -> Vec<MeteringEvent> {
        self.events.lock().drain(..).collect()
    }
}

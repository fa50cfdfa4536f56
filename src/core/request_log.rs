//! Bounded in-memory log of recent proxied requests.
//!
//! Backs the `/admin/api/logs` endpoint. Paths are stored without their
//! query string so that client-supplied keys are never retained.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize)]
pub struct RequestEvent {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub provider: Option<String>,
    pub status: u16,
    pub latency_ms: u64,
    pub attempts: usize,
}

pub struct RequestLog {
    capacity: usize,
    events: Mutex<VecDeque<RequestEvent>>,
}

impl RequestLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append an event, evicting the oldest once full.
    pub fn record(&self, mut event: RequestEvent) {
        if self.capacity == 0 {
            return;
        }
        if let Some((path, _)) = event.path.split_once('?') {
            event.path = path.to_string();
        }
        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<RequestEvent> {
        self.events.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

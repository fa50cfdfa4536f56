//! API Key Pool Management
//!
//! Each provider owns one pool shared by every in-flight request. Keys rotate
//! round-robin in insertion order; a key reported as failed is skipped until
//! the pool is reset.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;

use crate::core::logging::mask_key;

/// Snapshot of a pool's state for the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyPoolStats {
    pub total: usize,
    pub failed: usize,
    pub current_index: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    current_index: usize,
    /// Indices into `keys`
    failed: HashSet<usize>,
}

impl PoolState {
    fn is_exhausted(&self, total: usize) -> bool {
        self.failed.len() >= total
    }

    /// Move the cursor to the next non-failed key, wrapping, for at most
    /// `total` probes. The cursor stays put when every key has failed.
    fn advance(&mut self, total: usize) {
        if total == 0 {
            return;
        }
        let mut idx = self.current_index;
        for _ in 0..total {
            idx = (idx + 1) % total;
            if !self.failed.contains(&idx) {
                self.current_index = idx;
                return;
            }
        }
    }
}

/// Ordered key list with rotation and failure tracking.
#[derive(Debug)]
pub struct KeyPool {
    /// Provider name this pool belongs to
    provider: String,

    /// De-duplicated keys in insertion order
    keys: Vec<String>,

    state: Mutex<PoolState>,
}

impl KeyPool {
    pub fn new(provider: impl Into<String>, keys: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        Self {
            provider: provider.into(),
            keys: unique,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key under the cursor, or `None` once every key has failed.
    pub fn current_key(&self) -> Option<String> {
        let state = self.state.lock();
        if state.is_exhausted(self.keys.len()) {
            return None;
        }
        Some(self.keys[state.current_index].clone())
    }

    /// Take the key under the cursor and step the cursor to the next
    /// non-failed key.
    pub fn acquire(&self) -> Option<String> {
        let mut state = self.state.lock();
        if state.is_exhausted(self.keys.len()) {
            return None;
        }
        let key = self.keys[state.current_index].clone();
        state.advance(self.keys.len());
        Some(key)
    }

    /// Exclude `key` from rotation until the next reset.
    ///
    /// Keys not in the pool are ignored. The cursor only moves when it
    /// points at a failed key, so a late report from a concurrent request
    /// never skips over a healthy key.
    pub fn mark_failed(&self, key: &str) {
        let Some(idx) = self.keys.iter().position(|k| k == key) else {
            return;
        };
        let mut state = self.state.lock();
        if state.failed.insert(idx) {
            tracing::warn!(
                provider = %self.provider,
                key = %mask_key(key),
                failed = state.failed.len(),
                total = self.keys.len(),
                "API key marked as failed"
            );
        }
        if state.failed.contains(&state.current_index) {
            state.advance(self.keys.len());
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.lock().is_exhausted(self.keys.len())
    }

    /// Clear all failures and rewind the cursor.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.failed.clear();
        state.current_index = 0;
        tracing::info!(provider = %self.provider, "Key pool reset");
    }

    /// Reset the pool if, and only if, it is currently exhausted.
    pub fn reset_if_exhausted(&self) -> bool {
        let mut state = self.state.lock();
        if self.keys.is_empty() || !state.is_exhausted(self.keys.len()) {
            return false;
        }
        state.failed.clear();
        state.current_index = 0;
        tracing::info!(provider = %self.provider, "Re-arming exhausted key pool");
        true
    }

    pub fn stats(&self) -> KeyPoolStats {
        let state = self.state.lock();
        KeyPoolStats {
            total: self.keys.len(),
            failed: state.failed.len(),
            current_index: state.current_index,
        }
    }
}

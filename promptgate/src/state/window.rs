// promptgate/src/state/window.rs
//
// In-process sliding-window state store.
// DashMap = sharded concurrent HashMap — safe across tokio tasks with no
// global mutex; per-identifier RwLock serializes check-then-record sequences
// for the same key while unrelated identifiers proceed in parallel.
//
// Holds the two mutable stores of the firewall:
//   - Rate windows: per (axis, identifier) millisecond timestamp runs,
//     pruned past the daily window on every access
//   - Conversation rings: per identifier, bounded recent turns with TTL,
//     swept lazily on a 5-minute cadence
//
// This is the in-memory equivalent of a Redis-backed deployment; the store
// never persists and never retains text beyond its ring or TTL.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::firewall::types::LimitAxis;

// ── Window durations (milliseconds) ───────────────────────────────────────────

pub const W_MINUTE_MS: i64 = 60 * 1_000;
pub const W_HOUR_MS:   i64 = 60 * 60 * 1_000;
pub const W_DAY_MS:    i64 = 24 * 60 * 60 * 1_000;

const SWEEP_INTERVAL_MS: i64 = 5 * 60 * 1_000;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ── Rate windows ──────────────────────────────────────────────────────────────

/// Chronological request stamps for one (axis, identifier) pair.
#[derive(Debug, Default)]
pub struct RateWindow {
    stamps: Vec<i64>,
}

impl RateWindow {
    /// Drop stamps older than the largest window. Called under the key guard.
    pub fn prune(&mut self, now: i64) {
        let cutoff = now - W_DAY_MS;
        self.stamps.retain(|&t| t > cutoff);
    }

    pub fn count_within(&self, now: i64, window_ms: i64) -> usize {
        let cutoff = now - window_ms;
        self.stamps.iter().filter(|&&t| t > cutoff).count()
    }

    pub fn total(&self) -> usize {
        self.stamps.len()
    }

    pub fn record(&mut self, now: i64) {
        self.stamps.push(now);
    }
}

/// Short burst ring with its own millisecond-scale window.
#[derive(Debug, Default)]
pub struct BurstWindow {
    stamps: Vec<i64>,
}

impl BurstWindow {
    pub fn prune(&mut self, now: i64, window_ms: i64) {
        let cutoff = now - window_ms;
        self.stamps.retain(|&t| t > cutoff);
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn record(&mut self, now: i64) {
        self.stamps.push(now);
    }
}

// ── Conversation rings ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub text:         String,
    pub timestamp_ms: i64,
}

/// Bounded ring of recent turns for one identifier.
#[derive(Debug)]
pub struct ConversationRing {
    turns:    VecDeque<TurnRecord>,
    capacity: usize,
}

impl ConversationRing {
    pub fn new(capacity: usize) -> Self {
        Self { turns: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, text: String, now: i64) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(TurnRecord { text, timestamp_ms: now });
    }

    pub fn texts(&self) -> Vec<String> {
        self.turns.iter().map(|t| t.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.turns.front().map(|t| t.timestamp_ms)
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct StateStore {
    rate_windows:  DashMap<(LimitAxis, String), Arc<RwLock<RateWindow>>>,
    burst_windows: DashMap<String, Arc<RwLock<BurstWindow>>>,
    conversations: DashMap<String, Arc<RwLock<ConversationRing>>>,
    last_sweep:    Mutex<i64>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            rate_windows:  DashMap::new(),
            burst_windows: DashMap::new(),
            conversations: DashMap::new(),
            last_sweep:    Mutex::new(now_ms()),
        }
    }

    /// Per-key window handle. Lock order for multi-axis checks is burst, then
    /// user, ip, session — every caller must follow it.
    pub fn rate_window(&self, axis: LimitAxis, identifier: &str) -> Arc<RwLock<RateWindow>> {
        self.rate_windows
            .entry((axis, identifier.to_string()))
            .or_insert_with(|| Arc::new(RwLock::new(RateWindow::default())))
            .clone()
    }

    pub fn burst_window(&self, identifier: &str) -> Arc<RwLock<BurstWindow>> {
        self.burst_windows
            .entry(identifier.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(BurstWindow::default())))
            .clone()
    }

    pub fn conversation(&self, identifier: &str, capacity: usize) -> Arc<RwLock<ConversationRing>> {
        self.conversations
            .entry(identifier.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(ConversationRing::new(capacity))))
            .clone()
    }

    /// Drop all state for an identifier (admin/test hook).
    pub fn reset_identifier(&self, identifier: &str) {
        for axis in [LimitAxis::PerUser, LimitAxis::PerIp, LimitAxis::PerSession] {
            self.rate_windows.remove(&(axis, identifier.to_string()));
        }
        self.burst_windows.remove(identifier);
        self.conversations.remove(identifier);
    }

    pub fn clear_conversation(&self, identifier: &str) {
        self.conversations.remove(identifier);
    }

    pub fn n_conversations(&self) -> usize {
        self.conversations.len()
    }

    /// Opportunistic conversation TTL sweep. Runs at most once per five
    /// minutes; the sweep guard never blocks per-request lookups.
    pub fn maybe_sweep_conversations(&self, ttl_seconds: i64) {
        let now = now_ms();
        {
            let mut last = self.last_sweep.lock();
            if now - *last < SWEEP_INTERVAL_MS {
                return;
            }
            *last = now;
        }
        self.sweep_conversations_at(now, ttl_seconds);
    }

    pub(crate) fn sweep_conversations_at(&self, now: i64, ttl_seconds: i64) {
        let cutoff = now - ttl_seconds * 1_000;
        let stale: Vec<String> = self
            .conversations
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .read()
                    .oldest_timestamp()
                    .map(|t| t < cutoff)
                    .unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect();
        if !stale.is_empty() {
            debug!("conversation sweep: evicting {} identifiers", stale.len());
        }
        for id in stale {
            self.conversations.remove(&id);
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_window_prunes_past_day() {
        let mut w = RateWindow::default();
        let now = 10 * W_DAY_MS;
        w.record(now - W_DAY_MS - 1_000);
        w.record(now - W_HOUR_MS);
        w.record(now - 10);
        w.prune(now);
        assert_eq!(w.total(), 2);
        assert_eq!(w.count_within(now, W_MINUTE_MS), 1);
        assert_eq!(w.count_within(now, W_HOUR_MS), 1);
    }

    #[test]
    fn conversation_ring_is_bounded() {
        let mut ring = ConversationRing::new(3);
        for i in 0..5 {
            ring.push(format!("turn {i}"), i);
        }
        assert_eq!(ring.len(), 3);
        let texts = ring.texts();
        assert_eq!(texts, vec!["turn 2", "turn 3", "turn 4"]);
        assert_eq!(ring.oldest_timestamp(), Some(2));
    }

    #[test]
    fn sweep_evicts_expired_conversations() {
        let store = StateStore::new();
        let now = now_ms();
        store.conversation("old", 5).write().push("hello".into(), now - 2 * 3_600 * 1_000);
        store.conversation("fresh", 5).write().push("hello".into(), now);
        store.sweep_conversations_at(now, 3_600);
        assert_eq!(store.n_conversations(), 1);
        assert!(store.conversations.get("fresh").is_some());
    }

    #[test]
    fn reset_identifier_clears_all_axes() {
        let store = StateStore::new();
        store.rate_window(LimitAxis::PerUser, "u1").write().record(1);
        store.burst_window("u1").write().record(1);
        store.conversation("u1", 5).write().push("hi".into(), 1);
        store.reset_identifier("u1");
        assert_eq!(store.rate_window(LimitAxis::PerUser, "u1").read().total(), 0);
        assert!(store.burst_window("u1").read().is_empty());
        assert!(store.conversation("u1", 5).read().is_empty());
    }
}

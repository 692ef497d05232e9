use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use gateway_core_types::{GatewayError, SharedClock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

#[derive(Debug, Error, Clone)]
pub enum CountingError {
    #[error("counting backend unavailable: {0}")]
    Unavailable(String),
}

impl From<CountingError> for GatewayError {
    fn from(value: CountingError) -> Self {
        GatewayError::new(value.to_string())
    }
}

/// Shared counter store used by the rate limiter and the quota tracker.
///
/// Both operations only consider hits inside the trailing `window`.
/// `increment` records a hit and returns the count including it.
#[async_trait]
pub trait CountingBackend: Send + Sync {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, CountingError>;
    async fn count(&self, key: &str, window: Duration) -> Result<u64, CountingError>;
}

/// Hits for one key plus the window they were last recorded under.
#[derive(Debug)]
struct HitLog {
    window: Duration,
    hits: VecDeque<DateTime<Utc>>,
}

impl HitLog {
    fn evict(&mut self, cutoff: DateTime<Utc>) {
        while self.hits.front().is_some_and(|at| *at <= cutoff) {
            self.hits.pop_front();
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.hits.back().map_or(true, |last| *last <= now - self.window)
    }
}

/// Sliding-log counter kept in process memory.
///
/// Each key holds the timestamps of its hits; the entry lock makes
/// evict-then-push atomic per key. Keys whose hits have all left their
/// window are dropped by [`prune_expired`](Self::prune_expired).
pub struct InMemoryCountingBackend {
    logs: DashMap<String, HitLog>,
    clock: SharedClock,
}

impl InMemoryCountingBackend {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            logs: DashMap::new(),
            clock,
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.logs.len()
    }

    /// Removes every key that would count zero; returns how many went.
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.logs.len();
        self.logs.retain(|_, log| !log.is_expired(now));
        before.saturating_sub(self.logs.len())
    }

    /// Runs [`prune_expired`](Self::prune_expired) every `every` until the
    /// returned handle is aborted or the runtime shuts down.
    pub fn spawn_pruner(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let backend = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let Some(backend) = backend.upgrade() else {
                    break;
                };
                let removed = backend.prune_expired();
                if removed > 0 {
                    debug!(removed, remaining = backend.tracked_keys(), "pruned idle counters");
                }
            }
        })
    }
}

#[async_trait]
impl CountingBackend for InMemoryCountingBackend {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, CountingError> {
        let now = self.clock.now();
        let mut log = self.logs.entry(key.to_string()).or_insert_with(|| HitLog {
            window,
            hits: VecDeque::new(),
        });
        log.window = window;
        log.evict(now - window);
        log.hits.push_back(now);
        Ok(log.hits.len() as u64)
    }

    async fn count(&self, key: &str, window: Duration) -> Result<u64, CountingError> {
        let cutoff = self.clock.now() - window;
        let count = self
            .logs
            .get(key)
            .map(|log| log.hits.iter().filter(|at| **at > cutoff).count())
            .unwrap_or(0);
        Ok(count as u64)
    }
}

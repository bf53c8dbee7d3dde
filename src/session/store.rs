// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory session cache.
//!
//! Sits in front of the durable session records. Entries are dropped when
//! the session expires or when nothing has touched them for the idle
//! threshold, whichever comes first; the durable copy remains and is
//! reloaded on the next miss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Session;

/// Default idle threshold (30 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default sweep interval (30 minutes).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);

struct CacheEntry {
    session: Session,
    /// Milliseconds since the store's epoch; bumped under the read lock
    last_access: AtomicU64,
}

/// Session cache keyed by session id.
pub struct SessionStore {
    entries: RwLock<HashMap<Uuid, CacheEntry>>,
    idle_timeout: Duration,
    epoch: Instant,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            idle_timeout,
            epoch: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Get a session. Expired entries are misses even while still cached.
    pub fn get(&self, id: Uuid) -> Option<Session> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(&id)?;
        if entry.session.is_expired(Utc::now()) {
            return None;
        }
        entry.last_access.store(self.now_millis(), Ordering::Relaxed);
        Some(entry.session.clone())
    }

    /// Insert or replace a session.
    pub fn set(&self, session: Session) {
        let entry = CacheEntry {
            last_access: AtomicU64::new(self.now_millis()),
            session,
        };
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(entry.session.id, entry);
            }
            Err(_) => warn!("Session cache lock poisoned, entry not cached"),
        }
    }

    pub fn delete(&self, id: Uuid) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict expired and idle entries. Returns how many were removed.
    ///
    /// Victims are collected under the read lock; the write lock is only
    /// taken if there is something to remove.
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let idle_cutoff = self
            .now_millis()
            .saturating_sub(u64::try_from(self.idle_timeout.as_millis()).unwrap_or(u64::MAX));

        let victims: Vec<Uuid> = match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .filter(|(_, entry)| {
                    entry.session.is_expired(now)
                        || entry.last_access.load(Ordering::Relaxed) < idle_cutoff
                })
                .map(|(id, _)| *id)
                .collect(),
            Err(_) => return 0,
        };

        if victims.is_empty() {
            return 0;
        }

        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        victims
            .iter()
            .filter(|id| entries.remove(id).is_some())
            .count()
    }
}

/// Periodic cache sweep.
pub struct SessionSweeper {
    store: Arc<SessionStore>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<SessionStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run until the cancellation token is triggered.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Session sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Session sweeper shutting down");
                    return;
                }
            }

            let evicted = self.store.cleanup();
            if evicted > 0 {
                debug!(evicted, remaining = self.store.len(), "Session cache swept");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ClientInfo;

    fn session(ttl_secs: i64) -> Session {
        Session::anonymous(chrono::Duration::seconds(ttl_secs), &ClientInfo::default())
    }

    #[test]
    fn set_get_delete() {
        let store = SessionStore::new(DEFAULT_IDLE_TIMEOUT);
        let s = session(60);

        assert!(store.get(s.id).is_none());
        store.set(s.clone());
        assert_eq!(store.get(s.id), Some(s.clone()));

        store.delete(s.id);
        assert!(store.get(s.id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn expired_entry_is_a_miss_before_cleanup() {
        let store = SessionStore::new(DEFAULT_IDLE_TIMEOUT);
        let s = session(-1);
        store.set(s.clone());

        assert!(store.get(s.id).is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.cleanup(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn idle_entry_is_evicted_before_expiry() {
        let store = SessionStore::new(Duration::from_millis(300));
        let idle = session(3600);
        let busy = session(3600);
        store.set(idle.clone());
        store.set(busy.clone());

        std::thread::sleep(Duration::from_millis(200));
        assert!(store.get(busy.id).is_some());
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(store.cleanup(), 1);
        assert!(store.get(idle.id).is_none());
        assert!(store.get(busy.id).is_some());
    }

    #[test]
    fn cleanup_keeps_fresh_entries() {
        let store = SessionStore::new(DEFAULT_IDLE_TIMEOUT);
        for _ in 0..5 {
            store.set(session(3600));
        }
        assert_eq!(store.cleanup(), 0);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let store = Arc::new(SessionStore::new(DEFAULT_IDLE_TIMEOUT));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let s = session(3600);
                        store.set(s.clone());
                        assert_eq!(store.get(s.id).map(|g| g.id), Some(s.id));
                        store.cleanup();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }

    #[tokio::test]
    async fn sweeper_evicts_and_stops() {
        let store = Arc::new(SessionStore::new(DEFAULT_IDLE_TIMEOUT));
        store.set(session(-1));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            SessionSweeper::new(Arc::clone(&store), Duration::from_millis(10))
                .run(shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper stopped")
            .unwrap();
    }
}

//! Authenticator replay detection.
//!
//! The cache remembers every authenticator fingerprint it admitted for one
//! replay window. A second presentation of the same fingerprint inside the
//! window is a replay.
//!
//! # Atomicity
//!
//! Check-and-record is a single critical section under one mutex: sweep,
//! lookup and insert all happen while the lock is held. Two concurrent
//! presentations of the same fingerprint therefore yield exactly one
//! [`ReplayCheck::Fresh`].
//!
//! # Memory Bound
//!
//! ```text
//!   insertion order ──► [ oldest ... newest ]   (VecDeque)
//!                          │
//!         lazy sweep pops from the front while inserted_at < now - window
//! ```
//!
//! - Every call sweeps expired entries first (amortised O(1) per call).
//! - A hard cap (`max_entries`) bounds the map. When the cache is full after
//!   sweeping, new fingerprints are refused ([`ReplayCheck::Saturated`])
//!   instead of evicting entries that are still inside the window.
//! - [`ReplaySweeper`] optionally sweeps on a timer so idle processes also
//!   release memory.
//!
//! The window equals the clock-skew tolerance: an authenticator older than
//! the tolerance fails the skew check before it ever reaches the cache.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::metrics;

/// Default maximum number of fingerprints held at once.
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Identity of one authenticator presentation.
///
/// Two requests with equal fingerprints inside the window are the same
/// replay attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Client principal name components.
    pub client_principal: Vec<String>,
    pub client_realm: String,
    /// Service principal name components.
    pub service_principal: Vec<String>,
    /// Authenticator `ctime + cusec`, microsecond resolution.
    pub authenticator_time: DateTime<Utc>,
}

/// Outcome of [`ReplayCache::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCheck {
    /// Not seen inside the window; now recorded.
    Fresh,
    /// Already recorded inside the window; nothing changed.
    Replay,
    /// Not seen, but the cache is full and refused to record it.
    Saturated,
}

impl ReplayCheck {
    pub fn is_replay(&self) -> bool {
        matches!(self, ReplayCheck::Replay)
    }
}

/// A fingerprint with the time it was admitted. Never mutated.
#[derive(Debug)]
struct CacheEntry {
    fingerprint: Fingerprint,
    inserted_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CacheState {
    /// Fingerprint → insertion time of the live entry.
    entries: HashMap<Fingerprint, DateTime<Utc>>,
    /// Admission order, oldest first.
    order: VecDeque<CacheEntry>,
    /// Longest window any caller has checked against. Sweeps never evict
    /// entries younger than this, whichever window they run with.
    retention: Duration,
}

impl CacheState {
    /// Evict everything inserted before `cutoff`.
    fn sweep(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        while let Some(front) = self.order.front() {
            if front.inserted_at >= cutoff {
                break;
            }
            let Some(entry) = self.order.pop_front() else {
                break;
            };
            // A fingerprint readmitted after expiry has a newer queue entry;
            // only the matching one may remove it from the map.
            if self.entries.get(&entry.fingerprint) == Some(&entry.inserted_at) {
                self.entries.remove(&entry.fingerprint);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Time-windowed store of recently seen authenticator fingerprints.
///
/// Constructed once at service start and shared by handle (`Arc`) with every
/// gate instance.
#[derive(Debug)]
pub struct ReplayCache {
    window: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl ReplayCache {
    /// Create a cache with the given window and the default capacity.
    pub fn new(window: Duration) -> Self {
        Self::with_capacity(window, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with an explicit capacity bound.
    pub fn with_capacity(window: Duration, max_entries: usize) -> Self {
        Self {
            window,
            max_entries,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                retention: window,
            }),
        }
    }

    /// The window this cache was configured with.
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Check whether `fingerprint` was seen inside `window`, recording it if not.
    ///
    /// Uses the current UTC wall clock.
    pub fn check_and_record(&self, window: Duration, fingerprint: Fingerprint) -> ReplayCheck {
        self.check_and_record_at(Utc::now(), window, fingerprint)
    }

    /// [`check_and_record`](Self::check_and_record) against an explicit `now`.
    pub fn check_and_record_at(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        fingerprint: Fingerprint,
    ) -> ReplayCheck {
        let replay_cutoff = cutoff(now, window);
        let mut state = self.lock();

        state.retention = state.retention.max(window);
        let retention = state.retention;
        let evicted = state.sweep(cutoff(now, retention));
        if evicted > 0 {
            trace!(evicted, "Swept expired replay cache entries");
            metrics::set_replay_cache_entries(state.entries.len());
        }

        if let Some(inserted_at) = state.entries.get(&fingerprint)
            && *inserted_at >= replay_cutoff
        {
            return ReplayCheck::Replay;
        }

        if state.entries.len() >= self.max_entries {
            warn!(
                entries = state.entries.len(),
                max_entries = self.max_entries,
                "Replay cache full, refusing new fingerprint"
            );
            return ReplayCheck::Saturated;
        }

        state.entries.insert(fingerprint.clone(), now);
        state.order.push_back(CacheEntry {
            fingerprint,
            inserted_at: now,
        });
        metrics::set_replay_cache_entries(state.entries.len());

        ReplayCheck::Fresh
    }

    /// Evict entries older than the retention window. Returns the number evicted.
    ///
    /// The retention window is the configured window, widened to the longest
    /// window passed to [`check_and_record`](Self::check_and_record).
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// [`sweep`](Self::sweep) against an explicit `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let retention = state.retention;
        let evicted = state.sweep(cutoff(now, retention));
        metrics::set_replay_cache_entries(state.entries.len());
        evicted
    }

    /// Number of live fingerprints.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // The state is never left half-updated, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Oldest insertion time still inside the window.
fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// =============================================================================
// Background Sweeper
// =============================================================================

/// Periodic sweep task for a shared [`ReplayCache`].
///
/// The task is tracked by a `TaskTracker` and stopped through a
/// `CancellationToken`. Call [`shutdown`](Self::shutdown) before exit.
pub struct ReplaySweeper {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl ReplaySweeper {
    /// Spawn the sweep loop on the current tokio runtime.
    pub fn spawn(cache: Arc<ReplayCache>, every: Duration) -> Self {
        let task_tracker = TaskTracker::new();
        let cancellation_token = CancellationToken::new();
        let cancel = cancellation_token.clone();

        task_tracker.spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Replay sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = cache.sweep();
                        trace!(evicted, remaining = cache.len(), "Replay cache swept");
                    }
                }
            }

            debug!("Replay sweeper shutting down");
        });

        info!(interval_secs = every.as_secs(), "Replay cache sweeper started");

        Self {
            task_tracker,
            cancellation_token,
        }
    }

    /// Stop the sweep loop and wait for it to finish.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        info!("Replay cache sweeper stopped");
    }
}

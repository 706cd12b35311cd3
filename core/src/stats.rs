//! Shared statistics state.
//!
//! [`StatsRegistry`] owns the previous snapshot and the current rate table.
//! The watch loop is the only writer; any number of readers take copies.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::errors::CoreError;
use crate::rates::{compute_rates, SpeedStat};
use crate::status::{ClientSession, Snapshot, SnapshotSource};

/// What a call to [`StatsRegistry::refresh`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// The previous pass finished less than one debounce interval ago.
    Throttled,
    /// First observation: the snapshot was stored, no rates yet.
    Seeded,
    /// Rates were recomputed. `disconnected` holds the last-known session
    /// of every client that left since the previous pass.
    Updated { disconnected: Vec<ClientSession> },
}

#[derive(Debug, Default)]
struct WatcherState {
    previous: Option<Snapshot>,
    stats: Vec<SpeedStat>,
    last_pass: Option<Instant>,
}

#[derive(Debug)]
pub struct StatsRegistry {
    state: RwLock<WatcherState>,
    debounce: Duration,
}

impl StatsRegistry {
    /// `debounce` doubles as the minimum spacing between two passes.
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: RwLock::new(WatcherState::default()),
            debounce,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Copy of the current rate table.
    pub fn speed_stats(&self) -> Vec<SpeedStat> {
        self.read().stats.clone()
    }

    /// Copy of the most recent snapshot, `None` before the first pass.
    pub fn current_snapshot(&self) -> Option<Snapshot> {
        self.read().previous.clone()
    }

    pub fn connected_clients(&self) -> Vec<ClientSession> {
        self.read()
            .previous
            .as_ref()
            .map(|s| s.clients.clone())
            .unwrap_or_default()
    }

    /// Run one reprocessing pass against `source`.
    ///
    /// The write lock is held for the whole pass, fetch included, so
    /// readers see either the old or the new state. The throttle measures
    /// from the end of the previous pass. A fetch error leaves the state
    /// untouched but still counts as a pass for throttling.
    pub fn refresh(&self, source: &dyn SnapshotSource) -> Result<PassOutcome, CoreError> {
        let mut state = self.write();

        if let Some(last) = state.last_pass {
            let since = Instant::now().saturating_duration_since(last);
            if since < self.debounce {
                debug!("Skipping pass, previous one finished {:?} ago", since);
                return Ok(PassOutcome::Throttled);
            }
        }

        let fetched = source.fetch();
        state.last_pass = Some(Instant::now());
        let current = fetched?;

        let Some(previous) = state.previous.take() else {
            debug!(
                "Seeded statistics with {} clients",
                current.clients.len()
            );
            state.previous = Some(current);
            return Ok(PassOutcome::Seeded);
        };

        let update = compute_rates(&previous, &current, &state.stats);
        debug!(
            "Updated rates for {} clients, {} disconnected",
            update.stats.len(),
            update.disconnected.len()
        );
        state.stats = update.stats;
        state.previous = Some(current);

        Ok(PassOutcome::Updated {
            disconnected: update.disconnected,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, WatcherState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WatcherState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

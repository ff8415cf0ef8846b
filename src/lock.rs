// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-process lock coordination for accounts.
//!
//! The [`LockCoordinator`] maps an unordered pair of account ids to one shared
//! mutex. `(a, b)` and `(b, a)` resolve to the same mutex, and `(a, a)` is the
//! exclusive lock for account `a`.
//!
//! These locks sit on top of the storage row locks, they do not replace
//! them: a mutation is safe only while both are held.
//!
//! # Registry lifetime
//!
//! Mutexes are created on first use and removed once the last guard or waiter
//! lets go of them. Handles are only ever cloned under the map's shard lock,
//! and removal checks for a sole owner under the same lock, so two callers can
//! never end up with distinct mutexes for one pair.

use crate::base::AccountId;
use crate::error::LedgerError;
use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Canonical `(low, high)` pair of account ids.
pub type PairKey = (AccountId, AccountId);

/// Registry of pair locks.
#[derive(Debug, Default)]
pub struct LockCoordinator {
    handles: DashMap<PairKey, Arc<Mutex<()>>>,
    /// Upper bound on waiting for a lock; `None` waits forever.
    timeout: Option<Duration>,
}

impl LockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            handles: DashMap::new(),
            timeout,
        }
    }

    /// Orders a pair so that `key(a, b) == key(b, a)`.
    pub fn key(a: AccountId, b: AccountId) -> PairKey {
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Locks the pair `(a, b)`, blocking until it is free.
    ///
    /// # Errors
    ///
    /// [`LedgerError::LockTimeout`] if a timeout is configured and elapses.
    pub fn lock(&self, a: AccountId, b: AccountId) -> Result<PairGuard<'_>, LedgerError> {
        let key = Self::key(a, b);
        let handle = self.handle(key);

        let guard = match self.timeout {
            None => handle.lock_arc(),
            Some(timeout) => match handle.try_lock_arc_for(timeout) {
                Some(guard) => guard,
                None => {
                    drop(handle);
                    self.reclaim(key);
                    warn!(low = %key.0, high = %key.1, ?timeout, "lock acquisition timed out");
                    return Err(LedgerError::LockTimeout);
                }
            },
        };
        debug!(low = %key.0, high = %key.1, "pair lock acquired");

        Ok(PairGuard {
            coordinator: self,
            key,
            guard: Some(guard),
        })
    }

    /// Exclusive lock for a single account.
    pub fn lock_account(&self, id: AccountId) -> Result<PairGuard<'_>, LedgerError> {
        self.lock(id, id)
    }

    /// Number of pairs currently held or waited on.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn handle(&self, key: PairKey) -> Arc<Mutex<()>> {
        Arc::clone(
            self.handles
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn reclaim(&self, key: PairKey) {
        self.handles
            .remove_if(&key, |_, handle| Arc::strong_count(handle) == 1);
    }
}

/// Held pair lock; released on drop.
#[must_use = "the pair lock is released as soon as the guard is dropped"]
pub struct PairGuard<'a> {
    coordinator: &'a LockCoordinator,
    key: PairKey,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl PairGuard<'_> {
    pub fn key(&self) -> PairKey {
        self.key
    }
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        // Unlock and release our handle before checking for reclamation.
        self.guard.take();
        self.coordinator.reclaim(self.key);
        debug!(low = %self.key.0, high = %self.key.1, "pair lock released");
    }
}

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

//! In-process relational store implementing the persistence port.
//!
//! [`MemoryStore`] behaves like a small row-locking database:
//!
//! - Writes take a pessimistic row lock that is held until the owning
//!   transaction commits or aborts. Waiting for a lock is un-timed.
//! - Reads are read-committed: uncommitted updates and inserts are only
//!   visible to the transaction that made them.
//! - `client.name` and `account.client_id` carry unique constraints.
//!
//! A [`MemoryTransaction`] that is dropped without being committed is
//! aborted, so locks are released on every exit path, panics included.

use crate::error::{LedgerError, StorageError};
use crate::store::{Connection, Criteria, Row, Table, Value};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

type TxId = u64;

#[derive(Debug)]
struct StoredRow {
    /// Last committed image; `None` while the inserting transaction is open.
    committed: Option<Row>,
    /// Uncommitted image written by the lock holder.
    pending: Option<Row>,
    locked_by: Option<TxId>,
}

impl StoredRow {
    fn view(&self, tx: TxId) -> Option<&Row> {
        if self.locked_by == Some(tx) && self.pending.is_some() {
            return self.pending.as_ref();
        }
        self.committed.as_ref()
    }

    fn images(&self) -> impl Iterator<Item = &Row> {
        self.committed.iter().chain(self.pending.iter())
    }
}

#[derive(Debug)]
struct TableData {
    rows: BTreeMap<i64, StoredRow>,
    next_id: i64,
}

impl Default for TableData {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

#[derive(Debug, Default)]
struct Database {
    tables: HashMap<Table, TableData>,
}

impl Database {
    fn table(&mut self, table: Table) -> &mut TableData {
        self.tables.entry(table).or_default()
    }

    fn find(&mut self, table: Table, tx: TxId, criteria: &Criteria) -> Option<i64> {
        self.table(table)
            .rows
            .iter()
            .find(|(_, row)| row.view(tx).is_some_and(|view| criteria.matches(view)))
            .map(|(id, _)| *id)
    }
}

fn unique_fields(table: Table) -> &'static [&'static str] {
    match table {
        Table::Client => &["name"],
        Table::Account => &["client_id"],
    }
}

#[derive(Debug, Default)]
struct Shared {
    db: Mutex<Database>,
    /// Signalled whenever row locks are released.
    released: Condvar,
    next_tx: AtomicU64,
}

/// Shared handle to an in-process database. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new transaction.
    pub fn begin(&self) -> MemoryTransaction {
        let id = self.shared.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(tx = id, "transaction started");
        MemoryTransaction {
            shared: Arc::clone(&self.shared),
            id,
            touched: Vec::new(),
            open: true,
        }
    }

    /// Runs `operation` in a fresh transaction, committing on `Ok` and
    /// aborting on `Err`.
    pub fn transaction<T, F>(&self, operation: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut MemoryTransaction) -> Result<T, LedgerError>,
    {
        let mut tx = self.begin();
        match operation(&mut tx) {
            Ok(value) => {
                tx.commit();
                Ok(value)
            }
            Err(error) => {
                tx.abort();
                Err(error)
            }
        }
    }

    /// Committed rows of `table`, ordered by id.
    pub fn committed_rows(&self, table: Table) -> Vec<Row> {
        let mut db = self.shared.db.lock();
        db.table(table)
            .rows
            .values()
            .filter_map(|row| row.committed.clone())
            .collect()
    }
}

/// One open transaction on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    id: TxId,
    /// Rows this transaction locked, in acquisition order.
    touched: Vec<(Table, i64)>,
    open: bool,
}

impl MemoryTransaction {
    pub fn commit(mut self) {
        self.finish(true);
    }

    pub fn abort(mut self) {
        self.finish(false);
    }

    fn finish(&mut self, commit: bool) {
        if !self.open {
            return;
        }
        self.open = false;

        let mut db = self.shared.db.lock();
        for (table, id) in self.touched.drain(..) {
            let rows = &mut db.table(table).rows;
            let Some(row) = rows.get_mut(&id) else {
                continue;
            };
            if row.locked_by != Some(self.id) {
                continue;
            }
            row.locked_by = None;
            match (commit, row.pending.take()) {
                (true, Some(image)) => row.committed = Some(image),
                (false, _) if row.committed.is_none() => {
                    rows.remove(&id);
                }
                _ => {}
            }
        }
        drop(db);
        self.shared.released.notify_all();

        debug!(tx = self.id, committed = commit, "transaction finished");
    }

    /// Takes the lock on row `id`, waiting while another transaction holds it.
    ///
    /// Returns `None` once the row is gone or no longer visible.
    fn acquire(
        &self,
        db: &mut MutexGuard<'_, Database>,
        table: Table,
        mut locate: impl FnMut(&mut Database) -> Option<i64>,
    ) -> Option<i64> {
        loop {
            let id = locate(&mut **db)?;
            let row = db.table(table).rows.get_mut(&id)?;
            match row.locked_by {
                Some(holder) if holder != self.id => {
                    trace!(tx = self.id, holder, %table, id, "waiting for row lock");
                    self.shared.released.wait(db);
                }
                Some(_) => return Some(id),
                None => {
                    row.locked_by = Some(self.id);
                    return Some(id);
                }
            }
        }
    }

    fn remember(&mut self, table: Table, id: i64) {
        if !self.touched.contains(&(table, id)) {
            self.touched.push((table, id));
        }
    }
}

impl Connection for MemoryTransaction {
    fn lookup(&mut self, table: Table, criteria: &Criteria) -> Result<Option<Row>, StorageError> {
        let mut db = self.shared.db.lock();
        let tx = self.id;
        Ok(db.find(table, tx, criteria).and_then(|id| {
            db.table(table)
                .rows
                .get(&id)
                .and_then(|row| row.view(tx).cloned())
        }))
    }

    fn lookup_for_update(
        &mut self,
        table: Table,
        criteria: &Criteria,
    ) -> Result<Option<Row>, StorageError> {
        let tx = self.id;
        let shared = Arc::clone(&self.shared);
        let mut db = shared.db.lock();
        let Some(id) = self.acquire(&mut db, table, |db| db.find(table, tx, criteria)) else {
            return Ok(None);
        };
        let row = db
            .table(table)
            .rows
            .get(&id)
            .and_then(|row| row.view(tx).cloned());
        drop(db);
        self.remember(table, id);
        Ok(row)
    }

    fn insert(&mut self, table: Table, mut fields: Row) -> Result<Option<i64>, StorageError> {
        let mut db = self.shared.db.lock();
        let data = db.table(table);

        for &field in unique_fields(table) {
            let Some(value) = fields.get(field) else {
                continue;
            };
            let taken = data
                .rows
                .values()
                .flat_map(StoredRow::images)
                .any(|image| image.get(field) == Some(value));
            if taken {
                return Err(StorageError::UniqueViolation {
                    table: table.name(),
                    field,
                });
            }
        }

        let id = data.next_id;
        data.next_id += 1;
        fields.insert("id", Value::Integer(id));
        data.rows.insert(
            id,
            StoredRow {
                committed: None,
                pending: Some(fields),
                locked_by: Some(self.id),
            },
        );
        drop(db);
        self.remember(table, id);
        Ok(Some(id))
    }

    fn update(&mut self, table: Table, id: i64, mut fields: Row) -> Result<u64, StorageError> {
        let tx = self.id;
        let shared = Arc::clone(&self.shared);
        let mut db = shared.db.lock();
        let visible = |db: &mut Database| {
            db.table(table)
                .rows
                .get(&id)
                .and_then(|row| row.view(tx))
                .map(|_| id)
        };
        if self.acquire(&mut db, table, visible).is_none() {
            return Ok(0);
        }

        fields.remove("id");
        let Some(row) = db.table(table).rows.get_mut(&id) else {
            return Ok(0);
        };
        let mut image = match row.view(tx) {
            Some(image) => image.clone(),
            None => return Ok(0),
        };
        image.extend(fields);
        row.pending = Some(image);
        drop(db);
        self.remember(table, id);
        Ok(1)
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.finish(false);
    }
}

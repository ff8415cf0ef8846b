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

//! Persistence port.
//!
//! The ledger never talks to a driver directly. Every operation receives a
//! [`Connection`], which is one open transaction against a relational store.
//! Committing or aborting that transaction is the business of whoever
//! opened it.
//!
//! Logical schema:
//!
//! ```text
//! client(id, name UNIQUE)
//! account(id, client_id UNIQUE, currency, amount DEFAULT 0, created_at)
//! ```

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Tables the ledger reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Client,
    Account,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Client => "client",
            Table::Account => "account",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

/// Field name to value.
pub type Row = HashMap<&'static str, Value>;

/// Typed field access for decoding rows into entities.
pub trait RowExt {
    fn integer(&self, table: Table, field: &'static str) -> Result<i64, StorageError>;
    fn text(&self, table: Table, field: &'static str) -> Result<&str, StorageError>;
    fn timestamp(&self, table: Table, field: &'static str)
    -> Result<DateTime<Utc>, StorageError>;
}

impl RowExt for Row {
    fn integer(&self, table: Table, field: &'static str) -> Result<i64, StorageError> {
        match self.get(field) {
            Some(Value::Integer(value)) => Ok(*value),
            _ => Err(decode_error(table, field)),
        }
    }

    fn text(&self, table: Table, field: &'static str) -> Result<&str, StorageError> {
        match self.get(field) {
            Some(Value::Text(value)) => Ok(value),
            _ => Err(decode_error(table, field)),
        }
    }

    fn timestamp(
        &self,
        table: Table,
        field: &'static str,
    ) -> Result<DateTime<Utc>, StorageError> {
        match self.get(field) {
            Some(Value::Timestamp(value)) => Ok(*value),
            _ => Err(decode_error(table, field)),
        }
    }
}

fn decode_error(table: Table, field: &'static str) -> StorageError {
    StorageError::Decode {
        table: table.name(),
        field,
    }
}

/// Equality criteria, all of which a row must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Criteria {
    fields: Vec<(&'static str, Value)>,
}

impl Criteria {
    /// Matches rows whose `field` equals `value`.
    pub fn by(field: &'static str, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    pub fn and(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((field, value.into()));
        self
    }

    pub fn fields(&self) -> &[(&'static str, Value)] {
        &self.fields
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.fields
            .iter()
            .all(|(field, value)| row.get(field) == Some(value))
    }
}

/// One open transaction against the store.
///
/// Implementations must be usable from whichever worker thread owns them;
/// a connection is never shared between workers.
pub trait Connection {
    /// Reads the first row matching `criteria` without locking it.
    fn lookup(&mut self, table: Table, criteria: &Criteria) -> Result<Option<Row>, StorageError>;

    /// Reads the first row matching `criteria` and takes its row lock.
    ///
    /// Blocks until a conflicting lock held by another transaction is
    /// released. The lock is held until this transaction ends.
    fn lookup_for_update(
        &mut self,
        table: Table,
        criteria: &Criteria,
    ) -> Result<Option<Row>, StorageError>;

    /// Inserts a row and returns its new id, or `None` if the store
    /// declined to create it.
    fn insert(&mut self, table: Table, fields: Row) -> Result<Option<i64>, StorageError>;

    /// Updates the row with `id`; returns the number of rows affected.
    fn update(&mut self, table: Table, id: i64, fields: Row) -> Result<u64, StorageError>;
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn lookup(&mut self, table: Table, criteria: &Criteria) -> Result<Option<Row>, StorageError> {
        (**self).lookup(table, criteria)
    }

    fn lookup_for_update(
        &mut self,
        table: Table,
        criteria: &Criteria,
    ) -> Result<Option<Row>, StorageError> {
        (**self).lookup_for_update(table, criteria)
    }

    fn insert(&mut self, table: Table, fields: Row) -> Result<Option<i64>, StorageError> {
        (**self).insert(table, fields)
    }

    fn update(&mut self, table: Table, id: i64, fields: Row) -> Result<u64, StorageError> {
        (**self).update(table, id, fields)
    }
}

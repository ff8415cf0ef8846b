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

//! Client entity.
//!
//! A client is an identity with a globally unique name. It owns at most one
//! account and is never mutated once created.

use crate::base::ClientId;
use crate::error::{LedgerError, StorageError};
use crate::store::{Connection, Criteria, Row, RowExt, Table, Value};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    id: ClientId,
    name: String,
}

impl Client {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks a client up by id. Absence is `Ok(None)`, never an error.
    pub fn get_by_id<C>(conn: &mut C, id: ClientId) -> Result<Option<Client>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Self::find(conn, &Criteria::by("id", id.0))
    }

    pub fn get_by_name<C>(conn: &mut C, name: &str) -> Result<Option<Client>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Self::find(conn, &Criteria::by("name", name))
    }

    /// Creates a client.
    ///
    /// The name pre-check only narrows the race with a concurrent creator;
    /// the store's unique constraint is what actually guarantees uniqueness,
    /// and its violation is reported the same way.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ClientNameRequired`] - Blank name.
    /// - [`LedgerError::DuplicateClient`] - Name already taken.
    /// - [`LedgerError::ClientNotCreated`] - Store declined the insert.
    pub fn create<C>(conn: &mut C, name: &str) -> Result<Client, LedgerError>
    where
        C: Connection + ?Sized,
    {
        if name.trim().is_empty() {
            return Err(LedgerError::ClientNameRequired);
        }

        if Self::get_by_name(conn, name)?.is_some() {
            warn!(name, "client already exists");
            return Err(LedgerError::DuplicateClient);
        }

        let fields = Row::from([("name", Value::from(name))]);
        let id = match conn.insert(Table::Client, fields) {
            Ok(Some(id)) => ClientId(id),
            Ok(None) => {
                error!(name, "store declined client insert");
                return Err(LedgerError::ClientNotCreated);
            }
            Err(StorageError::UniqueViolation { .. }) => {
                warn!(name, "client name taken concurrently");
                return Err(LedgerError::DuplicateClient);
            }
            Err(e) => return Err(e.into()),
        };

        info!(client_id = %id, name, "client created");
        Ok(Client {
            id,
            name: name.to_string(),
        })
    }

    fn find<C>(conn: &mut C, criteria: &Criteria) -> Result<Option<Client>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        conn.lookup(Table::Client, criteria)?
            .map(|row| Self::from_row(&row))
            .transpose()
            .map_err(LedgerError::from)
    }

    fn from_row(row: &Row) -> Result<Client, StorageError> {
        Ok(Client {
            id: ClientId(row.integer(Table::Client, "id")?),
            name: row.text(Table::Client, "name")?.to_string(),
        })
    }
}

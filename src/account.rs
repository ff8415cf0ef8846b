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

//! Account entity.
//!
//! An [`Account`] is a request-scoped projection of one `account` row, not a
//! cache. Storage is authoritative, so every mutation re-reads the row under
//! its row lock before computing the new balance.
//!
//! # Example
//!
//! ```
//! use account_ledger_rs::{Account, Client, Currency, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let mut tx = store.begin();
//! let client = Client::create(&mut tx, "Alice").unwrap();
//! let account = Account::create(&mut tx, client.id(), Currency::Eur).unwrap();
//! assert_eq!(account.amount(), 0);
//! tx.commit();
//! ```

use crate::base::{AccountId, ClientId, Currency};
use crate::client::Client;
use crate::error::{LedgerError, StorageError};
use crate::store::{Connection, Criteria, Row, RowExt, Table, Value};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    id: AccountId,
    #[serde(rename = "client")]
    client_id: ClientId,
    currency: Currency,
    amount: i64,
    created_at: DateTime<Utc>,
}

impl Account {
    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Balance as of the last read or successful mutation.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Plain read by id, no lock taken.
    pub fn get_by_id<C>(conn: &mut C, id: AccountId) -> Result<Option<Account>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Self::find(conn, &Criteria::by("id", id.0), false)
    }

    /// Plain read of the account owned by `client_id`, no lock taken.
    pub fn get_by_client<C>(
        conn: &mut C,
        client_id: ClientId,
    ) -> Result<Option<Account>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Self::find(conn, &Criteria::by("client_id", client_id.0), false)
    }

    /// Reads the row and takes its row lock for the rest of the transaction.
    ///
    /// Blocks while another transaction holds the lock; the returned values
    /// may differ from any snapshot taken before the call.
    pub(crate) fn lock_by_id<C>(
        conn: &mut C,
        id: AccountId,
    ) -> Result<Option<Account>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Self::find(conn, &Criteria::by("id", id.0), true)
    }

    /// Opens a zero-balance account for an existing client.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ClientNotFound`] - No such client.
    /// - [`LedgerError::DuplicateAccount`] - Client already owns an account.
    /// - [`LedgerError::AccountNotCreated`] - Store declined the insert.
    pub fn create<C>(
        conn: &mut C,
        client_id: ClientId,
        currency: Currency,
    ) -> Result<Account, LedgerError>
    where
        C: Connection + ?Sized,
    {
        if Client::get_by_id(conn, client_id)?.is_none() {
            warn!(%client_id, "cannot open account for unknown client");
            return Err(LedgerError::ClientNotFound);
        }

        // One account per client. The unique constraint on client_id backs
        // this check up against concurrent creators.
        if Self::get_by_client(conn, client_id)?.is_some() {
            warn!(%client_id, "client already has an account");
            return Err(LedgerError::DuplicateAccount);
        }

        let created_at = Utc::now();
        let fields = Row::from([
            ("client_id", Value::Integer(client_id.0)),
            ("currency", Value::from(currency.code())),
            ("amount", Value::Integer(0)),
            ("created_at", Value::Timestamp(created_at)),
        ]);

        let id = match conn.insert(Table::Account, fields) {
            Ok(Some(id)) => AccountId(id),
            Ok(None) => {
                error!(%client_id, "store declined account insert");
                return Err(LedgerError::AccountNotCreated);
            }
            Err(StorageError::UniqueViolation { .. }) => {
                warn!(%client_id, "account opened concurrently for client");
                return Err(LedgerError::DuplicateAccount);
            }
            Err(e) => return Err(e.into()),
        };

        info!(account_id = %id, %client_id, %currency, "account created");
        Ok(Account {
            id,
            client_id,
            currency,
            amount: 0,
            created_at,
        })
    }

    /// Re-reads this account without locking, replacing a stale snapshot.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] if the row is no longer visible.
    pub fn refresh<C>(&mut self, conn: &mut C) -> Result<(), LedgerError>
    where
        C: Connection + ?Sized,
    {
        *self = Self::get_by_id(conn, self.id)?.ok_or(LedgerError::AccountNotFound)?;
        Ok(())
    }

    /// Adds `delta` to the stored balance.
    ///
    /// The caller must hold the in-process lock for this account. The row is
    /// re-read under its row lock, so the balance used is the authoritative
    /// one rather than `self.amount`. On success `self` is synchronised with
    /// the stored value; on failure nothing is written.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] - Row vanished.
    /// - [`LedgerError::InsufficientFunds`] - Balance would go negative.
    /// - [`LedgerError::AmountOverflow`] - Balance out of range.
    /// - [`LedgerError::UpdateFailed`] - Update affected no row.
    pub(crate) fn apply_delta<C>(&mut self, conn: &mut C, delta: i64) -> Result<(), LedgerError>
    where
        C: Connection + ?Sized,
    {
        let current = Self::lock_by_id(conn, self.id)?.ok_or(LedgerError::AccountNotFound)?;
        debug!(account_id = %self.id, amount = current.amount, delta, "updating account");

        let new_amount = current
            .amount
            .checked_add(delta)
            .ok_or(LedgerError::AmountOverflow)?;
        if new_amount < 0 {
            warn!(account_id = %self.id, amount = current.amount, delta, "insufficient funds");
            return Err(LedgerError::InsufficientFunds);
        }

        let fields = Row::from([("amount", Value::Integer(new_amount))]);
        let rows_updated = conn.update(Table::Account, self.id.0, fields)?;
        if rows_updated != 1 {
            error!(account_id = %self.id, rows_updated, "account update affected no row");
            return Err(LedgerError::UpdateFailed);
        }

        *self = current;
        self.amount = new_amount;
        self.assert_invariants();
        info!(account_id = %self.id, delta, amount = new_amount, "account updated");
        Ok(())
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.amount >= 0,
            "Invariant violated: account {} balance went negative: {}",
            self.id,
            self.amount
        );
    }

    fn find<C>(
        conn: &mut C,
        criteria: &Criteria,
        for_update: bool,
    ) -> Result<Option<Account>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        let row = if for_update {
            conn.lookup_for_update(Table::Account, criteria)?
        } else {
            conn.lookup(Table::Account, criteria)?
        };
        row.map(|row| Self::from_row(&row))
            .transpose()
            .map_err(LedgerError::from)
    }

    fn from_row(row: &Row) -> Result<Account, StorageError> {
        let currency = row
            .text(Table::Account, "currency")?
            .parse()
            .map_err(|_| StorageError::Decode {
                table: Table::Account.name(),
                field: "currency",
            })?;

        Ok(Account {
            id: AccountId(row.integer(Table::Account, "id")?),
            client_id: ClientId(row.integer(Table::Account, "client_id")?),
            currency,
            amount: row.integer(Table::Account, "amount")?,
            created_at: row.timestamp(Table::Account, "created_at")?,
        })
    }
}

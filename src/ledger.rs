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

//! Ledger operations.
//!
//! The [`Ledger`] is the entry point for the request layer. It owns the
//! [`LockCoordinator`] and runs every operation inside the transaction it is
//! handed; it never commits or aborts on its own.
//!
//! # Lock protocol
//!
//! - `update_amount` and `update_client_account` take the self-pair lock of
//!   their account.
//! - `transfer` takes the pair lock `(src, dst)`, then the self-pair locks of
//!   the lower and the higher account id, in that order, then the row locks
//!   in the same ascending order.
//!
//! No code path takes two account locks high-id first, so waiters cannot
//! form a cycle. The pair lock additionally serializes `A -> B` against
//! `B -> A` before either touches a row. Guards are released in reverse
//! order on every exit path.
//!
//! Each operation expects a transaction of its own. Row locks outlive the
//! in-process locks until commit, so running several operations in one
//! transaction can interleave the two lock layers in conflicting orders.

use crate::account::Account;
use crate::base::{AccountId, ClientId, Currency};
use crate::client::Client;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::lock::LockCoordinator;
use crate::store::Connection;
use tracing::{debug, error, info, warn};

/// Ledger service shared by all workers.
#[derive(Debug, Default)]
pub struct Ledger {
    locks: LockCoordinator,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            locks: LockCoordinator::with_timeout(config.lock_timeout),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    pub fn create_client<C>(&self, conn: &mut C, name: &str) -> Result<Client, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Client::create(conn, name)
    }

    pub fn client<C>(&self, conn: &mut C, id: ClientId) -> Result<Option<Client>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Client::get_by_id(conn, id)
    }

    pub fn client_by_name<C>(&self, conn: &mut C, name: &str) -> Result<Option<Client>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Client::get_by_name(conn, name)
    }

    pub fn create_account<C>(
        &self,
        conn: &mut C,
        client_id: ClientId,
        currency: Currency,
    ) -> Result<Account, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Account::create(conn, client_id, currency)
    }

    /// Opens an account from a raw currency code.
    ///
    /// The code is validated before storage is touched.
    ///
    /// # Errors
    ///
    /// [`LedgerError::CurrencyRequired`] or [`LedgerError::UnsupportedCurrency`]
    /// for a bad code, otherwise as [`Account::create`].
    pub fn create_account_with_code<C>(
        &self,
        conn: &mut C,
        client_id: ClientId,
        currency: &str,
    ) -> Result<Account, LedgerError>
    where
        C: Connection + ?Sized,
    {
        let currency = currency.parse::<Currency>()?;
        Account::create(conn, client_id, currency)
    }

    pub fn account<C>(&self, conn: &mut C, id: AccountId) -> Result<Option<Account>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Account::get_by_id(conn, id)
    }

    pub fn account_by_client<C>(
        &self,
        conn: &mut C,
        client_id: ClientId,
    ) -> Result<Option<Account>, LedgerError>
    where
        C: Connection + ?Sized,
    {
        Account::get_by_client(conn, client_id)
    }

    /// Adds `delta` (negative to withdraw) to an account balance.
    ///
    /// Serialized per account. Returns the account as stored after the update.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] - No such account.
    /// - [`LedgerError::InsufficientFunds`] - Balance would go negative.
    /// - [`LedgerError::AmountOverflow`] - Balance out of range.
    /// - [`LedgerError::UpdateFailed`] - Update affected no row.
    /// - [`LedgerError::LockTimeout`] - Configured lock timeout elapsed.
    pub fn update_amount<C>(
        &self,
        conn: &mut C,
        id: AccountId,
        delta: i64,
    ) -> Result<Account, LedgerError>
    where
        C: Connection + ?Sized,
    {
        let _guard = self.locks.lock_account(id)?;

        let mut account = Account::lock_by_id(conn, id)?.ok_or(LedgerError::AccountNotFound)?;
        account.apply_delta(conn, delta)?;
        Ok(account)
    }

    /// Adds `delta` to an account on behalf of the client that owns it.
    ///
    /// Ownership is checked under the account lock, against the stored row.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotAccountOwner`] if `client_id` does not own the
    /// account, otherwise as [`Ledger::update_amount`].
    pub fn update_client_account<C>(
        &self,
        conn: &mut C,
        client_id: ClientId,
        id: AccountId,
        delta: i64,
    ) -> Result<Account, LedgerError>
    where
        C: Connection + ?Sized,
    {
        let _guard = self.locks.lock_account(id)?;

        let mut account = Account::lock_by_id(conn, id)?.ok_or(LedgerError::AccountNotFound)?;
        if account.client_id() != client_id {
            warn!(
                %client_id,
                account_id = %id,
                owner = %account.client_id(),
                "client does not own account"
            );
            return Err(LedgerError::NotAccountOwner);
        }
        account.apply_delta(conn, delta)?;
        Ok(account)
    }

    /// Moves `amount` from `src` to `dst`.
    ///
    /// Returns the source account as stored after the debit.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SameAccountTransfer`] - `src == dst`; no lock taken.
    /// - [`LedgerError::InvalidTransferAmount`] - `amount <= 0`; no lock taken.
    /// - [`LedgerError::SourceNotFound`] / [`LedgerError::DestinationNotFound`]
    /// - [`LedgerError::CurrencyMismatch`]
    /// - [`LedgerError::InsufficientFunds`] - Source cannot cover `amount`.
    /// - [`LedgerError::SourceUpdateFailed`] - Debit did not persist.
    /// - [`LedgerError::DestinationUpdateFailed`] - Credit failed after the
    ///   debit; the debit has been reversed.
    /// - [`LedgerError::LockTimeout`] - Configured lock timeout elapsed.
    pub fn transfer<C>(
        &self,
        conn: &mut C,
        src: AccountId,
        dst: AccountId,
        amount: i64,
    ) -> Result<Account, LedgerError>
    where
        C: Connection + ?Sized,
    {
        if src == dst {
            warn!(%src, "transfer to the same account");
            return Err(LedgerError::SameAccountTransfer);
        }
        if amount <= 0 {
            warn!(%src, %dst, amount, "transfer amount must be positive");
            return Err(LedgerError::InvalidTransferAmount);
        }

        let (low, high) = LockCoordinator::key(src, dst);
        let _pair = self.locks.lock(src, dst)?;
        let _low = self.locks.lock_account(low)?;
        let _high = self.locks.lock_account(high)?;

        // Row locks follow the same ascending order. Values may have moved
        // since the caller last looked.
        let low_account = Account::lock_by_id(conn, low)?;
        let high_account = Account::lock_by_id(conn, high)?;
        let (src_account, dst_account) = if src == low {
            (low_account, high_account)
        } else {
            (high_account, low_account)
        };
        debug!(%src, %dst, "transfer accounts locked");

        let mut src_account = src_account.ok_or_else(|| {
            warn!(%src, "transfer source not found");
            LedgerError::SourceNotFound
        })?;
        let mut dst_account = dst_account.ok_or_else(|| {
            warn!(%dst, "transfer destination not found");
            LedgerError::DestinationNotFound
        })?;

        if src_account.currency() != dst_account.currency() {
            warn!(
                %src, %dst,
                src_currency = %src_account.currency(),
                dst_currency = %dst_account.currency(),
                "currency mismatch"
            );
            return Err(LedgerError::CurrencyMismatch);
        }

        src_account
            .apply_delta(conn, -amount)
            .map_err(|e| match e {
                LedgerError::UpdateFailed | LedgerError::AccountNotFound => {
                    error!(%src, "debit of transfer source failed");
                    LedgerError::SourceUpdateFailed
                }
                other => other,
            })?;

        if let Err(e) = dst_account.apply_delta(conn, amount) {
            error!(%src, %dst, amount, error = %e, "credit of transfer destination failed");
            // Reverse the debit within this transaction; the owner may still abort.
            if let Err(compensation) = src_account.apply_delta(conn, amount) {
                error!(%src, amount, error = %compensation, "compensating credit failed");
            }
            return Err(LedgerError::DestinationUpdateFailed);
        }

        info!(
            %src, %dst, amount,
            src_amount = src_account.amount(),
            dst_amount = dst_account.amount(),
            "transfer completed"
        );
        Ok(src_account)
    }
}

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

//! Error types for ledger operations.
//!
//! Every [`LedgerError`] carries a stable numeric code and an [`ErrorKind`]
//! so the request layer can tell "your request is invalid" apart from
//! "the system could not complete your request" without matching on
//! individual variants.

use thiserror::Error;

/// Failure categories a caller maps to a user-facing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Client or account absent for a given id.
    NotFound,
    /// Missing or malformed input.
    Validation,
    /// Uniqueness rule violated.
    Conflict,
    /// Resulting balance would go negative.
    InsufficientFunds,
    /// Same-account transfer or currency mismatch.
    TransferRule,
    /// Storage did not do what was expected.
    PersistenceFailure,
    /// Anything else; a server fault.
    Unexpected,
}

/// Errors raised by the storage layer behind the persistence port.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A unique constraint rejected an insert.
    #[error("unique constraint violated on {table}.{field}")]
    UniqueViolation {
        table: &'static str,
        field: &'static str,
    },

    /// A stored row is missing a field or holds the wrong type.
    #[error("cannot decode field {table}.{field}")]
    Decode {
        table: &'static str,
        field: &'static str,
    },

    /// Driver-level failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Client not found")]
    ClientNotFound,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Internal storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Client cannot be created")]
    ClientNotCreated,

    #[error("Client already exists")]
    DuplicateClient,

    #[error("Client name must be provided")]
    ClientNameRequired,

    #[error("Currency must be provided to create an account")]
    CurrencyRequired,

    #[error("Client already has an account")]
    DuplicateAccount,

    #[error("Account cannot be created")]
    AccountNotCreated,

    #[error("Provided currency for account not supported: {0}")]
    UnsupportedCurrency(String),

    #[error("Client is not the owner of this account")]
    NotAccountOwner,

    /// The balance update touched no row.
    #[error("Account cannot be updated")]
    UpdateFailed,

    #[error("Insufficient amount to withdraw from account")]
    InsufficientFunds,

    #[error("Source account not found")]
    SourceNotFound,

    #[error("Destination account not found")]
    DestinationNotFound,

    #[error("Transfer must be done between different accounts")]
    SameAccountTransfer,

    #[error("Currencies in accounts do not match")]
    CurrencyMismatch,

    #[error("Amount to transfer must be a positive number")]
    InvalidTransferAmount,

    #[error("Error occurred while updating destination account")]
    DestinationUpdateFailed,

    #[error("Error occurred while updating source account")]
    SourceUpdateFailed,

    #[error("Unexpected server error: {0}")]
    Unexpected(String),

    #[error("Resulting amount is out of range")]
    AmountOverflow,

    #[error("Timed out waiting for an account lock")]
    LockTimeout,
}

impl LedgerError {
    /// Stable numeric code reported to callers.
    pub fn code(&self) -> u16 {
        match self {
            LedgerError::ClientNotFound => 1,
            LedgerError::AccountNotFound => 2,
            LedgerError::Storage(_) => 3,
            LedgerError::ClientNotCreated => 4,
            LedgerError::DuplicateClient => 5,
            LedgerError::ClientNameRequired => 6,
            LedgerError::CurrencyRequired => 7,
            LedgerError::DuplicateAccount => 8,
            LedgerError::AccountNotCreated => 9,
            LedgerError::UnsupportedCurrency(_) => 10,
            LedgerError::NotAccountOwner => 11,
            LedgerError::UpdateFailed => 13,
            LedgerError::InsufficientFunds => 14,
            LedgerError::SourceNotFound => 18,
            LedgerError::DestinationNotFound => 19,
            LedgerError::SameAccountTransfer => 20,
            LedgerError::CurrencyMismatch => 21,
            LedgerError::InvalidTransferAmount => 22,
            LedgerError::DestinationUpdateFailed => 23,
            LedgerError::SourceUpdateFailed => 24,
            LedgerError::Unexpected(_) => 25,
            LedgerError::AmountOverflow => 26,
            LedgerError::LockTimeout => 27,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ClientNotFound
            | LedgerError::AccountNotFound
            | LedgerError::SourceNotFound
            | LedgerError::DestinationNotFound
            | LedgerError::NotAccountOwner => ErrorKind::NotFound,
            LedgerError::ClientNameRequired
            | LedgerError::CurrencyRequired
            | LedgerError::UnsupportedCurrency(_)
            | LedgerError::InvalidTransferAmount
            | LedgerError::AmountOverflow => ErrorKind::Validation,
            LedgerError::DuplicateClient | LedgerError::DuplicateAccount => ErrorKind::Conflict,
            LedgerError::InsufficientFunds => ErrorKind::InsufficientFunds,
            LedgerError::SameAccountTransfer | LedgerError::CurrencyMismatch => {
                ErrorKind::TransferRule
            }
            LedgerError::Storage(_)
            | LedgerError::ClientNotCreated
            | LedgerError::AccountNotCreated
            | LedgerError::UpdateFailed
            | LedgerError::DestinationUpdateFailed
            | LedgerError::SourceUpdateFailed => ErrorKind::PersistenceFailure,
            LedgerError::Unexpected(_) | LedgerError::LockTimeout => ErrorKind::Unexpected,
        }
    }

    /// Suggested HTTP status for the request layer.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 400,
            ErrorKind::Conflict | ErrorKind::InsufficientFunds | ErrorKind::TransferRule => 422,
            ErrorKind::PersistenceFailure | ErrorKind::Unexpected => 500,
        }
    }

    /// `ERR_<code>: <message>` as reported at the boundary.
    pub fn describe(&self) -> String {
        format!("ERR_{:03}: {}", self.code(), self)
    }
}

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

//! # Account Ledger
//!
//! This library is the core of a ledger of client accounts: opening accounts,
//! debiting and crediting them, and transferring funds between them under
//! many concurrent callers without lost updates or negative balances.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Entry point; owns the lock registry and runs the
//!   single-account and transfer protocols.
//! - [`Account`]: Projection of one account row, with the non-negative
//!   balance invariant.
//! - [`Client`]: Identity owning at most one account.
//! - [`LockCoordinator`]: Symmetric pair locks keyed by account ids.
//! - [`Connection`]: Persistence port; one open transaction on a store.
//! - [`MemoryStore`]: Row-locking in-process store implementing the port.
//! - [`LedgerError`]: Error taxonomy with stable codes.
//!
//! ## Example
//!
//! ```
//! use account_ledger_rs::{Currency, Ledger, MemoryStore};
//!
//! let ledger = Ledger::new();
//! let store = MemoryStore::new();
//!
//! // Each operation runs in a transaction owned by the caller.
//! let (alice, bob) = store
//!     .transaction(|tx| {
//!         let alice = ledger.create_client(tx, "Alice")?;
//!         let bob = ledger.create_client(tx, "Bob")?;
//!         let alice = ledger.create_account(tx, alice.id(), Currency::Eur)?;
//!         let bob = ledger.create_account(tx, bob.id(), Currency::Eur)?;
//!         Ok((alice.id(), bob.id()))
//!     })
//!     .unwrap();
//!
//! store.transaction(|tx| ledger.update_amount(tx, alice, 100)).unwrap();
//! let alice_after = store.transaction(|tx| ledger.transfer(tx, alice, bob, 30)).unwrap();
//! assert_eq!(alice_after.amount(), 70);
//!
//! let bob_after = store.transaction(|tx| ledger.account(tx, bob)).unwrap().unwrap();
//! assert_eq!(bob_after.amount(), 30);
//! ```
//!
//! ## Thread Safety
//!
//! A single [`Ledger`] is shared by reference across worker threads. Each
//! worker brings its own transaction; connections are never shared.

pub mod account;
mod base;
pub mod client;
pub mod config;
pub mod error;
mod ledger;
pub mod lock;
pub mod logging;
pub mod memory;
pub mod store;

pub use account::Account;
pub use base::{AccountId, ClientId, Currency};
pub use client::Client;
pub use config::LedgerConfig;
pub use error::{ErrorKind, LedgerError, StorageError};
pub use ledger::Ledger;
pub use lock::{LockCoordinator, PairGuard};
pub use memory::{MemoryStore, MemoryTransaction};
pub use store::{Connection, Criteria, Row, Table, Value};

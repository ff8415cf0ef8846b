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

//! Property-based tests for the ledger.
//!
//! Random sequences of updates and transfers are applied both to a ledger
//! backed by [`MemoryStore`] and to a plain model of the balances; the two
//! must agree after every step.

use account_ledger_rs::{AccountId, Currency, Ledger, LedgerError, MemoryStore};
use proptest::prelude::*;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Update { account: usize, delta: i64 },
    Transfer { src: usize, dst: usize, amount: i64 },
}

fn arb_currency() -> impl Strategy<Value = Currency> {
    prop::sample::select(Currency::ALL.to_vec())
}

fn arb_op(accounts: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..accounts, -500i64..=500).prop_map(|(account, delta)| Op::Update { account, delta }),
        (0..accounts, 0..accounts, -10i64..=400)
            .prop_map(|(src, dst, amount)| Op::Transfer { src, dst, amount }),
    ]
}

/// Up to five accounts with random currencies and a matching op sequence.
fn arb_scenario() -> impl Strategy<Value = (Vec<Currency>, Vec<Op>)> {
    prop::collection::vec(arb_currency(), 2..=5).prop_flat_map(|currencies| {
        let accounts = currencies.len();
        (Just(currencies), prop::collection::vec(arb_op(accounts), 1..40))
    })
}

// =============================================================================
// Model
// =============================================================================

struct Model {
    currencies: Vec<Currency>,
    amounts: Vec<i64>,
}

impl Model {
    fn apply(&mut self, op: &Op) -> Result<(), LedgerError> {
        match *op {
            Op::Update { account, delta } => {
                let next = self.amounts[account] + delta;
                if next < 0 {
                    return Err(LedgerError::InsufficientFunds);
                }
                self.amounts[account] = next;
            }
            Op::Transfer { src, dst, amount } => {
                if src == dst {
                    return Err(LedgerError::SameAccountTransfer);
                }
                if amount <= 0 {
                    return Err(LedgerError::InvalidTransferAmount);
                }
                if self.currencies[src] != self.currencies[dst] {
                    return Err(LedgerError::CurrencyMismatch);
                }
                if self.amounts[src] < amount {
                    return Err(LedgerError::InsufficientFunds);
                }
                self.amounts[src] -= amount;
                self.amounts[dst] += amount;
            }
        }
        Ok(())
    }
}

fn open_accounts(ledger: &Ledger, store: &MemoryStore, currencies: &[Currency]) -> Vec<AccountId> {
    store
        .transaction(|tx| {
            let mut ids = Vec::with_capacity(currencies.len());
            for (i, currency) in currencies.iter().enumerate() {
                let client = ledger.create_client(tx, &format!("client-{i}"))?;
                ids.push(ledger.create_account(tx, client.id(), *currency)?.id());
            }
            Ok(ids)
        })
        .unwrap()
}

fn stored_amounts(ledger: &Ledger, store: &MemoryStore, ids: &[AccountId]) -> Vec<i64> {
    let mut tx = store.begin();
    ids.iter()
        .map(|id| ledger.account(&mut tx, *id).unwrap().unwrap().amount())
        .collect()
}

fn run(ledger: &Ledger, store: &MemoryStore, ids: &[AccountId], op: &Op) -> Result<(), LedgerError> {
    match *op {
        Op::Update { account, delta } => store
            .transaction(|tx| ledger.update_amount(tx, ids[account], delta))
            .map(|_| ()),
        Op::Transfer { src, dst, amount } => store
            .transaction(|tx| ledger.transfer(tx, ids[src], ids[dst], amount))
            .map(|_| ()),
    }
}

// =============================================================================
// Ledger Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Ledger and model agree on every outcome and every balance.
    #[test]
    fn ledger_matches_model((currencies, ops) in arb_scenario()) {
        let ledger = Ledger::new();
        let store = MemoryStore::new();
        let ids = open_accounts(&ledger, &store, &currencies);
        let mut model = Model { amounts: vec![0; currencies.len()], currencies };

        for op in &ops {
            let expected = model.apply(op);
            let actual = run(&ledger, &store, &ids, op);
            prop_assert_eq!(actual, expected, "op {:?}", op);
        }

        prop_assert_eq!(stored_amounts(&ledger, &store, &ids), model.amounts);
        prop_assert!(ledger.locks().is_empty());
    }

    /// Balances never go negative whatever is attempted.
    #[test]
    fn balances_never_negative((currencies, ops) in arb_scenario()) {
        let ledger = Ledger::new();
        let store = MemoryStore::new();
        let ids = open_accounts(&ledger, &store, &currencies);

        for op in &ops {
            let _ = run(&ledger, &store, &ids, op);
            for amount in stored_amounts(&ledger, &store, &ids) {
                prop_assert!(amount >= 0);
            }
        }
    }

    /// Transfers alone never change the total held per currency.
    #[test]
    fn transfers_conserve_total_per_currency(
        (currencies, ops) in arb_scenario(),
        seed in prop::collection::vec(0i64..=1_000, 5),
    ) {
        let ledger = Ledger::new();
        let store = MemoryStore::new();
        let ids = open_accounts(&ledger, &store, &currencies);
        for (id, amount) in ids.iter().zip(&seed) {
            store.transaction(|tx| ledger.update_amount(tx, *id, *amount)).unwrap();
        }

        let totals = |amounts: &[i64]| {
            Currency::ALL.map(|currency| {
                currencies
                    .iter()
                    .zip(amounts)
                    .filter(|(c, _)| **c == currency)
                    .map(|(_, amount)| *amount)
                    .sum::<i64>()
            })
        };
        let before = totals(&stored_amounts(&ledger, &store, &ids));

        for op in ops.iter().filter(|op| matches!(op, Op::Transfer { .. })) {
            let _ = run(&ledger, &store, &ids, op);
        }

        prop_assert_eq!(totals(&stored_amounts(&ledger, &store, &ids)), before);
    }

    /// A rejected operation leaves every balance as it was.
    #[test]
    fn rejected_operations_write_nothing((currencies, ops) in arb_scenario()) {
        let ledger = Ledger::new();
        let store = MemoryStore::new();
        let ids = open_accounts(&ledger, &store, &currencies);

        for op in &ops {
            let before = stored_amounts(&ledger, &store, &ids);
            if run(&ledger, &store, &ids, op).is_err() {
                prop_assert_eq!(stored_amounts(&ledger, &store, &ids), before);
            }
        }
    }
}

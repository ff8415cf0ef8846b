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

use account_ledger_rs::logging::{self, LoggingConfig};
use account_ledger_rs::{
    AccountId, ClientId, Connection, Ledger, LedgerConfig, LedgerError, MemoryStore, Table, Value,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{error, warn};

/// Account Ledger - Replay a CSV script of ledger commands
///
/// Each command runs in its own transaction against an in-memory store.
/// Final account balances are written to stdout as CSV.
#[derive(Parser, Debug)]
#[command(name = "account-ledger")]
#[command(about = "Replays ledger commands and reports account balances", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: op,a,b,c
    /// Example: cargo run -- commands.csv > accounts.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Give up waiting for an account lock after this many milliseconds
    #[arg(long, value_name = "MS")]
    lock_timeout_ms: Option<u64>,
}

fn main() {
    let args = Args::parse();

    logging::init(&LoggingConfig {
        level: args.log_level.clone(),
        json: args.json_logs,
    });

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), error = %e, "cannot open command file");
            process::exit(1);
        }
    };

    let mut config = LedgerConfig::default();
    if let Some(ms) = args.lock_timeout_ms {
        config = config.with_lock_timeout(Duration::from_millis(ms));
    }
    let ledger = Ledger::with_config(config);
    let store = MemoryStore::new();

    if let Err(e) = process_commands(&ledger, &store, BufReader::new(file)) {
        error!(error = %e, "cannot read command file");
        process::exit(1);
    }

    if let Err(e) = write_accounts(&store, std::io::stdout()) {
        error!(error = %e, "cannot write report");
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, a, b, c`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(default)]
    a: Option<String>,
    #[serde(default)]
    b: Option<String>,
    #[serde(default)]
    c: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Client {
        name: String,
    },
    Account {
        client_id: ClientId,
        currency: String,
    },
    Update {
        account_id: AccountId,
        delta: i64,
    },
    Transfer {
        src: AccountId,
        dst: AccountId,
        amount: i64,
    },
}

impl CsvRecord {
    /// Converts a CSV record to a command.
    ///
    /// Returns `None` for unknown operations or missing/unparsable fields.
    fn into_command(self) -> Option<Command> {
        fn int(field: &Option<String>) -> Option<i64> {
            field.as_deref()?.parse().ok()
        }

        match self.op.to_lowercase().as_str() {
            "client" => Some(Command::Client { name: self.a? }),
            "account" => Some(Command::Account {
                client_id: ClientId(int(&self.a)?),
                currency: self.b.unwrap_or_default(),
            }),
            "update" => Some(Command::Update {
                account_id: AccountId(int(&self.a)?),
                delta: int(&self.b)?,
            }),
            "transfer" => Some(Command::Transfer {
                src: AccountId(int(&self.a)?),
                dst: AccountId(int(&self.b)?),
                amount: int(&self.c)?,
            }),
            _ => None,
        }
    }
}

fn execute<C>(ledger: &Ledger, conn: &mut C, command: &Command) -> Result<(), LedgerError>
where
    C: Connection + ?Sized,
{
    match command {
        Command::Client { name } => ledger.create_client(conn, name).map(drop),
        Command::Account {
            client_id,
            currency,
        } => ledger
            .create_account_with_code(conn, *client_id, currency)
            .map(drop),
        Command::Update { account_id, delta } => {
            ledger.update_amount(conn, *account_id, *delta).map(drop)
        }
        Command::Transfer { src, dst, amount } => {
            ledger.transfer(conn, *src, *dst, *amount).map(drop)
        }
    }
}

/// Process commands from a CSV reader.
///
/// Every valid row runs in its own transaction, committed on success and
/// aborted on failure. Malformed rows and failed commands are logged and
/// skipped.
///
/// # CSV Format
///
/// Expected columns: `op, a, b, c`
/// - `client,<name>`
/// - `account,<client_id>,<currency>`
/// - `update,<account_id>,<delta>`
/// - `transfer,<src>,<dst>,<amount>`
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
pub fn process_commands<R: Read>(
    ledger: &Ledger,
    store: &MemoryStore,
    reader: R,
) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line, error = %e, "skipping malformed row");
                continue;
            }
        };

        let Some(command) = record.into_command() else {
            warn!(line, "skipping invalid command");
            continue;
        };

        if let Err(e) = store.transaction(|tx| execute(ledger, tx, &command)) {
            warn!(line, error = %e.describe(), "command failed");
        }
    }

    Ok(())
}

/// One output line.
#[derive(Debug, Serialize)]
struct AccountRecord {
    account: i64,
    client: i64,
    currency: String,
    amount: i64,
}

impl AccountRecord {
    fn from_row(row: &account_ledger_rs::Row) -> Option<Self> {
        let int = |field: &str| match row.get(field) {
            Some(Value::Integer(value)) => Some(*value),
            _ => None,
        };
        let currency = match row.get("currency") {
            Some(Value::Text(code)) => code.clone(),
            _ => return None,
        };
        Some(Self {
            account: int("id")?,
            client: int("client_id")?,
            currency,
            amount: int("amount")?,
        })
    }
}

/// Write committed accounts, ordered by id, to a CSV writer.
///
/// # CSV Format
///
/// Columns: `account, client, currency, amount`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_accounts<W: Write>(store: &MemoryStore, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for row in store.committed_rows(Table::Account) {
        match AccountRecord::from_row(&row) {
            Some(record) => wtr.serialize(record)?,
            None => warn!(?row, "skipping undecodable account row"),
        }
    }

    wtr.flush()?;
    Ok(())
}

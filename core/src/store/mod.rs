//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Calculators are pure; the settlement engine calls store methods and
//! never executes SQL directly.

mod cuts;
mod parameters;
mod runs;
mod sales;

pub use runs::{RunCounters, RunRecord};

use crate::error::SettlementResult;
use rusqlite::{types::Type, Connection, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

pub struct SettlementStore {
    conn: Connection,
}

impl SettlementStore {
    pub fn open(path: &str) -> SettlementResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SettlementResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SettlementResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_sales_and_parameters.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_cut_settlements.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_run_log.sql"))?;
        Ok(())
    }

    /// Run `f` inside one transaction. Any error rolls back everything `f` wrote.
    pub fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Self) -> SettlementResult<T>,
    ) -> SettlementResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    /// Raw connection, for tests and tooling only.
    /// Engine code never uses this.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ── Column helpers ─────────────────────────────────────────────

fn conversion_error<E>(idx: usize, ty: Type, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

pub(crate) fn get_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e))
}

pub(crate) fn get_opt_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| conversion_error(idx, Type::Text, e)))
        .transpose()
}

/// Parse a TEXT or INTEGER column through the domain type's own parser.
pub(crate) fn get_parsed<T, R>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    R: rusqlite::types::FromSql,
    T: TryFrom<R, Error = crate::error::SettlementError>,
{
    let raw: R = row.get(idx)?;
    T::try_from(raw).map_err(|e| conversion_error(idx, Type::Text, e))
}

pub(crate) fn get_u32(row: &Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    let raw: i64 = row.get(idx)?;
    u32::try_from(raw).map_err(|e| conversion_error(idx, Type::Integer, e))
}

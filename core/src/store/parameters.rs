use super::{get_parsed, get_u32, SettlementStore};
use crate::{
    error::{SettlementError, SettlementResult},
    parameter_store::CommissionParameter,
    types::{Periodo, Tier, Zona},
};
use rusqlite::params;

impl SettlementStore {
    /// Bulk upload. A (ruc, periodo) key that already exists, or repeats
    /// within `rows`, fails the whole upload and nothing is inserted.
    pub fn insert_parameters(&self, rows: &[CommissionParameter]) -> SettlementResult<usize> {
        self.in_transaction(|store| {
            let mut stmt = store.conn.prepare(
                "INSERT INTO commission_parameter (ruc, periodo, zona, meta, tier, marcha_blanca)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for p in rows {
                stmt.execute(params![
                    p.ruc,
                    p.periodo.as_u32(),
                    p.zona.as_str(),
                    p.meta,
                    p.tier.as_str(),
                    p.marcha_blanca,
                ])
                .map_err(|e| duplicate_or(e, p))?;
            }
            Ok(rows.len())
        })
    }

    /// Manual edit: last write wins for the (ruc, periodo) key.
    pub fn upsert_parameter(&self, p: &CommissionParameter) -> SettlementResult<()> {
        self.conn.execute(
            "INSERT INTO commission_parameter (ruc, periodo, zona, meta, tier, marcha_blanca)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(ruc, periodo) DO UPDATE SET
                zona = excluded.zona,
                meta = excluded.meta,
                tier = excluded.tier,
                marcha_blanca = excluded.marcha_blanca",
            params![
                p.ruc,
                p.periodo.as_u32(),
                p.zona.as_str(),
                p.meta,
                p.tier.as_str(),
                p.marcha_blanca,
            ],
        )?;
        Ok(())
    }

    pub fn parameters_for(
        &self,
        periodo: Periodo,
        zona: Zona,
    ) -> SettlementResult<Vec<CommissionParameter>> {
        let mut stmt = self.conn.prepare(
            "SELECT ruc, periodo, zona, meta, tier, marcha_blanca
             FROM commission_parameter
             WHERE periodo = ?1 AND zona = ?2
             ORDER BY ruc ASC",
        )?;
        let rows = stmt
            .query_map(params![periodo.as_u32(), zona.as_str()], |row| {
                Ok(CommissionParameter {
                    ruc: row.get(0)?,
                    periodo: get_parsed::<Periodo, u32>(row, 1)?,
                    zona: get_parsed::<Zona, String>(row, 2)?,
                    meta: get_u32(row, 3)?,
                    tier: get_parsed::<Tier, String>(row, 4)?,
                    marcha_blanca: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn duplicate_or(e: rusqlite::Error, p: &CommissionParameter) -> SettlementError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            SettlementError::DuplicateParameter {
                ruc: p.ruc.clone(),
                periodo: p.periodo.as_u32(),
            }
        }
        _ => e.into(),
    }
}

use super::{get_parsed, get_u32, SettlementStore};
use crate::{
    error::SettlementResult,
    event::EventLogEntry,
    types::{Corte, Periodo, Zona},
};
use rusqlite::{params, OptionalExtension};

/// Counters written to settlement_run when a cut run commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunCounters {
    pub rows_written: usize,
    pub flagged: usize,
    pub skipped: usize,
}

/// A settlement_run row.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub periodo: Periodo,
    pub zona: Zona,
    pub corte: Corte,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub counters: RunCounters,
    /// Run of an earlier cut that invalidated this one.
    pub superseded_by: Option<String>,
}

impl SettlementStore {
    // ── Runs ───────────────────────────────────────────────────

    pub fn start_run(
        &self,
        run_id: &str,
        periodo: Periodo,
        zona: Zona,
        corte: Corte,
    ) -> SettlementResult<()> {
        self.conn.execute(
            "INSERT INTO settlement_run (run_id, periodo, zona, corte, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                periodo.as_u32(),
                zona.as_str(),
                corte.number(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn complete_run(&self, run_id: &str, counters: RunCounters) -> SettlementResult<()> {
        self.conn.execute(
            "UPDATE settlement_run
             SET completed_at = ?2, rows_written = ?3, flagged = ?4, skipped = ?5
             WHERE run_id = ?1",
            params![
                run_id,
                chrono::Utc::now().to_rfc3339(),
                counters.rows_written as i64,
                counters.flagged as i64,
                counters.skipped as i64,
            ],
        )?;
        Ok(())
    }

    /// Cuts with a completed, still-current run for the batch, ascending.
    pub fn completed_cuts(&self, periodo: Periodo, zona: Zona) -> SettlementResult<Vec<Corte>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT corte FROM settlement_run
             WHERE periodo = ?1 AND zona = ?2
               AND completed_at IS NOT NULL AND superseded_by IS NULL
             ORDER BY corte ASC",
        )?;
        let cuts = stmt
            .query_map(params![periodo.as_u32(), zona.as_str()], |row| {
                get_parsed::<Corte, u8>(row, 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cuts)
    }

    /// Invalidate the current runs of every cut after `after`. Returns the
    /// cuts that had one, ascending.
    pub fn supersede_runs_after(
        &self,
        run_id: &str,
        periodo: Periodo,
        zona: Zona,
        after: Corte,
    ) -> SettlementResult<Vec<Corte>> {
        let superseded: Vec<Corte> = self
            .completed_cuts(periodo, zona)?
            .into_iter()
            .filter(|c| *c > after)
            .collect();
        self.conn.execute(
            "UPDATE settlement_run SET superseded_by = ?1
             WHERE periodo = ?2 AND zona = ?3 AND corte > ?4
               AND completed_at IS NOT NULL AND superseded_by IS NULL",
            params![run_id, periodo.as_u32(), zona.as_str(), after.number()],
        )?;
        Ok(superseded)
    }

    pub fn run(&self, run_id: &str) -> SettlementResult<Option<RunRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT run_id, periodo, zona, corte, started_at, completed_at,
                        rows_written, flagged, skipped, superseded_by
                 FROM settlement_run WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(RunRecord {
                        run_id: row.get(0)?,
                        periodo: get_parsed::<Periodo, u32>(row, 1)?,
                        zona: get_parsed::<Zona, String>(row, 2)?,
                        corte: get_parsed::<Corte, u8>(row, 3)?,
                        started_at: row.get(4)?,
                        completed_at: row.get(5)?,
                        counters: RunCounters {
                            rows_written: get_u32(row, 6)? as usize,
                            flagged: get_u32(row, 7)? as usize,
                            skipped: get_u32(row, 8)? as usize,
                        },
                        superseded_by: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> SettlementResult<()> {
        self.conn.execute(
            "INSERT INTO settlement_event_log (run_id, corte, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.run_id,
                entry.corte.number(),
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    /// Events of one run, in emission order.
    pub fn events_for_run(&self, run_id: &str) -> SettlementResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, corte, event_type, payload
             FROM settlement_event_log
             WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    corte: get_parsed::<Corte, u8>(row, 2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

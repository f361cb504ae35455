use super::{get_decimal, get_opt_decimal, get_parsed, get_u32, SettlementStore};
use crate::{
    error::SettlementResult,
    settlement::{Cut1Settlement, CutValidation, DiscountCutSettlement, ValidationInputs},
    types::{Corte, Periodo, SettlementKey, Tier, Zona},
};
use rusqlite::{params, OptionalExtension, Row};

const CUT1_COLUMNS: &str = "periodo, zona, ruc, agencia, meta, tier, altas,
    precio_sin_igv_promedio, cumplimiento_pct, marcha_blanca, bono_arpu,
    multiplicador_base, multiplicador_final, comision_total, recibos_pagados, pago_corte_1";

const DISCOUNT_COLUMNS: &str = "periodo, zona, ruc, agencia, altas, precio_sin_igv_promedio,
    recibos_pagados, recibos_no_pagados, umbral_penalidad, altas_penalizadas,
    penalidad_monto, cumplimiento_pct, clawback_monto, validacion_ok,
    altas_esperadas, recibos_esperados, altas_actuales, recibos_actuales,
    liberado_acumulado, total_a_pagar, altas_penalizadas_acumuladas, clawback_acumulado,
    superseded";

impl SettlementStore {
    // ── Cut 1 ──────────────────────────────────────────────────

    /// Upsert on (periodo, zona, ruc). Re-running overwrites, never duplicates.
    pub fn upsert_cut1(&self, c: &Cut1Settlement) -> SettlementResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO corte_1 ({CUT1_COLUMNS})
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)
                 ON CONFLICT(periodo, zona, ruc) DO UPDATE SET
                    agencia = excluded.agencia,
                    meta = excluded.meta,
                    tier = excluded.tier,
                    altas = excluded.altas,
                    precio_sin_igv_promedio = excluded.precio_sin_igv_promedio,
                    cumplimiento_pct = excluded.cumplimiento_pct,
                    marcha_blanca = excluded.marcha_blanca,
                    bono_arpu = excluded.bono_arpu,
                    multiplicador_base = excluded.multiplicador_base,
                    multiplicador_final = excluded.multiplicador_final,
                    comision_total = excluded.comision_total,
                    recibos_pagados = excluded.recibos_pagados,
                    pago_corte_1 = excluded.pago_corte_1"
            ),
            params![
                c.key.periodo.as_u32(),
                c.key.zona.as_str(),
                c.key.ruc,
                c.agencia,
                c.meta,
                c.tier.as_str(),
                c.altas,
                c.precio_sin_igv_promedio.to_string(),
                c.cumplimiento_pct.map(|p| p.to_string()),
                c.marcha_blanca,
                c.bono_arpu,
                c.multiplicador_base.to_string(),
                c.multiplicador_final.to_string(),
                c.comision_total.to_string(),
                c.recibos_pagados,
                c.pago_corte_1.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn cut1_rows(&self, periodo: Periodo, zona: Zona) -> SettlementResult<Vec<Cut1Settlement>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CUT1_COLUMNS} FROM corte_1
             WHERE periodo = ?1 AND zona = ?2
             ORDER BY ruc ASC"
        ))?;
        let rows = stmt
            .query_map(params![periodo.as_u32(), zona.as_str()], map_cut1_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn cut1_row(&self, key: &SettlementKey) -> SettlementResult<Option<Cut1Settlement>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CUT1_COLUMNS} FROM corte_1
                     WHERE periodo = ?1 AND zona = ?2 AND ruc = ?3"
                ),
                params![key.periodo.as_u32(), key.zona.as_str(), key.ruc],
                map_cut1_row,
            )
            .optional()?;
        Ok(row)
    }

    // ── Cuts 2..4 ──────────────────────────────────────────────

    /// Upsert into the table of `d.corte`, keyed on (periodo, zona, ruc).
    pub fn upsert_discount_cut(&self, d: &DiscountCutSettlement) -> SettlementResult<()> {
        let (expected, actual) = match d.validacion {
            CutValidation::Validated => (None, None),
            CutValidation::Mismatched { expected, actual } => (Some(expected), Some(actual)),
        };
        let table = d.corte.table_name();
        self.conn.execute(
            &format!(
                "INSERT INTO {table} ({DISCOUNT_COLUMNS})
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,
                         ?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)
                 ON CONFLICT(periodo, zona, ruc) DO UPDATE SET
                    agencia = excluded.agencia,
                    altas = excluded.altas,
                    precio_sin_igv_promedio = excluded.precio_sin_igv_promedio,
                    recibos_pagados = excluded.recibos_pagados,
                    recibos_no_pagados = excluded.recibos_no_pagados,
                    umbral_penalidad = excluded.umbral_penalidad,
                    altas_penalizadas = excluded.altas_penalizadas,
                    penalidad_monto = excluded.penalidad_monto,
                    cumplimiento_pct = excluded.cumplimiento_pct,
                    clawback_monto = excluded.clawback_monto,
                    validacion_ok = excluded.validacion_ok,
                    altas_esperadas = excluded.altas_esperadas,
                    recibos_esperados = excluded.recibos_esperados,
                    altas_actuales = excluded.altas_actuales,
                    recibos_actuales = excluded.recibos_actuales,
                    liberado_acumulado = excluded.liberado_acumulado,
                    total_a_pagar = excluded.total_a_pagar,
                    altas_penalizadas_acumuladas = excluded.altas_penalizadas_acumuladas,
                    clawback_acumulado = excluded.clawback_acumulado,
                    superseded = excluded.superseded"
            ),
            params![
                d.key.periodo.as_u32(),
                d.key.zona.as_str(),
                d.key.ruc,
                d.agencia,
                d.altas,
                d.precio_sin_igv_promedio.to_string(),
                d.recibos_pagados,
                d.recibos_no_pagados,
                d.umbral_penalidad,
                d.altas_penalizadas,
                d.penalidad_monto.to_string(),
                d.cumplimiento_pct.map(|p| p.to_string()),
                d.clawback_monto.to_string(),
                d.validacion.is_ok(),
                expected.map(|v| v.altas),
                expected.map(|v| v.recibos_pagados),
                actual.map(|v| v.altas),
                actual.map(|v| v.recibos_pagados),
                d.liberado_acumulado.to_string(),
                d.total_a_pagar.to_string(),
                d.altas_penalizadas_acumuladas,
                d.clawback_acumulado.to_string(),
                d.superseded,
            ],
        )?;
        Ok(())
    }

    /// Rows of one discount cut (2, 3 or 4) for a batch.
    pub fn discount_rows(
        &self,
        corte: Corte,
        periodo: Periodo,
        zona: Zona,
    ) -> SettlementResult<Vec<DiscountCutSettlement>> {
        if corte == Corte::Uno {
            return Ok(Vec::new());
        }
        let table = corte.table_name();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM {table}
             WHERE periodo = ?1 AND zona = ?2
             ORDER BY ruc ASC"
        ))?;
        let rows = stmt
            .query_map(params![periodo.as_u32(), zona.as_str()], |row| {
                map_discount_row(row, corte)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn discount_row(
        &self,
        corte: Corte,
        key: &SettlementKey,
    ) -> SettlementResult<Option<DiscountCutSettlement>> {
        if corte == Corte::Uno {
            return Ok(None);
        }
        let table = corte.table_name();
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {DISCOUNT_COLUMNS} FROM {table}
                     WHERE periodo = ?1 AND zona = ?2 AND ruc = ?3"
                ),
                params![key.periodo.as_u32(), key.zona.as_str(), key.ruc],
                |row| map_discount_row(row, corte),
            )
            .optional()?;
        Ok(row)
    }

    /// Rows of cuts 2..4 together, for the consolidation view.
    pub fn all_discount_rows(
        &self,
        periodo: Periodo,
        zona: Zona,
    ) -> SettlementResult<Vec<DiscountCutSettlement>> {
        let mut rows = Vec::new();
        for corte in [Corte::Dos, Corte::Tres, Corte::Cuatro] {
            rows.extend(self.discount_rows(corte, periodo, zona)?);
        }
        Ok(rows)
    }

    /// Flag every row of the later discount cuts as superseded.
    pub fn mark_superseded(
        &self,
        after: Corte,
        periodo: Periodo,
        zona: Zona,
    ) -> SettlementResult<usize> {
        let mut marked = 0;
        let mut next = after.next();
        while let Some(corte) = next {
            let table = corte.table_name();
            marked += self.conn.execute(
                &format!(
                    "UPDATE {table} SET superseded = 1
                     WHERE periodo = ?1 AND zona = ?2 AND superseded = 0"
                ),
                params![periodo.as_u32(), zona.as_str()],
            )?;
            next = corte.next();
        }
        Ok(marked)
    }

    pub fn cut_row_count(
        &self,
        corte: Corte,
        periodo: Periodo,
        zona: Zona,
    ) -> SettlementResult<i64> {
        let table = corte.table_name();
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE periodo = ?1 AND zona = ?2"),
            params![periodo.as_u32(), zona.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_cut1_row(row: &Row<'_>) -> rusqlite::Result<Cut1Settlement> {
    Ok(Cut1Settlement {
        key: SettlementKey {
            periodo: get_parsed::<Periodo, u32>(row, 0)?,
            zona: get_parsed::<Zona, String>(row, 1)?,
            ruc: row.get(2)?,
        },
        agencia: row.get(3)?,
        meta: get_u32(row, 4)?,
        tier: get_parsed::<Tier, String>(row, 5)?,
        altas: get_u32(row, 6)?,
        precio_sin_igv_promedio: get_decimal(row, 7)?,
        cumplimiento_pct: get_opt_decimal(row, 8)?,
        marcha_blanca: row.get(9)?,
        bono_arpu: row.get(10)?,
        multiplicador_base: get_decimal(row, 11)?,
        multiplicador_final: get_decimal(row, 12)?,
        comision_total: get_decimal(row, 13)?,
        recibos_pagados: get_u32(row, 14)?,
        pago_corte_1: get_decimal(row, 15)?,
    })
}

fn map_discount_row(row: &Row<'_>, corte: Corte) -> rusqlite::Result<DiscountCutSettlement> {
    let validacion_ok: bool = row.get(13)?;
    let validacion = if validacion_ok {
        CutValidation::Validated
    } else {
        CutValidation::Mismatched {
            expected: ValidationInputs {
                altas: get_u32(row, 14)?,
                recibos_pagados: get_u32(row, 15)?,
            },
            actual: ValidationInputs {
                altas: get_u32(row, 16)?,
                recibos_pagados: get_u32(row, 17)?,
            },
        }
    };

    Ok(DiscountCutSettlement {
        key: SettlementKey {
            periodo: get_parsed::<Periodo, u32>(row, 0)?,
            zona: get_parsed::<Zona, String>(row, 1)?,
            ruc: row.get(2)?,
        },
        corte,
        agencia: row.get(3)?,
        altas: get_u32(row, 4)?,
        precio_sin_igv_promedio: get_decimal(row, 5)?,
        recibos_pagados: get_u32(row, 6)?,
        recibos_no_pagados: get_u32(row, 7)?,
        umbral_penalidad: get_u32(row, 8)?,
        altas_penalizadas: get_u32(row, 9)?,
        penalidad_monto: get_decimal(row, 10)?,
        cumplimiento_pct: get_opt_decimal(row, 11)?,
        clawback_monto: get_decimal(row, 12)?,
        validacion,
        liberado_acumulado: get_decimal(row, 18)?,
        total_a_pagar: get_decimal(row, 19)?,
        altas_penalizadas_acumuladas: get_u32(row, 20)?,
        clawback_acumulado: get_decimal(row, 21)?,
        superseded: row.get(22)?,
    })
}

//! Consolidation view: a read-side join of the four cut tables.
//!
//! Recomputed on every read; nothing here is ever written back.

use crate::{
    error::{SettlementError, SettlementResult},
    settlement::{Cut1Settlement, DiscountCutSettlement},
    types::{Corte, SettlementKey, Tier},
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{collections::HashMap, io::Write};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedResult {
    pub key: SettlementKey,
    pub agencia: String,
    pub tier: Tier,
    pub meta: u32,
    pub altas: u32,
    pub cumplimiento_pct: Option<Decimal>,
    pub multiplicador_final: Decimal,
    pub comision_total: Decimal,
    /// Penalties of cuts 2, 3 and 4 (penalidad 1..3).
    pub penalidades: [Decimal; 3],
    /// Clawbacks of cuts 2, 3 and 4 (clawback 1..3).
    pub clawbacks: [Decimal; 3],
    pub total_penalidades: Decimal,
    pub total_clawbacks: Decimal,
    pub total_descuentos: Decimal,
    pub resultado_neto_final: Decimal,
    /// Latest cut persisted for this agency.
    pub ultimo_corte: Corte,
    /// Some cut disagreed with its predecessor on re-validation.
    pub needs_review: bool,
}

/// Join cut rows by key. Cut 1 is the base; missing later cuts count as zero.
/// Rows come back ordered by key.
pub fn consolidate(
    cut1: &[Cut1Settlement],
    discounts: &[DiscountCutSettlement],
) -> Vec<ConsolidatedResult> {
    let mut by_key: HashMap<&SettlementKey, Vec<&DiscountCutSettlement>> = HashMap::new();
    for d in discounts {
        by_key.entry(&d.key).or_default().push(d);
    }

    let mut out: Vec<ConsolidatedResult> = cut1
        .iter()
        .map(|c1| {
            let cuts = by_key.get(&c1.key).map(Vec::as_slice).unwrap_or(&[]);
            consolidate_one(c1, cuts)
        })
        .collect();
    out.sort_by(|a, b| a.key.cmp(&b.key));
    out
}

fn consolidate_one(c1: &Cut1Settlement, cuts: &[&DiscountCutSettlement]) -> ConsolidatedResult {
    let mut penalidades = [Decimal::ZERO; 3];
    let mut clawbacks = [Decimal::ZERO; 3];
    let mut ultimo_corte = Corte::Uno;
    let mut needs_review = false;

    for d in cuts {
        // Discount cuts 2..4 map to slots 0..2.
        let Some(slot) = d.corte.index().checked_sub(1) else {
            continue;
        };
        penalidades[slot] = d.penalidad_monto;
        clawbacks[slot] = d.clawback_monto;
        ultimo_corte = ultimo_corte.max(d.corte);
        needs_review |= d.needs_review();
    }

    let total_penalidades: Decimal = penalidades.iter().sum();
    let total_clawbacks: Decimal = clawbacks.iter().sum();
    let total_descuentos = total_penalidades + total_clawbacks;

    ConsolidatedResult {
        key: c1.key.clone(),
        agencia: c1.agencia.clone(),
        tier: c1.tier,
        meta: c1.meta,
        altas: c1.altas,
        cumplimiento_pct: c1.cumplimiento_pct,
        multiplicador_final: c1.multiplicador_final,
        comision_total: c1.comision_total,
        penalidades,
        clawbacks,
        total_penalidades,
        total_clawbacks,
        total_descuentos,
        resultado_neto_final: c1.comision_total - total_descuentos,
        ultimo_corte,
        needs_review,
    }
}

pub const CSV_HEADER: [&str; 20] = [
    "periodo",
    "zona",
    "ruc",
    "agencia",
    "tier",
    "meta",
    "altas",
    "cumplimiento",
    "multiplicador_final",
    "comision_total",
    "penalidad_1",
    "penalidad_2",
    "penalidad_3",
    "clawback_1",
    "clawback_2",
    "clawback_3",
    "total_penalidades",
    "total_clawbacks",
    "total_descuentos",
    "resultado_neto_final",
];

/// Currency with exactly two decimals.
pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

/// Percentage with two decimals and a `%` suffix; empty when undefined.
pub fn format_pct(pct: Option<Decimal>) -> String {
    pct.map(|p| format!("{:.2}%", p.round_dp(2))).unwrap_or_default()
}

impl ConsolidatedResult {
    /// One export record, in `CSV_HEADER` order.
    pub fn csv_record(&self) -> Vec<String> {
        let mut fields = vec![
            self.key.periodo.to_string(),
            self.key.zona.to_string(),
            self.key.ruc.clone(),
            self.agencia.clone(),
            self.tier.to_string(),
            self.meta.to_string(),
            self.altas.to_string(),
            format_pct(self.cumplimiento_pct),
            format!("{:.2}", self.multiplicador_final),
            format_money(self.comision_total),
        ];
        fields.extend(self.penalidades.iter().map(|p| format_money(*p)));
        fields.extend(self.clawbacks.iter().map(|c| format_money(*c)));
        fields.extend([
            format_money(self.total_penalidades),
            format_money(self.total_clawbacks),
            format_money(self.total_descuentos),
            format_money(self.resultado_neto_final),
        ]);
        fields
    }
}

/// Header plus one record per row, `\n`-terminated.
pub fn write_csv(rows: &[ConsolidatedResult], writer: impl Write) -> SettlementResult<()> {
    let mut csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for row in rows {
        csv.write_record(row.csv_record())?;
    }
    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn to_csv(rows: &[ConsolidatedResult]) -> SettlementResult<String> {
    let mut buf = Vec::new();
    write_csv(rows, &mut buf)?;
    String::from_utf8(buf).map_err(|e| SettlementError::Other(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::CutValidation;
    use crate::types::{Periodo, Zona};

    fn cut1(ruc: &str, comision: i64) -> Cut1Settlement {
        Cut1Settlement {
            key: SettlementKey::new(Periodo::new(2025, 4).unwrap(), Zona::Lima, ruc),
            agencia: "Agencia, Centro".into(),
            meta: 12,
            tier: Tier::Gold,
            altas: 10,
            precio_sin_igv_promedio: Decimal::from(100),
            cumplimiento_pct: Some(Decimal::new(8333, 2)),
            marcha_blanca: false,
            bono_arpu: false,
            multiplicador_base: Decimal::new(15, 1),
            multiplicador_final: Decimal::new(15, 1),
            comision_total: Decimal::from(comision),
            recibos_pagados: 0,
            pago_corte_1: Decimal::from(comision) * Decimal::new(6, 1),
        }
    }

    fn discount(
        c1: &Cut1Settlement,
        corte: Corte,
        pen: Decimal,
        claw: Decimal,
    ) -> DiscountCutSettlement {
        DiscountCutSettlement {
            key: c1.key.clone(),
            corte,
            agencia: c1.agencia.clone(),
            altas: 10,
            precio_sin_igv_promedio: Decimal::from(100),
            recibos_pagados: 8,
            recibos_no_pagados: 2,
            umbral_penalidad: 1,
            altas_penalizadas: 1,
            penalidad_monto: pen,
            cumplimiento_pct: None,
            clawback_monto: claw,
            validacion: CutValidation::Validated,
            liberado_acumulado: c1.comision_total,
            total_a_pagar: Decimal::ZERO,
            altas_penalizadas_acumuladas: 1,
            clawback_acumulado: claw,
            superseded: false,
        }
    }

    #[test]
    fn totals_are_additive() {
        let c1 = cut1("20100066603", 1500);
        let d = vec![
            discount(&c1, Corte::Dos, Decimal::from(100), Decimal::new(2050, 2)),
            discount(&c1, Corte::Tres, Decimal::new(3333, 2), Decimal::ZERO),
            discount(&c1, Corte::Cuatro, Decimal::ZERO, Decimal::new(1, 2)),
        ];
        let rows = consolidate(&[c1], &d);
        let r = &rows[0];
        assert_eq!(r.total_penalidades, Decimal::new(13333, 2));
        assert_eq!(r.total_clawbacks, Decimal::new(2051, 2));
        assert_eq!(r.total_descuentos, r.total_penalidades + r.total_clawbacks);
        assert_eq!(r.resultado_neto_final, r.comision_total - r.total_descuentos);
        assert_eq!(r.resultado_neto_final, Decimal::new(134616, 2));
        assert_eq!(r.ultimo_corte, Corte::Cuatro);
    }

    #[test]
    fn missing_cuts_read_as_zero() {
        let rows = consolidate(&[cut1("20100066603", 1500)], &[]);
        assert_eq!(rows[0].total_descuentos, Decimal::ZERO);
        assert_eq!(rows[0].resultado_neto_final, Decimal::from(1500));
        assert_eq!(rows[0].ultimo_corte, Corte::Uno);
        assert!(!rows[0].needs_review);
    }

    #[test]
    fn mismatch_in_any_cut_marks_review() {
        let c1 = cut1("20100066603", 1500);
        let mut d = discount(&c1, Corte::Tres, Decimal::ZERO, Decimal::ZERO);
        d.validacion = CutValidation::Mismatched {
            expected: crate::settlement::ValidationInputs { altas: 10, recibos_pagados: 8 },
            actual: crate::settlement::ValidationInputs { altas: 9, recibos_pagados: 8 },
        };
        let rows = consolidate(&[c1], &[d]);
        assert!(rows[0].needs_review);
    }

    #[test]
    fn csv_has_fixed_columns_and_formatting() {
        let c1 = cut1("20100066603", 1500);
        let d = discount(&c1, Corte::Dos, Decimal::from(100), Decimal::ZERO);
        let csv = to_csv(&consolidate(&[c1], &[d])).unwrap();
        let header = CSV_HEADER.join(",");
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(header.as_str()));
        assert_eq!(
            lines.next(),
            Some(
                "202504,LIMA,20100066603,\"Agencia, Centro\",GOLD,12,10,83.33%,1.50,1500.00,\
100.00,0.00,0.00,0.00,0.00,0.00,100.00,0.00,100.00,1400.00"
            )
        );
        assert_eq!(lines.next(), None);
        assert!(csv.ends_with('\n'));
        assert!(!csv.contains('\r'));
    }

    #[test]
    fn csv_quotes_embedded_quotes_and_line_breaks() {
        let mut c1 = cut1("20100066603", 1500);
        c1.agencia = "Agencia \"Sur\"\r\nAnexo".into();
        let csv = to_csv(&consolidate(&[c1], &[])).unwrap();
        assert!(csv.contains(",\"Agencia \"\"Sur\"\"\r\nAnexo\",GOLD,"));

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.len(), CSV_HEADER.len());
        assert_eq!(&record[3], "Agencia \"Sur\"\r\nAnexo");
    }

    #[test]
    fn superseded_cut_marks_review() {
        let c1 = cut1("20100066603", 1500);
        let mut d = discount(&c1, Corte::Dos, Decimal::ZERO, Decimal::ZERO);
        d.superseded = true;
        let rows = consolidate(&[c1], &[d]);
        assert!(rows[0].needs_review);
    }

    #[test]
    fn undefined_attainment_renders_empty() {
        assert_eq!(format_pct(None), "");
        assert_eq!(format_pct(Some(Decimal::new(835, 1))), "83.50%");
        assert_eq!(format_money(Decimal::new(9, 1)), "0.90");
    }
}

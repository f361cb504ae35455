//! Settlement stage calculators.
//!
//! Cut 1 computes the gross commission and the first installment.
//! Cuts 2..4 share one calculator: each re-validates against the
//! immediately prior cut, applies one churn penalty and one quota
//! clawback, and carries cumulative state forward.
//!
//! All amounts are rounded to 2 decimals at the point they are produced.

use crate::{
    aggregator::AgencyAggregate,
    config::EngineConfig,
    multiplier::{self, MultiplierInput},
    parameter_store::CommissionParameter,
    types::{Corte, SettlementKey, Tier},
};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};

/// Values a cut was computed from, compared by the following cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationInputs {
    pub altas: u32,
    pub recibos_pagados: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CutValidation {
    Validated,
    /// `expected` is what the prior cut persisted, `actual` the fresh re-derivation.
    Mismatched {
        expected: ValidationInputs,
        actual: ValidationInputs,
    },
}

impl CutValidation {
    pub fn compare(expected: ValidationInputs, actual: ValidationInputs) -> Self {
        if expected == actual {
            CutValidation::Validated
        } else {
            CutValidation::Mismatched { expected, actual }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CutValidation::Validated)
    }

    pub fn needs_review(&self) -> bool {
        !self.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cut1Settlement {
    pub key: SettlementKey,
    pub agencia: String,
    pub meta: u32,
    pub tier: Tier,
    pub altas: u32,
    pub precio_sin_igv_promedio: Decimal,
    pub cumplimiento_pct: Option<Decimal>,
    pub marcha_blanca: bool,
    pub bono_arpu: bool,
    pub multiplicador_base: Decimal,
    pub multiplicador_final: Decimal,
    pub comision_total: Decimal,
    /// First receipts paid as of the cut 1 date.
    pub recibos_pagados: u32,
    pub pago_corte_1: Decimal,
}

impl Cut1Settlement {
    pub fn validation_inputs(&self) -> ValidationInputs {
        ValidationInputs {
            altas: self.altas,
            recibos_pagados: self.recibos_pagados,
        }
    }
}

/// Row shape shared by cuts 2, 3 and 4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountCutSettlement {
    pub key: SettlementKey,
    pub corte: Corte,
    pub agencia: String,
    pub altas: u32,
    pub precio_sin_igv_promedio: Decimal,
    pub recibos_pagados: u32,
    pub recibos_no_pagados: u32,
    /// Unpaid receipts tolerated before the penalty applies.
    pub umbral_penalidad: u32,
    pub altas_penalizadas: u32,
    pub penalidad_monto: Decimal,
    /// Attainment counting only installs whose receipt is paid.
    pub cumplimiento_pct: Option<Decimal>,
    pub clawback_monto: Decimal,
    pub validacion: CutValidation,
    /// Gross commission released through this cut.
    pub liberado_acumulado: Decimal,
    pub total_a_pagar: Decimal,
    pub altas_penalizadas_acumuladas: u32,
    pub clawback_acumulado: Decimal,
    /// An earlier cut was re-run after this row was computed.
    #[serde(default)]
    pub superseded: bool,
}

impl DiscountCutSettlement {
    pub fn needs_review(&self) -> bool {
        self.superseded || self.validacion.needs_review()
    }

    pub fn validation_inputs(&self) -> ValidationInputs {
        ValidationInputs {
            altas: self.altas,
            recibos_pagados: self.recibos_pagados,
        }
    }
}

/// The immediately prior cut's persisted row.
#[derive(Debug, Clone, Copy)]
pub enum PriorCut<'a> {
    Cut1(&'a Cut1Settlement),
    Discount(&'a DiscountCutSettlement),
}

impl PriorCut<'_> {
    pub fn corte(&self) -> Corte {
        match self {
            PriorCut::Cut1(_) => Corte::Uno,
            PriorCut::Discount(d) => d.corte,
        }
    }

    fn validation_inputs(&self) -> ValidationInputs {
        match self {
            PriorCut::Cut1(c) => c.validation_inputs(),
            PriorCut::Discount(d) => d.validation_inputs(),
        }
    }

    fn liberado_acumulado(&self) -> Decimal {
        match self {
            PriorCut::Cut1(c) => c.pago_corte_1,
            PriorCut::Discount(d) => d.liberado_acumulado,
        }
    }

    fn altas_penalizadas_acumuladas(&self) -> u32 {
        match self {
            PriorCut::Cut1(_) => 0,
            PriorCut::Discount(d) => d.altas_penalizadas_acumuladas,
        }
    }

    fn clawback_acumulado(&self) -> Decimal {
        match self {
            PriorCut::Cut1(_) => Decimal::ZERO,
            PriorCut::Discount(d) => d.clawback_acumulado,
        }
    }
}

pub fn compute_cut1(
    key: SettlementKey,
    param: &CommissionParameter,
    aggregate: &AgencyAggregate,
    config: &EngineConfig,
) -> Cut1Settlement {
    let bono_arpu = multiplier::arpu_bonus_eligible(aggregate.precio_sin_igv_promedio, config);
    let resolution = multiplier::resolve(
        &MultiplierInput {
            meta: param.meta,
            altas: aggregate.altas,
            tier: param.tier,
            marcha_blanca: param.marcha_blanca,
            bono_arpu,
        },
        config,
    );

    let comision_total = (Decimal::from(aggregate.altas)
        * aggregate.precio_sin_igv_promedio
        * resolution.multiplicador_final)
        .round_dp(2);
    let pago_corte_1 = (comision_total * config.payment_fraction(Corte::Uno)).round_dp(2);

    Cut1Settlement {
        key,
        agencia: aggregate.agencia.clone(),
        meta: param.meta,
        tier: param.tier,
        altas: aggregate.altas,
        precio_sin_igv_promedio: aggregate.precio_sin_igv_promedio,
        cumplimiento_pct: resolution.cumplimiento_pct,
        marcha_blanca: param.marcha_blanca,
        bono_arpu,
        multiplicador_base: resolution.multiplicador_base,
        multiplicador_final: resolution.multiplicador_final,
        comision_total,
        recibos_pagados: aggregate.recibos(Corte::Uno).pagados,
        pago_corte_1,
    }
}

/// Compute cut 2, 3 or 4 for one agency.
///
/// `aggregate` is the fresh re-aggregation (zero when the agency has no
/// qualifying records any more). Fresh values always drive the result;
/// disagreement with `prior` only marks the row for review.
///
/// The commission base (clawback target and released amount) is always the
/// persisted Cut 1 `comision_total`, even on a mismatched row. Re-running
/// Cut 1 is how a corrected base reaches the later cuts.
pub fn compute_discount_cut(
    corte: Corte,
    cut1: &Cut1Settlement,
    prior: PriorCut<'_>,
    aggregate: &AgencyAggregate,
    config: &EngineConfig,
) -> DiscountCutSettlement {
    debug_assert_eq!(corte.previous(), Some(prior.corte()));

    let validacion = CutValidation::compare(
        prior.validation_inputs(),
        ValidationInputs {
            altas: aggregate.altas,
            recibos_pagados: aggregate.recibos(prior.corte()).pagados,
        },
    );

    let altas = aggregate.altas;
    let precio = aggregate.precio_sin_igv_promedio;
    let recibos = aggregate.recibos(corte);

    // Penalty: only unpaid receipts beyond the tolerance band, net of
    // installs already penalized at earlier cuts.
    let churn_pct = config.churn_threshold_pct.for_cut(corte).unwrap_or(Decimal::ZERO);
    let umbral_penalidad = (Decimal::from(altas) * churn_pct / Decimal::ONE_HUNDRED)
        .floor()
        .to_u32()
        .unwrap_or(0);
    let excedente = recibos.no_pagados.saturating_sub(umbral_penalidad);
    let altas_penalizadas = excedente.saturating_sub(prior.altas_penalizadas_acumuladas());
    let penalidad_monto = (Decimal::from(altas_penalizadas) * precio).round_dp(2);

    // Clawback: attainment on paying installs against the cut minimum.
    let cumplimiento_pct =
        multiplier::attainment_pct(altas.saturating_sub(recibos.no_pagados), cut1.meta);
    let clawback_target = match (
        cumplimiento_pct,
        config.quota_clawback_threshold_pct.for_cut(corte),
    ) {
        (Some(pct), Some(umbral)) if umbral > Decimal::ZERO && pct < umbral => {
            let factor = pct / umbral;
            (cut1.comision_total * (Decimal::ONE - factor)).round_dp(2)
        }
        _ => Decimal::ZERO,
    };
    let clawback_monto = (clawback_target - prior.clawback_acumulado()).max(Decimal::ZERO);

    let liberado_acumulado =
        (cut1.comision_total * config.cumulative_payment_fraction(corte)).round_dp(2);
    let total_a_pagar =
        liberado_acumulado - prior.liberado_acumulado() - penalidad_monto - clawback_monto;

    DiscountCutSettlement {
        key: cut1.key.clone(),
        corte,
        agencia: cut1.agencia.clone(),
        altas,
        precio_sin_igv_promedio: precio,
        recibos_pagados: recibos.pagados,
        recibos_no_pagados: recibos.no_pagados,
        umbral_penalidad,
        altas_penalizadas,
        penalidad_monto,
        cumplimiento_pct,
        clawback_monto,
        validacion,
        liberado_acumulado,
        total_a_pagar,
        altas_penalizadas_acumuladas: prior.altas_penalizadas_acumuladas() + altas_penalizadas,
        clawback_acumulado: prior.clawback_acumulado() + clawback_monto,
        superseded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ReceiptStatus;
    use crate::types::{Periodo, Zona};

    const RUC: &str = "20100066603";

    fn key() -> SettlementKey {
        SettlementKey::new(Periodo::new(2025, 4).unwrap(), Zona::Lima, RUC)
    }

    fn param(meta: u32) -> CommissionParameter {
        CommissionParameter {
            ruc: RUC.into(),
            periodo: Periodo::new(2025, 4).unwrap(),
            zona: Zona::Lima,
            meta,
            tier: Tier::Gold,
            marcha_blanca: false,
        }
    }

    /// `unpaid[i]` = unpaid receipts as measured at cut i + 1.
    fn aggregate(altas: u32, precio: i64, unpaid: [u32; 4]) -> AgencyAggregate {
        let mut a = AgencyAggregate::zero(RUC);
        a.agencia = "Agencia Norte".into();
        a.altas = altas;
        a.altas_con_precio = altas;
        a.precio_sin_igv_promedio = Decimal::from(precio);
        for (i, u) in unpaid.iter().enumerate() {
            a.recibos[i] = ReceiptStatus { pagados: altas - u, no_pagados: *u };
        }
        a
    }

    #[test]
    fn cut1_gross_commission_and_first_installment() {
        let cfg = EngineConfig::default_test();
        let c1 = compute_cut1(key(), &param(12), &aggregate(10, 100, [10, 2, 2, 2]), &cfg);
        assert_eq!(c1.multiplicador_final, Decimal::new(15, 1));
        assert_eq!(c1.comision_total, Decimal::new(150000, 2));
        assert_eq!(c1.pago_corte_1, Decimal::new(90000, 2));
        assert_eq!(c1.recibos_pagados, 0);
        assert!(!c1.bono_arpu);
    }

    #[test]
    fn cut2_penalizes_only_excess_over_tolerance() {
        let mut cfg = EngineConfig::default_test();
        cfg.quota_clawback_threshold_pct.corte_2 = Decimal::from(60);
        let agg = aggregate(10, 100, [10, 2, 2, 2]);
        let c1 = compute_cut1(key(), &param(12), &agg, &cfg);

        let c2 = compute_discount_cut(Corte::Dos, &c1, PriorCut::Cut1(&c1), &agg, &cfg);
        assert_eq!(c2.umbral_penalidad, 1);
        assert_eq!(c2.altas_penalizadas, 1);
        assert_eq!(c2.penalidad_monto, Decimal::from(100));
        // (10 - 2) / 12 = 66.67% >= 60% → no clawback.
        assert_eq!(c2.clawback_monto, Decimal::ZERO);
        assert!(c2.validacion.is_ok());
        // 1500 - 900 - 100
        assert_eq!(c2.total_a_pagar, Decimal::from(500));
        assert_eq!(c2.liberado_acumulado, Decimal::from(1500));
    }

    #[test]
    fn clawback_scales_commission_by_attainment_shortfall() {
        let cfg = EngineConfig::default_test();
        let agg = aggregate(10, 100, [10, 3, 3, 3]);
        let c1 = compute_cut1(key(), &param(10), &agg, &cfg);
        assert_eq!(c1.comision_total, Decimal::from(2000));

        let c2 = compute_discount_cut(Corte::Dos, &c1, PriorCut::Cut1(&c1), &agg, &cfg);
        // (10 - 3) / 10 = 70% is not below 70%.
        assert_eq!(c2.clawback_monto, Decimal::ZERO);

        let agg = aggregate(10, 100, [10, 4, 4, 4]);
        let c2 = compute_discount_cut(Corte::Dos, &c1, PriorCut::Cut1(&c1), &agg, &cfg);
        // 60 / 70 of the commission is kept: 2000 * (1 - 6/7) = 285.71
        assert_eq!(c2.cumplimiento_pct, Some(Decimal::from(60)));
        assert_eq!(c2.clawback_monto, Decimal::new(28571, 2));
        assert_eq!(c2.clawback_acumulado, Decimal::new(28571, 2));
    }

    #[test]
    fn later_cuts_carry_forward_penalties_and_clawbacks() {
        let cfg = EngineConfig::default_test();
        let agg = aggregate(10, 100, [10, 4, 4, 5]);
        let c1 = compute_cut1(key(), &param(10), &agg, &cfg);
        let c2 = compute_discount_cut(Corte::Dos, &c1, PriorCut::Cut1(&c1), &agg, &cfg);
        let c3 = compute_discount_cut(Corte::Tres, &c1, PriorCut::Discount(&c2), &agg, &cfg);
        let c4 = compute_discount_cut(Corte::Cuatro, &c1, PriorCut::Discount(&c3), &agg, &cfg);

        // cut 2: tolerance 1, 3 penalized. cut 3: tolerance floor(0.35) = 0,
        // 4 in excess, 3 already penalized → 1 more. cut 4: 5 - 4 = 1 more.
        assert_eq!(c2.altas_penalizadas, 3);
        assert_eq!(c3.altas_penalizadas, 1);
        assert_eq!(c4.altas_penalizadas, 1);
        assert_eq!(c4.altas_penalizadas_acumuladas, 5);

        // Same attainment at cut 3 → nothing new to claw back.
        assert_eq!(c3.clawback_monto, Decimal::ZERO);
        // Attainment drops to 50% at cut 4: target 2000 * (1 - 5/7) = 571.43.
        assert_eq!(c4.clawback_monto, Decimal::new(57143, 2) - c2.clawback_monto);
        assert_eq!(c4.clawback_acumulado, Decimal::new(57143, 2));

        // Nothing further released after cut 2; later cuts only deduct.
        assert_eq!(c3.total_a_pagar, -c3.penalidad_monto);
        assert_eq!(c4.total_a_pagar, -(c4.penalidad_monto + c4.clawback_monto));
    }

    #[test]
    fn mismatch_is_flagged_and_fresh_values_used() {
        let mut cfg = EngineConfig::default_test();
        cfg.quota_clawback_threshold_pct.corte_2 = Decimal::ZERO;
        let persisted = aggregate(10, 100, [10, 2, 2, 2]);
        let c1 = compute_cut1(key(), &param(12), &persisted, &cfg);

        let fresh = aggregate(12, 100, [12, 3, 3, 3]);
        let c2 = compute_discount_cut(Corte::Dos, &c1, PriorCut::Cut1(&c1), &fresh, &cfg);
        assert_eq!(
            c2.validacion,
            CutValidation::Mismatched {
                expected: ValidationInputs { altas: 10, recibos_pagados: 0 },
                actual: ValidationInputs { altas: 12, recibos_pagados: 0 },
            }
        );
        assert!(c2.validacion.needs_review());
        assert_eq!(c2.altas, 12);
        // tolerance floor(12 * 10%) = 1 → 2 penalized.
        assert_eq!(c2.altas_penalizadas, 2);
        // Released amount still scales the persisted cut 1 commission.
        let fraction = cfg.cumulative_payment_fraction(Corte::Dos);
        assert_eq!(c2.liberado_acumulado, (c1.comision_total * fraction).round_dp(2));
    }

    #[test]
    fn zero_quota_never_claws_back() {
        let cfg = EngineConfig::default_test();
        let agg = aggregate(10, 100, [10, 9, 9, 9]);
        let c1 = compute_cut1(key(), &param(0), &agg, &cfg);
        assert_eq!(c1.cumplimiento_pct, None);
        assert_eq!(c1.multiplicador_final, cfg.default_multiplier);

        let c2 = compute_discount_cut(Corte::Dos, &c1, PriorCut::Cut1(&c1), &agg, &cfg);
        assert_eq!(c2.cumplimiento_pct, None);
        assert_eq!(c2.clawback_monto, Decimal::ZERO);
    }

    #[test]
    fn vanished_agency_is_zero_activity() {
        let cfg = EngineConfig::default_test();
        let agg = aggregate(10, 100, [10, 2, 2, 2]);
        let c1 = compute_cut1(key(), &param(12), &agg, &cfg);
        let c2 = compute_discount_cut(
            Corte::Dos,
            &c1,
            PriorCut::Cut1(&c1),
            &AgencyAggregate::zero(RUC),
            &cfg,
        );
        assert!(c2.validacion.needs_review());
        assert_eq!(c2.penalidad_monto, Decimal::ZERO);
        assert_eq!(c2.agencia, "Agencia Norte");
    }
}

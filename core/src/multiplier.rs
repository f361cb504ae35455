//! Multiplier & tier resolver.
//!
//! base  = ramp-up multiplier for agencies in marcha blanca, otherwise the
//!         first configured band matching (tier, attainment), otherwise the
//!         default multiplier.
//! final = base + ARPU bonus when eligible.

use crate::{config::EngineConfig, types::Tier};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiplierInput {
    pub meta: u32,
    pub altas: u32,
    pub tier: Tier,
    pub marcha_blanca: bool,
    pub bono_arpu: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiplierResolution {
    /// `None` when the quota is zero.
    pub cumplimiento_pct: Option<Decimal>,
    pub multiplicador_base: Decimal,
    pub multiplicador_final: Decimal,
}

/// Quota attainment in percent, rounded to 2 decimals. Undefined for meta 0.
pub fn attainment_pct(altas: u32, meta: u32) -> Option<Decimal> {
    if meta == 0 {
        return None;
    }
    Some((Decimal::from(altas) / Decimal::from(meta) * Decimal::ONE_HUNDRED).round_dp(2))
}

/// ARPU bonus eligibility from the agency's average ex-tax price.
pub fn arpu_bonus_eligible(precio_sin_igv_promedio: Decimal, config: &EngineConfig) -> bool {
    config
        .arpu_bonus_min_price
        .map_or(false, |min| precio_sin_igv_promedio >= min)
}

pub fn resolve(input: &MultiplierInput, config: &EngineConfig) -> MultiplierResolution {
    let cumplimiento_pct = attainment_pct(input.altas, input.meta);

    let multiplicador_base = if input.marcha_blanca {
        config.ramp_up_multiplier
    } else {
        cumplimiento_pct
            .and_then(|pct| {
                config
                    .tier_band_table
                    .iter()
                    .find(|band| band.matches(input.tier, pct))
            })
            .map_or(config.default_multiplier, |band| band.multiplier)
    };

    let bonus = if input.bono_arpu {
        config.arpu_bonus_amount
    } else {
        Decimal::ZERO
    };

    MultiplierResolution {
        cumplimiento_pct,
        multiplicador_base,
        multiplicador_final: multiplicador_base + bonus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(meta: u32, altas: u32, tier: Tier) -> MultiplierInput {
        MultiplierInput {
            meta,
            altas,
            tier,
            marcha_blanca: false,
            bono_arpu: false,
        }
    }

    #[test]
    fn gold_band_lookup() {
        let cfg = EngineConfig::default_test();
        // 10 / 12 = 83.33% → GOLD 70..100 band.
        let r = resolve(&input(12, 10, Tier::Gold), &cfg);
        assert_eq!(r.cumplimiento_pct, Some(Decimal::new(8333, 2)));
        assert_eq!(r.multiplicador_base, Decimal::new(15, 1));
        assert_eq!(r.multiplicador_final, Decimal::new(15, 1));
    }

    #[test]
    fn band_lower_bound_inclusive_upper_exclusive() {
        let cfg = EngineConfig::default_test();
        let base = |meta, altas| resolve(&input(meta, altas, Tier::Gold), &cfg).multiplicador_base;
        assert_eq!(base(10, 7), Decimal::new(15, 1));
        assert_eq!(base(10, 10), Decimal::new(20, 1));
    }

    #[test]
    fn zero_quota_is_undefined_and_defaults() {
        let cfg = EngineConfig::default_test();
        let r = resolve(&input(0, 10, Tier::Gold), &cfg);
        assert_eq!(r.cumplimiento_pct, None);
        assert_eq!(r.multiplicador_base, cfg.default_multiplier);
    }

    #[test]
    fn unmatched_band_falls_back_to_default() {
        let cfg = EngineConfig::default_test();
        // The REGULAR table stops at 100%.
        let r = resolve(&input(10, 15, Tier::Regular), &cfg);
        assert_eq!(r.multiplicador_base, Decimal::new(13, 1));
    }

    #[test]
    fn marcha_blanca_overrides_band() {
        let cfg = EngineConfig::default_test();
        let mut i = input(10, 1, Tier::Silver);
        i.marcha_blanca = true;
        let r = resolve(&i, &cfg);
        assert_eq!(r.multiplicador_base, Decimal::new(25, 1));
        assert_eq!(r.cumplimiento_pct, Some(Decimal::from(10)));
    }

    #[test]
    fn arpu_bonus_adds_flat_amount() {
        let cfg = EngineConfig::default_test();
        let mut i = input(12, 10, Tier::Gold);
        i.bono_arpu = true;
        i.marcha_blanca = true;
        let r = resolve(&i, &cfg);
        assert_eq!(r.multiplicador_final, Decimal::new(35, 1));
    }

    #[test]
    fn arpu_eligibility_needs_configured_minimum() {
        let mut cfg = EngineConfig::default_test();
        assert!(!arpu_bonus_eligible(Decimal::from(500), &cfg));
        cfg.arpu_bonus_min_price = Some(Decimal::from(80));
        assert!(arpu_bonus_eligible(Decimal::from(80), &cfg));
        assert!(!arpu_bonus_eligible(Decimal::new(7999, 2), &cfg));
    }
}

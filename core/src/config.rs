use crate::{
    error::{SettlementError, SettlementResult},
    types::{Corte, Tier},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of the operator-maintained multiplier table.
/// `min_pct` is inclusive, `max_pct` exclusive; `None` means open-ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierBand {
    pub tier: Tier,
    pub min_pct: Decimal,
    #[serde(default)]
    pub max_pct: Option<Decimal>,
    pub multiplier: Decimal,
}

impl TierBand {
    pub fn matches(&self, tier: Tier, pct: Decimal) -> bool {
        self.tier == tier
            && pct >= self.min_pct
            && self.max_pct.map_or(true, |max| pct < max)
    }
}

/// Per-cut thresholds for the discount cuts (2, 3 and 4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountThresholds {
    pub corte_2: Decimal,
    pub corte_3: Decimal,
    pub corte_4: Decimal,
}

impl DiscountThresholds {
    /// Threshold for a discount cut. Cut 1 has none.
    pub fn for_cut(&self, corte: Corte) -> Option<Decimal> {
        match corte {
            Corte::Uno    => None,
            Corte::Dos    => Some(self.corte_2),
            Corte::Tres   => Some(self.corte_3),
            Corte::Cuatro => Some(self.corte_4),
        }
    }

    fn all(&self) -> [Decimal; 3] {
        [self.corte_2, self.corte_3, self.corte_4]
    }
}

/// All business parameters of the settlement calculation.
/// Nothing in the calculators hardcodes these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub tier_band_table: Vec<TierBand>,
    /// Used when no band matches or attainment is undefined.
    pub default_multiplier: Decimal,
    /// Fixed base multiplier for agencies in marcha blanca.
    pub ramp_up_multiplier: Decimal,
    pub arpu_bonus_amount: Decimal,
    /// Average ex-tax price from which an agency earns the ARPU bonus.
    /// `None` disables the bonus.
    #[serde(default)]
    pub arpu_bonus_min_price: Option<Decimal>,
    /// Tolerated unpaid receipts, as a % of altas.
    pub churn_threshold_pct: DiscountThresholds,
    /// Minimum quota attainment % below which a clawback applies.
    pub quota_clawback_threshold_pct: DiscountThresholds,
    /// Fraction of the gross commission released at each cut (1..=4).
    pub payment_fractions: [Decimal; 4],
    pub igv_rate: Decimal,
    /// Channel that qualifies a LIMA sale.
    pub lima_channel: String,
    /// Months after the period start at which each cut is measured.
    pub cut_as_of_offset_months: [u32; 4],
}

impl EngineConfig {
    /// Load from a JSON file. In tests, use EngineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SettlementResult<()> {
        let hundred = Decimal::ONE_HUNDRED;

        let fraction_sum: Decimal = self.payment_fractions.iter().sum();
        let negative = self.payment_fractions.iter().any(|f| f.is_sign_negative());
        if negative || fraction_sum > Decimal::ONE {
            return Err(SettlementError::InvalidConfig(format!(
                "payment_fractions must be non-negative and sum to at most 1 (sum = {fraction_sum})"
            )));
        }

        for pct in self
            .churn_threshold_pct
            .all()
            .into_iter()
            .chain(self.quota_clawback_threshold_pct.all())
        {
            if pct.is_sign_negative() || pct > hundred {
                return Err(SettlementError::InvalidConfig(format!(
                    "threshold {pct} is outside 0..=100"
                )));
            }
        }

        for band in &self.tier_band_table {
            if let Some(max) = band.max_pct {
                if max <= band.min_pct {
                    return Err(SettlementError::InvalidConfig(format!(
                        "band for {} has max_pct {max} <= min_pct {}",
                        band.tier, band.min_pct
                    )));
                }
            }
        }

        if self.cut_as_of_offset_months.windows(2).any(|w| w[1] < w[0]) {
            return Err(SettlementError::InvalidConfig(
                "cut_as_of_offset_months must be non-decreasing".into(),
            ));
        }

        if self.igv_rate.is_sign_negative() {
            return Err(SettlementError::InvalidConfig("igv_rate must be >= 0".into()));
        }

        Ok(())
    }

    pub fn payment_fraction(&self, corte: Corte) -> Decimal {
        self.payment_fractions[corte.index()]
    }

    /// Sum of the fractions released up to and including `corte`.
    pub fn cumulative_payment_fraction(&self, corte: Corte) -> Decimal {
        self.payment_fractions[..=corte.index()].iter().sum()
    }

    pub fn as_of_offset(&self, corte: Corte) -> u32 {
        self.cut_as_of_offset_months[corte.index()]
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let band = |tier, min: i64, max: Option<i64>, mult: Decimal| TierBand {
            tier,
            min_pct: Decimal::from(min),
            max_pct: max.map(Decimal::from),
            multiplier: mult,
        };

        Self {
            tier_band_table: vec![
                band(Tier::Gold, 0, Some(70), Decimal::new(10, 1)),
                band(Tier::Gold, 70, Some(100), Decimal::new(15, 1)),
                band(Tier::Gold, 100, None, Decimal::new(20, 1)),
                band(Tier::Silver, 0, Some(70), Decimal::new(8, 1)),
                band(Tier::Silver, 70, Some(100), Decimal::new(12, 1)),
                band(Tier::Silver, 100, None, Decimal::new(17, 1)),
                band(Tier::Regular, 0, Some(100), Decimal::new(10, 1)),
            ],
            default_multiplier: Decimal::new(13, 1),
            ramp_up_multiplier: Decimal::new(25, 1),
            arpu_bonus_amount: Decimal::ONE,
            arpu_bonus_min_price: None,
            churn_threshold_pct: DiscountThresholds {
                corte_2: Decimal::from(10),
                corte_3: Decimal::new(35, 1),
                corte_4: Decimal::new(35, 1),
            },
            quota_clawback_threshold_pct: DiscountThresholds {
                corte_2: Decimal::from(70),
                corte_3: Decimal::from(70),
                corte_4: Decimal::from(70),
            },
            payment_fractions: [
                Decimal::new(6, 1),
                Decimal::new(4, 1),
                Decimal::ZERO,
                Decimal::ZERO,
            ],
            igv_rate: Decimal::new(18, 2),
            lima_channel: "Agencias".into(),
            cut_as_of_offset_months: [1, 2, 3, 4],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_test_config_is_valid() {
        EngineConfig::default_test().validate().unwrap();
    }

    #[test]
    fn fractions_over_one_rejected() {
        let mut cfg = EngineConfig::default_test();
        cfg.payment_fractions[2] = Decimal::new(1, 1);
        assert!(matches!(cfg.validate(), Err(SettlementError::InvalidConfig(_))));
    }

    #[test]
    fn inverted_band_rejected() {
        let mut cfg = EngineConfig::default_test();
        cfg.tier_band_table[0].max_pct = Some(Decimal::ZERO);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cumulative_fraction_at_cut_2_is_total_release() {
        let cfg = EngineConfig::default_test();
        assert_eq!(cfg.cumulative_payment_fraction(Corte::Uno), Decimal::new(6, 1));
        assert_eq!(cfg.cumulative_payment_fraction(Corte::Dos), Decimal::ONE);
        assert_eq!(cfg.cumulative_payment_fraction(Corte::Cuatro), Decimal::ONE);
    }

    #[test]
    fn config_parses_from_json() {
        let json = r#"{
            "tier_band_table": [
                {"tier": "GOLD", "min_pct": 70, "max_pct": 100, "multiplier": 1.5},
                {"tier": "NO ES TOP", "min_pct": 0, "multiplier": 1.0}
            ],
            "default_multiplier": 1.3,
            "ramp_up_multiplier": 2.5,
            "arpu_bonus_amount": 1.0,
            "arpu_bonus_min_price": 80.0,
            "churn_threshold_pct": {"corte_2": 10, "corte_3": 3.5, "corte_4": 3.5},
            "quota_clawback_threshold_pct": {"corte_2": 70, "corte_3": 70, "corte_4": 70},
            "payment_fractions": [0.6, 0.4, 0, 0],
            "igv_rate": 0.18,
            "lima_channel": "Agencias",
            "cut_as_of_offset_months": [1, 2, 3, 4]
        }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.tier_band_table[1].tier, Tier::Regular);
        assert_eq!(cfg.tier_band_table[1].max_pct, None);
        assert_eq!(cfg.arpu_bonus_min_price, Some(Decimal::from(80)));
    }
}

//! Per-agency, per-period commission parameters. Pure lookup, no computation.

use crate::{
    error::{SettlementError, SettlementResult},
    types::{Periodo, Ruc, Tier, Zona},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommissionParameter {
    pub ruc: Ruc,
    pub periodo: Periodo,
    pub zona: Zona,
    /// Sales quota in installs.
    pub meta: u32,
    pub tier: Tier,
    /// New agency in ramp-up.
    #[serde(default)]
    pub marcha_blanca: bool,
}

#[derive(Debug, Default)]
pub struct ParameterStore {
    by_key: HashMap<(Ruc, Periodo), CommissionParameter>,
}

impl ParameterStore {
    /// Build the lookup. A repeated (ruc, periodo) key is rejected.
    pub fn from_rows(rows: Vec<CommissionParameter>) -> SettlementResult<Self> {
        let mut by_key = HashMap::with_capacity(rows.len());
        for row in rows {
            let key = (row.ruc.clone(), row.periodo);
            if by_key.contains_key(&key) {
                return Err(SettlementError::DuplicateParameter {
                    ruc: row.ruc,
                    periodo: row.periodo.as_u32(),
                });
            }
            by_key.insert(key, row);
        }
        Ok(Self { by_key })
    }

    pub fn get(&self, ruc: &str, periodo: Periodo) -> Option<&CommissionParameter> {
        self.by_key.get(&(ruc.to_string(), periodo))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(ruc: &str, meta: u32) -> CommissionParameter {
        CommissionParameter {
            ruc: ruc.into(),
            periodo: Periodo::new(2025, 4).unwrap(),
            zona: Zona::Lima,
            meta,
            tier: Tier::Gold,
            marcha_blanca: false,
        }
    }

    #[test]
    fn lookup_by_ruc_and_period() {
        let rows = vec![param("20100066603", 12), param("20500000001", 5)];
        let store = ParameterStore::from_rows(rows).unwrap();
        let p = Periodo::new(2025, 4).unwrap();
        assert_eq!(store.get("20100066603", p).map(|r| r.meta), Some(12));
        assert!(store.get("20100066603", Periodo::new(2025, 5).unwrap()).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn duplicate_key_rejected() {
        let rows = vec![param("20100066603", 12), param("20100066603", 15)];
        let err = ParameterStore::from_rows(rows).unwrap_err();
        assert!(matches!(err, SettlementError::DuplicateParameter { periodo: 202504, .. }));
    }
}

//! Transaction aggregator. Groups validated installs by agency for one
//! (zone, period) batch.
//!
//! Filter: validated, installed within [period start, period end), in the
//! requested zone, and for LIMA sold through the configured channel.
//! Agencies without matching records are absent from the output; callers
//! treat absence as zero activity.

use crate::{
    config::EngineConfig,
    sale::SaleRecord,
    types::{Corte, Periodo, Ruc, Zona},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptStatus {
    pub pagados: u32,
    pub no_pagados: u32,
}

/// Immutable per-agency aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencyAggregate {
    pub ruc: Ruc,
    pub agencia: String,
    /// Distinct order ids.
    pub altas: u32,
    pub precio_sin_igv_promedio: Decimal,
    /// Installs that carried a price.
    pub altas_con_precio: u32,
    /// Receipt status as measured at each cut.
    pub recibos: [ReceiptStatus; 4],
}

impl AgencyAggregate {
    pub fn zero(ruc: &str) -> Self {
        Self {
            ruc: ruc.to_string(),
            agencia: String::new(),
            altas: 0,
            precio_sin_igv_promedio: Decimal::ZERO,
            altas_con_precio: 0,
            recibos: [ReceiptStatus::default(); 4],
        }
    }

    pub fn recibos(&self, corte: Corte) -> ReceiptStatus {
        self.recibos[corte.index()]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub agencies: BTreeMap<Ruc, AgencyAggregate>,
    /// Records dropped because they were malformed (no RUC or order id).
    pub skipped_records: usize,
    /// Records that passed the filter.
    pub matched_records: usize,
}

impl Aggregation {
    pub fn get(&self, ruc: &str) -> Option<&AgencyAggregate> {
        self.agencies.get(ruc)
    }

    /// Aggregate for `ruc`, or a zero-activity aggregate when absent.
    pub fn get_or_zero(&self, ruc: &str) -> AgencyAggregate {
        self.agencies
            .get(ruc)
            .cloned()
            .unwrap_or_else(|| AgencyAggregate::zero(ruc))
    }
}

#[derive(Default)]
struct AgencyFold {
    agencia: String,
    orders: HashSet<String>,
    price_sum: Decimal,
    priced: u32,
    recibos: [ReceiptStatus; 4],
}

pub fn aggregate(
    records: &[SaleRecord],
    zona: Zona,
    periodo: Periodo,
    config: &EngineConfig,
) -> Aggregation {
    let igv_divisor = Decimal::ONE + config.igv_rate;
    let as_of: Vec<_> = Corte::ALL
        .iter()
        .map(|c| periodo.plus_months(config.as_of_offset(*c)))
        .collect();

    let mut skipped_records = 0usize;
    let mut matched_records = 0usize;

    let folds = records
        .iter()
        .filter(|r| r.zona == zona && r.is_validated() && r.installed_within(periodo))
        .filter(|r| zona != Zona::Lima || r.canal == config.lima_channel)
        .fold(BTreeMap::<Ruc, AgencyFold>::new(), |mut acc, r| {
            let ruc = r.ruc.trim();
            let order_id = r.order_id.trim();
            if ruc.is_empty() || order_id.is_empty() {
                log::warn!("skipping sale with missing ruc/order id (order {:?})", r.order_id);
                skipped_records += 1;
                return acc;
            }
            matched_records += 1;

            let fold = acc.entry(ruc.to_string()).or_default();
            // Repeated order ids count once; the first occurrence wins.
            if !fold.orders.insert(order_id.to_string()) {
                return acc;
            }
            if fold.agencia.is_empty() {
                fold.agencia = r.agencia.clone();
            }
            if let Some(price) = r.precio_con_igv {
                fold.price_sum += price / igv_divisor;
                fold.priced += 1;
            }
            for corte in Corte::ALL {
                let status = &mut fold.recibos[corte.index()];
                if r.receipt_paid_before(corte.receipt_cycle(), as_of[corte.index()]) {
                    status.pagados += 1;
                } else {
                    status.no_pagados += 1;
                }
            }
            acc
        });

    let agencies = folds
        .into_iter()
        .map(|(ruc, fold)| {
            let precio = if fold.priced > 0 {
                (fold.price_sum / Decimal::from(fold.priced)).round_dp(2)
            } else {
                Decimal::ZERO
            };
            let aggregate = AgencyAggregate {
                ruc: ruc.clone(),
                agencia: fold.agencia,
                altas: fold.orders.len() as u32,
                precio_sin_igv_promedio: precio,
                altas_con_precio: fold.priced,
                recibos: fold.recibos,
            };
            (ruc, aggregate)
        })
        .collect();

    Aggregation {
        agencies,
        skipped_records,
        matched_records,
    }
}

//! Sale records as delivered by ingestion. The engine never mutates them.

use crate::types::{Periodo, Ruc, Zona};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of billing cycles tracked per installation.
pub const RECEIPT_CYCLES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleRecord {
    pub order_id: String,
    /// RUC of the selling agency.
    pub ruc: Ruc,
    #[serde(default)]
    pub agencia: String,
    pub zona: Zona,
    pub fecha_venta: NaiveDate,
    #[serde(default)]
    pub fecha_validacion: Option<NaiveDate>,
    #[serde(default)]
    pub fecha_instalacion: Option<NaiveDate>,
    /// Gross price including IGV.
    #[serde(default)]
    pub precio_con_igv: Option<Decimal>,
    pub canal: String,
    pub estado: String,
    /// Payment date of the receipt for billing cycles 1..=3.
    #[serde(default)]
    pub recibos_pagados: [Option<NaiveDate>; RECEIPT_CYCLES],
    pub periodo: Periodo,
}

impl SaleRecord {
    pub fn is_validated(&self) -> bool {
        self.fecha_validacion.is_some()
    }

    pub fn installed_within(&self, periodo: Periodo) -> bool {
        self.fecha_instalacion.map_or(false, |d| periodo.contains(d))
    }

    /// Whether the receipt of `cycle` (1-based) was paid strictly before `as_of`.
    pub fn receipt_paid_before(&self, cycle: usize, as_of: NaiveDate) -> bool {
        cycle
            .checked_sub(1)
            .and_then(|i| self.recibos_pagados.get(i).copied().flatten())
            .map_or(false, |paid| paid < as_of)
    }
}

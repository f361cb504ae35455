//! Run audit log. Everything an operator needs to review a cut run.
//!
//! Every run appends its events to settlement_event_log, in emission order.

use crate::{
    settlement::ValidationInputs,
    types::{Corte, Periodo, Ruc, RunId, Zona},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Aggregated agency has no commission parameter for the period.
    MissingParameter,
    /// Agency appears in the fresh aggregation but the prior cut has no row for it.
    MissingPriorCut,
}

/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEvent {
    CutStarted {
        corte: Corte,
        periodo: Periodo,
        zona: Zona,
    },
    ValidationMismatch {
        corte: Corte,
        ruc: Ruc,
        expected: ValidationInputs,
        actual: ValidationInputs,
    },
    AgencySkipped {
        corte: Corte,
        ruc: Ruc,
        reason: SkipReason,
    },
    CutCompleted {
        corte: Corte,
        rows_written: usize,
        flagged: usize,
        skipped: usize,
    },
    /// Re-running `corte` invalidated the completed runs of later cuts.
    LaterCutsSuperseded {
        corte: Corte,
        superseded: Vec<Corte>,
    },
}

impl SettlementEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            SettlementEvent::CutStarted { .. }         => "cut_started",
            SettlementEvent::ValidationMismatch { .. } => "validation_mismatch",
            SettlementEvent::AgencySkipped { .. }      => "agency_skipped",
            SettlementEvent::CutCompleted { .. }       => "cut_completed",
            SettlementEvent::LaterCutsSuperseded { .. } => "later_cuts_superseded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub corte: Corte,
    pub event_type: String,
    pub payload: String,
}

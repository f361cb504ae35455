//! The settlement engine: runs one cut for one (periodo, zona) batch.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Prior-cut guard     (Cut N+1 needs a completed Cut N run)
//!   2. Aggregation         (fresh, from sale records)
//!   3. Calculation         (pure, per agency)
//!   4. Persistence         (one transaction: rows, events, completion)
//!
//! RULES:
//!   - Calculators never touch the store.
//!   - A failed cut leaves no rows and no completion record behind.
//!   - Every skip and mismatch is recorded in the event log.
//!   - Re-running a cut supersedes every later cut; those must be re-run in order.

use crate::{
    aggregator::{self, Aggregation},
    config::EngineConfig,
    consolidation::{self, ConsolidatedResult},
    error::{SettlementError, SettlementResult},
    event::{EventLogEntry, SettlementEvent, SkipReason},
    parameter_store::ParameterStore,
    settlement::{self, Cut1Settlement, DiscountCutSettlement, PriorCut},
    store::{RunCounters, SettlementStore},
    types::{Corte, Periodo, RunId, SettlementKey, Zona},
};
use std::collections::{BTreeMap, HashMap};

/// Outcome of one cut run.
#[derive(Debug, Clone, PartialEq)]
pub struct CutReport {
    pub run_id: RunId,
    pub corte: Corte,
    pub periodo: Periodo,
    pub zona: Zona,
    pub rows_written: usize,
    /// Rows whose re-validation against the prior cut disagreed.
    pub flagged: usize,
    /// Later cuts whose completed runs this run invalidated.
    pub superseded: Vec<Corte>,
    /// Malformed sale records dropped by the aggregator.
    pub skipped_records: usize,
    /// Aggregated agencies without a parameter row (cut 1).
    pub missing_parameters: usize,
    /// Agencies without a row in the prior cut (cuts 2..4).
    pub missing_prior: usize,
}

impl CutReport {
    pub fn skipped(&self) -> usize {
        self.missing_parameters + self.missing_prior
    }
}

enum CutRows {
    Cut1(Vec<Cut1Settlement>),
    Discount(Vec<DiscountCutSettlement>),
}

impl CutRows {
    fn len(&self) -> usize {
        match self {
            CutRows::Cut1(rows) => rows.len(),
            CutRows::Discount(rows) => rows.len(),
        }
    }
}

pub struct SettlementEngine {
    store: SettlementStore,
    config: EngineConfig,
}

impl SettlementEngine {
    pub fn new(store: SettlementStore, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &SettlementStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one cut. Re-running a cut overwrites its rows.
    pub fn run_cut(
        &self,
        corte: Corte,
        periodo: Periodo,
        zona: Zona,
    ) -> SettlementResult<CutReport> {
        if let Some(prior) = corte.previous() {
            if !self.store.completed_cuts(periodo, zona)?.contains(&prior) {
                return Err(SettlementError::PriorCutNotRun {
                    cut: corte,
                    prior,
                    periodo: periodo.as_u32(),
                    zona: zona.to_string(),
                });
            }
        }

        let sales = self.store.sales_for_period(periodo, zona)?;
        let aggregation = aggregator::aggregate(&sales, zona, periodo, &self.config);
        log::debug!(
            "{corte} {periodo} {zona}: {} records matched, {} agencies",
            aggregation.matched_records,
            aggregation.agencies.len()
        );

        let mut events = vec![SettlementEvent::CutStarted { corte, periodo, zona }];
        let mut missing_parameters = 0;
        let mut missing_prior = 0;

        let rows = match corte {
            Corte::Uno => {
                let parameters =
                    ParameterStore::from_rows(self.store.parameters_for(periodo, zona)?)?;
                let (rows, missing) =
                    self.compute_cut1_rows(periodo, zona, &aggregation, &parameters, &mut events);
                missing_parameters = missing;
                CutRows::Cut1(rows)
            }
            _ => {
                let (rows, missing) =
                    self.compute_discount_rows(corte, periodo, zona, &aggregation, &mut events)?;
                missing_prior = missing;
                CutRows::Discount(rows)
            }
        };

        let flagged = match &rows {
            CutRows::Cut1(_) => 0,
            CutRows::Discount(rows) => rows.iter().filter(|r| r.needs_review()).count(),
        };
        let counters = RunCounters {
            rows_written: rows.len(),
            flagged,
            skipped: missing_parameters + missing_prior,
        };
        let completed = SettlementEvent::CutCompleted {
            corte,
            rows_written: counters.rows_written,
            flagged: counters.flagged,
            skipped: counters.skipped,
        };

        let run_id = uuid::Uuid::new_v4().to_string();
        self.store.start_run(&run_id, periodo, zona, corte)?;
        let superseded = self.store.in_transaction(|store| {
            match &rows {
                CutRows::Cut1(rows) => {
                    for row in rows {
                        store.upsert_cut1(row)?;
                    }
                }
                CutRows::Discount(rows) => {
                    for row in rows {
                        store.upsert_discount_cut(row)?;
                    }
                }
            }
            let superseded = store.supersede_runs_after(&run_id, periodo, zona, corte)?;
            store.mark_superseded(corte, periodo, zona)?;
            if !superseded.is_empty() {
                events.push(SettlementEvent::LaterCutsSuperseded {
                    corte,
                    superseded: superseded.clone(),
                });
            }
            events.push(completed);
            for event in &events {
                store.append_event(&EventLogEntry {
                    id: None,
                    run_id: run_id.clone(),
                    corte,
                    event_type: event.type_name().to_string(),
                    payload: serde_json::to_string(event)?,
                })?;
            }
            store.complete_run(&run_id, counters)?;
            Ok(superseded)
        })?;

        if !superseded.is_empty() {
            log::warn!(
                "{corte} {periodo} {zona}: re-run superseded {superseded:?}, re-run them in order"
            );
        }

        log::info!(
            "{corte} {periodo} {zona}: {} rows written, {} flagged, {} skipped (run {run_id})",
            counters.rows_written,
            counters.flagged,
            counters.skipped
        );

        Ok(CutReport {
            run_id,
            corte,
            periodo,
            zona,
            rows_written: counters.rows_written,
            flagged,
            superseded,
            skipped_records: aggregation.skipped_records,
            missing_parameters,
            missing_prior,
        })
    }

    /// Run cuts 1..4 in order, stopping at the first failure.
    pub fn run_all(&self, periodo: Periodo, zona: Zona) -> SettlementResult<Vec<CutReport>> {
        Corte::ALL
            .iter()
            .map(|corte| self.run_cut(*corte, periodo, zona))
            .collect()
    }

    /// Consolidated view over whatever cuts have been persisted.
    pub fn consolidated(
        &self,
        periodo: Periodo,
        zona: Zona,
    ) -> SettlementResult<Vec<ConsolidatedResult>> {
        let cut1 = self.store.cut1_rows(periodo, zona)?;
        let discounts = self.store.all_discount_rows(periodo, zona)?;
        Ok(consolidation::consolidate(&cut1, &discounts))
    }

    fn compute_cut1_rows(
        &self,
        periodo: Periodo,
        zona: Zona,
        aggregation: &Aggregation,
        parameters: &ParameterStore,
        events: &mut Vec<SettlementEvent>,
    ) -> (Vec<Cut1Settlement>, usize) {
        let mut rows = Vec::with_capacity(aggregation.agencies.len());
        let mut missing = 0;
        for (ruc, agg) in &aggregation.agencies {
            let Some(param) = parameters.get(ruc, periodo) else {
                log::warn!("corte 1 {periodo} {zona}: no parameter for {ruc}, skipped");
                events.push(SettlementEvent::AgencySkipped {
                    corte: Corte::Uno,
                    ruc: ruc.clone(),
                    reason: SkipReason::MissingParameter,
                });
                missing += 1;
                continue;
            };
            let key = SettlementKey::new(periodo, zona, ruc.as_str());
            let row = settlement::compute_cut1(key, param, agg, &self.config);
            log::debug!("corte 1 {ruc}: comision {} pago {}", row.comision_total, row.pago_corte_1);
            rows.push(row);
        }
        (rows, missing)
    }

    /// Cuts 2..4 iterate the prior cut's rows; agencies that vanished from
    /// the fresh aggregation are computed with zero activity.
    fn compute_discount_rows(
        &self,
        corte: Corte,
        periodo: Periodo,
        zona: Zona,
        aggregation: &Aggregation,
        events: &mut Vec<SettlementEvent>,
    ) -> SettlementResult<(Vec<DiscountCutSettlement>, usize)> {
        let cut1: BTreeMap<String, Cut1Settlement> = self
            .store
            .cut1_rows(periodo, zona)?
            .into_iter()
            .map(|r| (r.key.ruc.clone(), r))
            .collect();

        let prior_discount: Option<HashMap<String, DiscountCutSettlement>> =
            match corte.previous() {
                Some(prior) if prior != Corte::Uno => Some(
                    self.store
                        .discount_rows(prior, periodo, zona)?
                        .into_iter()
                        .map(|r| (r.key.ruc.clone(), r))
                        .collect(),
                ),
                _ => None,
            };

        let mut rows = Vec::new();
        let mut missing = 0;
        for (ruc, c1) in &cut1 {
            let prior = match &prior_discount {
                None => PriorCut::Cut1(c1),
                Some(map) => match map.get(ruc) {
                    Some(d) => PriorCut::Discount(d),
                    None => {
                        log::warn!("{corte} {periodo} {zona}: {ruc} has no prior cut row, skipped");
                        events.push(SettlementEvent::AgencySkipped {
                            corte,
                            ruc: ruc.clone(),
                            reason: SkipReason::MissingPriorCut,
                        });
                        missing += 1;
                        continue;
                    }
                },
            };
            let agg = aggregation.get_or_zero(ruc);
            let row = settlement::compute_discount_cut(corte, c1, prior, &agg, &self.config);
            if let settlement::CutValidation::Mismatched { expected, actual } = row.validacion {
                log::warn!(
                    "{corte} {periodo} {zona}: {ruc} disagrees with prior cut \
                     (expected {expected:?}, got {actual:?})"
                );
                events.push(SettlementEvent::ValidationMismatch {
                    corte,
                    ruc: ruc.clone(),
                    expected,
                    actual,
                });
            }
            rows.push(row);
        }

        for ruc in aggregation.agencies.keys() {
            if cut1.contains_key(ruc) {
                continue;
            }
            log::warn!("{corte} {periodo} {zona}: {ruc} has no prior cut row, skipped");
            events.push(SettlementEvent::AgencySkipped {
                corte,
                ruc: ruc.clone(),
                reason: SkipReason::MissingPriorCut,
            });
            missing += 1;
        }
        Ok((rows, missing))
    }
}

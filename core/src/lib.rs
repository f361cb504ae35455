//! comisiones-core: staged commission settlement for sales agencies.
//!
//! A (periodo, zona) batch is settled in four sequential cuts. Cut 1 pays
//! the first installment of the gross commission; cuts 2..4 re-validate
//! against the prior cut and apply churn penalties and quota clawbacks.

pub mod aggregator;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod event;
pub mod multiplier;
pub mod parameter_store;
pub mod sale;
pub mod settlement;
pub mod settlement_engine;
pub mod store;
pub mod types;

use crate::types::Corte;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid period: {0:?}")]
    InvalidPeriod(String),

    #[error("Invalid zone: {0:?}")]
    InvalidZone(String),

    #[error("Invalid tier: {0:?}")]
    InvalidTier(String),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Duplicate commission parameter for ruc {ruc} in period {periodo}")]
    DuplicateParameter { ruc: String, periodo: u32 },

    #[error("Cannot run {cut}: {prior} has not been completed for {periodo}/{zona}")]
    PriorCutNotRun {
        cut: Corte,
        prior: Corte,
        periodo: u32,
        zona: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SettlementResult<T> = Result<T, SettlementError>;

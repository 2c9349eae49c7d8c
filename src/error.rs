//! Error types for window validation and configuration loading

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller contract violations detected before any analysis runs.
///
/// None of these are transient; retrying with the same window yields the same error.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Transaction {transaction_id:?} has an empty {field}")]
    EmptyField {
        transaction_id: String,
        field: String,
    },

    #[error("Transaction {transaction_id} has a non-finite amount")]
    NonFiniteAmount { transaction_id: String },

    #[error("Duplicate transaction id in window: {0}")]
    DuplicateTransactionId(String),

    #[error("Transaction {transaction_id} has invalid jurisdiction code {code:?}")]
    InvalidJurisdiction {
        transaction_id: String,
        code: String,
    },

    #[error("Reference instant {reference} is earlier than latest transaction at {latest}")]
    ReferenceBeforeTransaction {
        reference: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    #[error("Window of {size} transactions exceeds limit of {limit}")]
    WindowTooLarge { size: usize, limit: usize },
}

/// Errors raised while loading or validating a [`crate::DetectorConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

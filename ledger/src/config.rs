//! Configuration for the ledger.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::types::{AccountId, Amount};
use machine_ledger_core::stream::StreamId;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

/// Slot price a new ledger opens with
pub const DEFAULT_SLOT_PRICE: u128 = 100;

/// Journal stream the ledger writes to
pub const DEFAULT_STREAM_ID: &str = "machine-ledger";

/// Default `tracing` filter directive
pub const DEFAULT_LOG_FILTER: &str = "machine_ledger=info";

/// Errors raised while loading configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `LEDGER_OPERATOR` is unset or blank
    #[error("LEDGER_OPERATOR must name the operator account")]
    MissingOperator,

    /// `LEDGER_SLOT_PRICE` is not a non-negative integer
    #[error("LEDGER_SLOT_PRICE is not a valid price: {0}")]
    InvalidSlotPrice(String),

    /// `LEDGER_STREAM_ID` is blank
    #[error("LEDGER_STREAM_ID cannot be blank")]
    InvalidStreamId,
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Operator identity, fixed when the ledger is first opened
    pub operator: AccountId,
    /// Slot price written into a new ledger
    pub slot_price: Amount,
    /// Journal stream
    pub stream_id: StreamId,
    /// `tracing` filter used by binaries (`RUST_LOG`)
    pub log_filter: String,
}

impl LedgerConfig {
    /// Defaults for everything but the operator
    #[must_use]
    pub fn new(operator: AccountId) -> Self {
        Self {
            operator,
            slot_price: Amount::new(DEFAULT_SLOT_PRICE),
            stream_id: StreamId::new(DEFAULT_STREAM_ID),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`LedgerConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingOperator`] if `LEDGER_OPERATOR` is unset or blank
    /// - [`ConfigError::InvalidSlotPrice`] if `LEDGER_SLOT_PRICE` does not parse
    /// - [`ConfigError::InvalidStreamId`] if `LEDGER_STREAM_ID` is blank
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let operator = lookup("LEDGER_OPERATOR")
            .and_then(|value| value.parse::<AccountId>().ok())
            .ok_or(ConfigError::MissingOperator)?;

        let slot_price = match lookup("LEDGER_SLOT_PRICE") {
            Some(raw) => raw
                .trim()
                .parse::<u128>()
                .map(Amount::new)
                .map_err(|_| ConfigError::InvalidSlotPrice(raw))?,
            None => Amount::new(DEFAULT_SLOT_PRICE),
        };

        let stream_id = match lookup("LEDGER_STREAM_ID") {
            Some(raw) => raw
                .parse::<StreamId>()
                .map_err(|_| ConfigError::InvalidStreamId)?,
            None => StreamId::new(DEFAULT_STREAM_ID),
        };

        let log_filter = lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            operator,
            slot_price,
            stream_id,
            log_filter,
        })
    }

    /// Replace the opening slot price
    #[must_use]
    pub const fn with_slot_price(mut self, slot_price: Amount) -> Self {
        self.slot_price = slot_price;
        self
    }

    /// Replace the journal stream
    #[must_use]
    pub fn with_stream_id(mut self, stream_id: StreamId) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Replace the log filter
    #[must_use]
    pub fn with_log_filter(mut self, log_filter: impl Into<String>) -> Self {
        self.log_filter = log_filter.into();
        self
    }
}

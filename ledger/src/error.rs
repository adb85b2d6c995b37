//! Error kinds reported by ledger operations.
//!
//! Every rejected call maps to exactly one variant and leaves the ledger
//! untouched. Nothing is retried internally.

use crate::types::{AccountId, Amount, MachineName, ReservationId};
use thiserror::Error;

/// Errors returned by ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Caller is not the operator for an admin-only operation
    #[error("Account {caller} is not authorized for this operation")]
    Unauthorized {
        /// The rejected caller
        caller: AccountId,
    },

    /// Referenced machine is not registered
    #[error("Machine {0} is not registered")]
    UnknownMachine(MachineName),

    /// Machine is already registered
    #[error("Machine {0} is already registered")]
    DuplicateMachine(MachineName),

    /// Start or end is not a valid military time, or `start >= end`
    #[error("Invalid interval: start {start}, end {end}")]
    InvalidInterval {
        /// Requested start
        start: u16,
        /// Requested end
        end: u16,
    },

    /// A queried instant is not a valid military time
    #[error("Invalid time: {0}")]
    InvalidTime(u16),

    /// The requested slot overlaps an existing reservation
    #[error("Slot on {machine} conflicts with reservation {conflicting}")]
    SlotConflict {
        /// Machine being booked
        machine: MachineName,
        /// The reservation in the way
        conflicting: ReservationId,
    },

    /// Attached value differs from the current slot price
    #[error("Payment of {attached} does not match the slot price of {required}")]
    InsufficientPayment {
        /// Current slot price
        required: Amount,
        /// Value attached to the call
        attached: Amount,
    },

    /// Negative slot price
    #[error("Invalid slot price: {0}")]
    InvalidPrice(i128),

    /// Treasury is empty
    #[error("Treasury is empty, nothing to withdraw")]
    NothingToWithdraw,

    /// Crediting the payment would overflow the treasury
    #[error("Treasury balance would overflow")]
    TreasuryOverflow,

    /// The commit to the journal failed; nothing was applied
    #[error("Journal error: {0}")]
    Journal(String),

    /// The withdrawal could not be paid out; the treasury kept its balance
    #[error("Payout failed: {0}")]
    Payout(String),
}

impl LedgerError {
    /// Stable snake_case label for logs and metric labels
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            LedgerError::Unauthorized { .. } => "unauthorized",
            LedgerError::UnknownMachine(_) => "unknown_machine",
            LedgerError::DuplicateMachine(_) => "duplicate_machine",
            LedgerError::InvalidInterval { .. } => "invalid_interval",
            LedgerError::InvalidTime(_) => "invalid_time",
            LedgerError::SlotConflict { .. } => "slot_conflict",
            LedgerError::InsufficientPayment { .. } => "insufficient_payment",
            LedgerError::InvalidPrice(_) => "invalid_price",
            LedgerError::NothingToWithdraw => "nothing_to_withdraw",
            LedgerError::TreasuryOverflow => "treasury_overflow",
            LedgerError::Journal(_) => "journal",
            LedgerError::Payout(_) => "payout",
        }
    }
}

impl From<machine_ledger_core::event_store::EventStoreError> for LedgerError {
    fn from(error: machine_ledger_core::event_store::EventStoreError) -> Self {
        LedgerError::Journal(error.to_string())
    }
}

impl From<machine_ledger_core::event::EventError> for LedgerError {
    fn from(error: machine_ledger_core::event::EventError) -> Self {
        LedgerError::Journal(error.to_string())
    }
}

impl From<crate::environment::PayoutError> for LedgerError {
    fn from(error: crate::environment::PayoutError) -> Self {
        LedgerError::Payout(error.to_string())
    }
}

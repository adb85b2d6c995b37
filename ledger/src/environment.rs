//! Injected dependencies for the ledger.

use crate::types::{AccountId, Amount};
use machine_ledger_core::environment::{Clock, SystemClock};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Why a payout did not go through
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayoutError {
    /// The receiving side refused the transfer
    #[error("Payout to {to} rejected: {reason}")]
    Rejected {
        /// Intended recipient
        to: AccountId,
        /// Reason given by the receiving side
        reason: String,
    },

    /// The payout backend could not be reached
    #[error("Payout backend unavailable: {0}")]
    Unavailable(String),
}

/// Value-transfer side of a withdrawal
///
/// Called once per committed withdrawal, after the journal accepted it. A
/// failed credit is journaled as a reversal and the funds stay in the
/// treasury.
pub trait Payouts: Send + Sync {
    /// Credits `amount` to `to`
    ///
    /// # Errors
    ///
    /// [`PayoutError`] if the transfer did not happen.
    fn credit(&self, to: &AccountId, amount: Amount) -> Result<(), PayoutError>;
}

/// Payouts kept in memory, in the order they were made
#[derive(Debug, Default)]
pub struct InMemoryPayouts {
    credited: Mutex<Vec<(AccountId, Amount)>>,
}

impl InMemoryPayouts {
    /// Creates an empty payout log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payout made so far
    #[must_use]
    pub fn history(&self) -> Vec<(AccountId, Amount)> {
        self.credited
            .lock()
            .map(|credited| credited.clone())
            .unwrap_or_default()
    }

    /// Total credited to `account`
    #[must_use]
    pub fn total_for(&self, account: &AccountId) -> Amount {
        self.history()
            .into_iter()
            .filter(|(to, _)| to == account)
            .fold(Amount::ZERO, |sum, (_, amount)| {
                sum.checked_add(amount).unwrap_or(sum)
            })
    }
}

impl Payouts for InMemoryPayouts {
    fn credit(&self, to: &AccountId, amount: Amount) -> Result<(), PayoutError> {
        let mut credited = self
            .credited
            .lock()
            .map_err(|_| PayoutError::Unavailable("payout log poisoned".to_string()))?;
        credited.push((to.clone(), amount));
        Ok(())
    }
}

/// Environment dependencies for the ledger reducer and service
#[derive(Clone)]
pub struct LedgerEnvironment {
    /// Clock for event timestamps
    pub clock: Arc<dyn Clock>,
    /// Where withdrawals are paid
    pub payouts: Arc<dyn Payouts>,
}

impl LedgerEnvironment {
    /// Creates a new `LedgerEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, payouts: Arc<dyn Payouts>) -> Self {
        Self { clock, payouts }
    }

    /// System clock and an in-memory payout log
    #[must_use]
    pub fn in_memory() -> (Self, Arc<InMemoryPayouts>) {
        let payouts = Arc::new(InMemoryPayouts::new());
        (Self::new(Arc::new(SystemClock), payouts.clone()), payouts)
    }
}

impl std::fmt::Debug for LedgerEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEnvironment").finish_non_exhaustive()
    }
}

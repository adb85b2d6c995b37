//! Authorization gate for administrative operations.

use crate::error::LedgerError;
use crate::types::AccountId;
use serde::{Deserialize, Serialize};

/// Compares callers against the operator fixed at ledger creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationGate {
    operator: AccountId,
}

impl AuthorizationGate {
    /// Creates a gate for `operator`
    #[must_use]
    pub const fn new(operator: AccountId) -> Self {
        Self { operator }
    }

    /// The operator identity
    #[must_use]
    pub const fn operator(&self) -> &AccountId {
        &self.operator
    }

    /// True iff `caller` is the operator
    #[must_use]
    pub fn is_operator(&self, caller: &AccountId) -> bool {
        *caller == self.operator
    }

    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] if `caller` is not the operator.
    pub fn authorize(&self, caller: &AccountId) -> Result<(), LedgerError> {
        if !self.is_operator(caller) {
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }
}

//! Pricing and treasury.
//!
//! Holds the current slot price and the custodial balance. The balance is
//! always `total_collected - total_withdrawn` and never negative.

use crate::error::LedgerError;
use crate::types::Amount;
use serde::{Deserialize, Serialize};

/// Slot price and custodial balance
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    slot_price: Amount,
    balance: Amount,
    total_collected: Amount,
    total_withdrawn: Amount,
}

impl Treasury {
    /// Creates an empty treasury charging `slot_price` per booking
    #[must_use]
    pub const fn new(slot_price: Amount) -> Self {
        Self {
            slot_price,
            balance: Amount::ZERO,
            total_collected: Amount::ZERO,
            total_withdrawn: Amount::ZERO,
        }
    }

    /// Price charged for the next booking
    #[must_use]
    pub const fn slot_price(&self) -> Amount {
        self.slot_price
    }

    /// Current custodial balance
    #[must_use]
    pub const fn balance(&self) -> Amount {
        self.balance
    }

    /// Sum of every captured booking payment
    #[must_use]
    pub const fn total_collected(&self) -> Amount {
        self.total_collected
    }

    /// Sum of every completed withdrawal
    #[must_use]
    pub const fn total_withdrawn(&self) -> Amount {
        self.total_withdrawn
    }

    /// Converts a requested price into an [`Amount`]
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidPrice`] if `price` is negative or does not fit.
    pub fn validate_price(price: i128) -> Result<Amount, LedgerError> {
        u128::try_from(price)
            .map(Amount::new)
            .map_err(|_| LedgerError::InvalidPrice(price))
    }

    /// Payment must equal the current price exactly
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientPayment`] on under- or over-payment.
    pub fn ensure_payment(&self, attached: Amount) -> Result<(), LedgerError> {
        if attached != self.slot_price {
            return Err(LedgerError::InsufficientPayment {
                required: self.slot_price,
                attached,
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`LedgerError::TreasuryOverflow`] if crediting `amount` would overflow
    /// the balance. The running totals saturate and never block a booking.
    pub fn ensure_credit(&self, amount: Amount) -> Result<(), LedgerError> {
        self.balance
            .checked_add(amount)
            .map(|_| ())
            .ok_or(LedgerError::TreasuryOverflow)
    }

    /// Returns the full balance that a withdrawal would pay out
    ///
    /// # Errors
    ///
    /// [`LedgerError::NothingToWithdraw`] if the balance is zero.
    pub fn ensure_withdrawable(&self) -> Result<Amount, LedgerError> {
        if self.balance.is_zero() {
            return Err(LedgerError::NothingToWithdraw);
        }
        Ok(self.balance)
    }

    pub(crate) fn set_price(&mut self, price: Amount) {
        self.slot_price = price;
    }

    /// Adds a captured payment; callers check [`Treasury::ensure_credit`] first
    pub(crate) fn credit(&mut self, amount: Amount) {
        self.balance = self.balance.saturating_add(amount);
        self.total_collected = self.total_collected.saturating_add(amount);
    }

    /// Resets the balance to zero and returns what it held
    pub(crate) fn drain(&mut self) -> Amount {
        let paid_out = std::mem::take(&mut self.balance);
        self.total_withdrawn = self.total_withdrawn.saturating_add(paid_out);
        paid_out
    }

    /// Puts an unpaid withdrawal back into the balance
    pub(crate) fn restore(&mut self, amount: Amount) {
        self.balance = self.balance.saturating_add(amount);
        self.total_withdrawn = self.total_withdrawn.saturating_sub(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_prices_are_rejected() {
        assert_eq!(Treasury::validate_price(-1), Err(LedgerError::InvalidPrice(-1)));
        assert_eq!(Treasury::validate_price(0), Ok(Amount::ZERO));
        assert_eq!(Treasury::validate_price(250), Ok(Amount::new(250)));
    }

    #[test]
    fn payment_must_match_exactly() {
        let treasury = Treasury::new(Amount::new(100));

        assert!(treasury.ensure_payment(Amount::new(100)).is_ok());
        assert_eq!(
            treasury.ensure_payment(Amount::new(99)),
            Err(LedgerError::InsufficientPayment {
                required: Amount::new(100),
                attached: Amount::new(99),
            })
        );
        assert!(treasury.ensure_payment(Amount::new(101)).is_err());
    }

    #[test]
    fn drain_empties_balance_and_tracks_totals() {
        let mut treasury = Treasury::new(Amount::new(100));
        assert_eq!(treasury.ensure_withdrawable(), Err(LedgerError::NothingToWithdraw));

        treasury.credit(Amount::new(100));
        treasury.credit(Amount::new(40));
        assert_eq!(treasury.ensure_withdrawable(), Ok(Amount::new(140)));

        assert_eq!(treasury.drain(), Amount::new(140));
        assert_eq!(treasury.balance(), Amount::ZERO);
        assert_eq!(treasury.total_collected(), Amount::new(140));
        assert_eq!(treasury.total_withdrawn(), Amount::new(140));
        assert_eq!(treasury.ensure_withdrawable(), Err(LedgerError::NothingToWithdraw));
    }

    #[test]
    fn overflow_is_detected_before_credit() {
        let mut treasury = Treasury::new(Amount::new(1));
        treasury.credit(Amount::new(u128::MAX));
        assert_eq!(
            treasury.ensure_credit(Amount::new(1)),
            Err(LedgerError::TreasuryOverflow)
        );
    }

    #[test]
    fn running_total_saturates_without_blocking_credit() {
        let mut treasury = Treasury::new(Amount::new(1));
        treasury.credit(Amount::new(u128::MAX));
        treasury.drain();

        // balance is empty again, only the statistic is at its ceiling
        assert_eq!(treasury.ensure_credit(Amount::new(1)), Ok(()));
        treasury.credit(Amount::new(1));
        assert_eq!(treasury.balance(), Amount::new(1));
        assert_eq!(treasury.total_collected(), Amount::new(u128::MAX));
    }

    #[test]
    fn restore_undoes_drain() {
        let mut treasury = Treasury::new(Amount::new(100));
        treasury.credit(Amount::new(100));
        let paid_out = treasury.drain();

        treasury.restore(paid_out);
        assert_eq!(treasury.balance(), Amount::new(100));
        assert_eq!(treasury.total_withdrawn(), Amount::ZERO);
        assert_eq!(treasury.total_collected(), Amount::new(100));
    }
}

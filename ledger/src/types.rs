//! Domain types for the machine reservation ledger.
//!
//! - Machines are identified by a case-sensitive name
//! - Reservations hold a half-open slot `[start, end)` on one machine
//! - Times are military-clock integers (`0..=2359`, minutes below 60)
//! - Prices and the treasury are counted in the ledger's native value unit

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use machine_ledger_core::event::Event;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an empty identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} cannot be empty")]
pub struct EmptyIdentifier(&'static str);

/// Name of a bookable machine (case-sensitive)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MachineName(String);

impl MachineName {
    /// Creates a machine name from trusted input
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MachineName {
    type Err = EmptyIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(EmptyIdentifier("machine name"));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for MachineName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of a calling account, as attributed by the environment
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Creates an account identifier from trusted input
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = EmptyIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(EmptyIdentifier("account id"));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Amount in the ledger's native value unit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    /// Nothing
    pub const ZERO: Self = Self(0);

    /// Creates an amount
    #[must_use]
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(self) -> u128 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, `None` on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Adds two amounts, clamping at the maximum
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtracts `other`, clamping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A time of day on the 24-hour military clock
///
/// `930` is 09:30, `2359` is 23:59. Comparisons use minutes since midnight,
/// which orders identically to the military value for valid times.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClockTime(u16);

impl ClockTime {
    /// Latest representable time (23:59)
    pub const LAST: Self = Self(2359);

    /// Validates a military-clock value
    ///
    /// Returns `None` past 2359 or when the minute part is 60 or more.
    #[must_use]
    pub const fn from_military(value: u16) -> Option<Self> {
        if value > Self::LAST.0 || value % 100 >= 60 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// The military-clock value
    #[must_use]
    pub const fn military(self) -> u16 {
        self.0
    }

    /// Minutes since midnight
    #[must_use]
    pub const fn minutes_since_midnight(self) -> u16 {
        (self.0 / 100) * 60 + self.0 % 100
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Half-open time range `[start, end)` on one machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotInterval {
    start: ClockTime,
    end: ClockTime,
}

impl SlotInterval {
    /// Creates an interval, requiring `start < end`
    #[must_use]
    pub fn new(start: ClockTime, end: ClockTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Validates raw military-clock bounds
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInterval`] if either bound is not a valid
    /// time or `start >= end`.
    pub fn from_military(start: u16, end: u16) -> Result<Self, LedgerError> {
        ClockTime::from_military(start)
            .zip(ClockTime::from_military(end))
            .and_then(|(start, end)| Self::new(start, end))
            .ok_or(LedgerError::InvalidInterval { start, end })
    }

    /// Inclusive start
    #[must_use]
    pub const fn start(&self) -> ClockTime {
        self.start
    }

    /// Exclusive end
    #[must_use]
    pub const fn end(&self) -> ClockTime {
        self.end
    }

    /// `[s1, e1)` and `[s2, e2)` overlap iff `s1 < e2 && s2 < e1`
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// `start <= time < end`
    #[must_use]
    pub fn contains(&self, time: ClockTime) -> bool {
        self.start <= time && time < self.end
    }

    /// Length in minutes
    #[must_use]
    pub const fn duration_minutes(&self) -> u16 {
        self.end.minutes_since_midnight() - self.start.minutes_since_midnight()
    }
}

impl fmt::Display for SlotInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Identifier of a reservation, assigned sequentially by the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReservationId(u64);

impl ReservationId {
    /// The first identifier a ledger hands out
    pub const FIRST: Self = Self(1);

    /// Creates a reservation id
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The identifier after this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered machine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    /// Machine name
    pub name: MachineName,
    /// When the machine was registered
    pub added_at: DateTime<Utc>,
}

/// One booked slot. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identifier
    pub id: ReservationId,
    /// Machine the slot belongs to
    pub machine: MachineName,
    /// Booked interval
    pub interval: SlotInterval,
    /// Account that booked the slot
    pub booked_by: AccountId,
    /// Price captured at booking time
    pub paid: Amount,
    /// When the booking was committed
    pub booked_at: DateTime<Utc>,
}

/// Facts recorded in the journal
///
/// Replaying these in order from an empty state rebuilds the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// The ledger was created with its operator and opening price
    LedgerOpened {
        /// Operator identity, fixed for the ledger's lifetime
        operator: AccountId,
        /// Slot price in effect until the first `SlotPriceSet`
        slot_price: Amount,
        /// Creation time
        opened_at: DateTime<Utc>,
    },

    /// A machine was registered
    MachineAdded {
        /// The new machine
        machine: Machine,
    },

    /// A slot was booked and paid for
    SlotBooked {
        /// The new reservation
        reservation: Reservation,
    },

    /// The operator changed the slot price
    SlotPriceSet {
        /// New price
        price: Amount,
        /// When the change took effect
        set_at: DateTime<Utc>,
    },

    /// The treasury was paid out to the operator
    FundsWithdrawn {
        /// Receiving account (always the operator)
        to: AccountId,
        /// Entire balance at the time of withdrawal
        amount: Amount,
        /// When the payout was committed
        withdrawn_at: DateTime<Utc>,
    },

    /// A recorded withdrawal could not be paid and went back to the treasury
    WithdrawalReversed {
        /// Account the payout was meant for
        to: AccountId,
        /// Amount returned to the treasury
        amount: Amount,
        /// Why the payout failed
        reason: String,
        /// When the reversal was recorded
        reversed_at: DateTime<Utc>,
    },
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::LedgerOpened { .. } => "LedgerOpened.v1",
            LedgerEvent::MachineAdded { .. } => "MachineAdded.v1",
            LedgerEvent::SlotBooked { .. } => "SlotBooked.v1",
            LedgerEvent::SlotPriceSet { .. } => "SlotPriceSet.v1",
            LedgerEvent::FundsWithdrawn { .. } => "FundsWithdrawn.v1",
            LedgerEvent::WithdrawalReversed { .. } => "WithdrawalReversed.v1",
        }
    }
}

/// State-changing requests, each attributed to a caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerCommand {
    /// Operator registers a machine
    AddMachine {
        /// Calling account
        caller: AccountId,
        /// Machine to register
        name: MachineName,
    },

    /// Any account books a slot, attaching a payment
    Book {
        /// Calling account
        caller: AccountId,
        /// Machine to book
        machine: MachineName,
        /// Military-clock start (inclusive)
        start: u16,
        /// Military-clock end (exclusive)
        end: u16,
        /// Value attached to the call
        payment: Amount,
    },

    /// Operator replaces the slot price
    SetSlotPrice {
        /// Calling account
        caller: AccountId,
        /// Requested price; negative values are rejected
        price: i128,
    },

    /// Operator drains the treasury
    Withdraw {
        /// Calling account
        caller: AccountId,
    },
}

impl LedgerCommand {
    /// The account that issued the command
    #[must_use]
    pub const fn caller(&self) -> &AccountId {
        match self {
            LedgerCommand::AddMachine { caller, .. }
            | LedgerCommand::Book { caller, .. }
            | LedgerCommand::SetSlotPrice { caller, .. }
            | LedgerCommand::Withdraw { caller } => caller,
        }
    }

    /// Short operation name used in logs and metrics
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            LedgerCommand::AddMachine { .. } => "add_machine",
            LedgerCommand::Book { .. } => "book",
            LedgerCommand::SetSlotPrice { .. } => "set_slot_price",
            LedgerCommand::Withdraw { .. } => "withdraw",
        }
    }
}

/// Actions for the ledger reducer (commands and recorded facts)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerAction {
    // ========== Commands ==========
    /// A request to change the ledger
    Command(LedgerCommand),

    // ========== Events ==========
    /// A fact that was accepted (live or replayed from the journal)
    Recorded(LedgerEvent),

    /// A command was rejected
    ValidationFailed {
        /// Why it was rejected
        error: LedgerError,
    },
}

impl LedgerAction {
    /// Returns true for commands
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(self, LedgerAction::Command(_))
    }

    /// Returns true for recorded facts and rejections
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !self.is_command()
    }
}

impl From<LedgerCommand> for LedgerAction {
    fn from(command: LedgerCommand) -> Self {
        LedgerAction::Command(command)
    }
}

impl From<LedgerEvent> for LedgerAction {
    fn from(event: LedgerEvent) -> Self {
        LedgerAction::Recorded(event)
    }
}

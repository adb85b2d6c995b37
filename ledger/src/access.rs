//! Access evaluator.
//!
//! Read-only: answers whether a machine is occupied at an instant. The
//! caller's identity is not part of the predicate, so anyone asking about an
//! occupied slot is told access exists.

use crate::error::LedgerError;
use crate::registry::MachineRegistry;
use crate::slots::SlotLedger;
use crate::types::{ClockTime, MachineName, Reservation};

/// `checkAccess`: validates the machine and the instant, then evaluates
///
/// # Errors
///
/// - [`LedgerError::UnknownMachine`] if the machine is not registered
/// - [`LedgerError::InvalidTime`] if `time` is not a valid military time
pub fn check_access(
    registry: &MachineRegistry,
    slots: &SlotLedger,
    machine: &MachineName,
    time: u16,
) -> Result<bool, LedgerError> {
    occupant(registry, slots, machine, time).map(|reservation| reservation.is_some())
}

/// Like [`check_access`] but returns the reservation holding the machine
///
/// # Errors
///
/// Same as [`check_access`].
pub fn occupant<'a>(
    registry: &MachineRegistry,
    slots: &'a SlotLedger,
    machine: &MachineName,
    time: u16,
) -> Result<Option<&'a Reservation>, LedgerError> {
    registry.ensure_registered(machine)?;
    let time = ClockTime::from_military(time).ok_or(LedgerError::InvalidTime(time))?;
    Ok(slots.occupant(machine, time))
}

//! Slot ledger: every reservation, per machine.
//!
//! Each machine's reservations are kept sorted by start time and never
//! overlap. Because of that, the only reservation that can overlap a
//! candidate `[s, e)` is the last one starting before `e`, so conflicts are
//! found with a binary search.
//!
//! `checkSlot` and `book` both go through [`SlotLedger::conflict`].

use crate::error::LedgerError;
use crate::types::{ClockTime, MachineName, Reservation, ReservationId, SlotInterval};
use std::collections::HashMap;

/// All reservations, grouped by machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotLedger {
    by_machine: HashMap<MachineName, Vec<Reservation>>,
    next_id: ReservationId,
}

impl Default for SlotLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotLedger {
    /// Creates an empty slot ledger
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_machine: HashMap::new(),
            next_id: ReservationId::FIRST,
        }
    }

    /// Reservations on a machine, ordered by start time
    #[must_use]
    pub fn reservations(&self, machine: &MachineName) -> &[Reservation] {
        self.by_machine.get(machine).map_or(&[], Vec::as_slice)
    }

    /// Total number of reservations across machines
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_machine.values().map(Vec::len).sum()
    }

    /// True if nothing has been booked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifier the next reservation will get
    #[must_use]
    pub const fn next_id(&self) -> ReservationId {
        self.next_id
    }

    /// The existing reservation overlapping `interval`, if any
    #[must_use]
    pub fn conflict(&self, machine: &MachineName, interval: &SlotInterval) -> Option<&Reservation> {
        let booked = self.reservations(machine);
        let candidates = booked.partition_point(|r| r.interval.start() < interval.end());
        booked[..candidates]
            .last()
            .filter(|r| r.interval.overlaps(interval))
    }

    /// `checkSlot` predicate: true iff nothing overlaps `interval`
    #[must_use]
    pub fn is_free(&self, machine: &MachineName, interval: &SlotInterval) -> bool {
        self.conflict(machine, interval).is_none()
    }

    /// # Errors
    ///
    /// [`LedgerError::SlotConflict`] naming the reservation in the way.
    pub fn ensure_free(&self, machine: &MachineName, interval: &SlotInterval) -> Result<(), LedgerError> {
        match self.conflict(machine, interval) {
            Some(existing) => Err(LedgerError::SlotConflict {
                machine: machine.clone(),
                conflicting: existing.id,
            }),
            None => Ok(()),
        }
    }

    /// The reservation whose interval contains `time`, if any
    #[must_use]
    pub fn occupant(&self, machine: &MachineName, time: ClockTime) -> Option<&Reservation> {
        let booked = self.reservations(machine);
        let started = booked.partition_point(|r| r.interval.start() <= time);
        booked[..started].last().filter(|r| r.interval.contains(time))
    }

    /// Stores a reservation that already passed [`SlotLedger::ensure_free`]
    pub(crate) fn insert(&mut self, reservation: Reservation) {
        if reservation.id >= self.next_id {
            self.next_id = reservation.id.next();
        }
        let booked = self.by_machine.entry(reservation.machine.clone()).or_default();
        let position = booked.partition_point(|r| r.interval.start() < reservation.interval.start());
        booked.insert(position, reservation);
    }
}

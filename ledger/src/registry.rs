//! Machine registry: the set of bookable machines.

use crate::error::LedgerError;
use crate::types::{Machine, MachineName};
use std::collections::BTreeMap;

/// Registered machines, keyed by name
///
/// Machines are never removed; once [`MachineRegistry::exists`] is true for a
/// name it stays true.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MachineRegistry {
    machines: BTreeMap<MachineName, Machine>,
}

impl MachineRegistry {
    /// Creates an empty registry
    #[must_use]
    pub const fn new() -> Self {
        Self {
            machines: BTreeMap::new(),
        }
    }

    /// `machineExists`: pure query, available to any caller
    #[must_use]
    pub fn exists(&self, name: &MachineName) -> bool {
        self.machines.contains_key(name)
    }

    /// Number of registered machines
    #[must_use]
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    /// True if no machine is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &MachineName> {
        self.machines.keys()
    }

    /// # Errors
    ///
    /// [`LedgerError::UnknownMachine`] if `name` was never added.
    pub fn ensure_registered(&self, name: &MachineName) -> Result<&Machine, LedgerError> {
        self.machines
            .get(name)
            .ok_or_else(|| LedgerError::UnknownMachine(name.clone()))
    }

    /// # Errors
    ///
    /// [`LedgerError::DuplicateMachine`] if `name` is already registered.
    /// Re-adding is an error, not a no-op.
    pub fn ensure_absent(&self, name: &MachineName) -> Result<(), LedgerError> {
        if self.exists(name) {
            return Err(LedgerError::DuplicateMachine(name.clone()));
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, machine: Machine) {
        self.machines.insert(machine.name.clone(), machine);
    }
}

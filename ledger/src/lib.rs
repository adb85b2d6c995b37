//! Machine reservation and access-control ledger.
//!
//! The ledger decides which machines exist, whether a time slot may be
//! booked, who currently has access, how bookings are paid for, and when the
//! collected funds are released to the operator. It is built from five
//! components:
//!
//! - [`registry`]: the set of bookable machines
//! - [`slots`]: reservations per machine, never overlapping
//! - [`access`]: occupancy queries
//! - [`treasury`]: slot price and custodial balance
//! - [`auth`]: operator-only guard for admin operations
//!
//! # Architecture
//!
//! ```text
//!  caller ──► LedgerService ──(write lock)──► LedgerReducer::decide
//!                  │                                │
//!                  │                         LedgerEvent
//!                  │                                │
//!                  ├──► EventStore::append_events ◄─┘
//!                  │
//!                  └──► LedgerReducer::apply ──► LedgerState
//! ```
//!
//! A rejected command and a failed journal append both leave the state as it
//! was. Reopening the service on the same journal replays every event and
//! rebuilds identical state.
//!
//! The demo binary is behind the `demo` feature:
//! `cargo run -p machine-ledger --features demo`.
//!
//! # Quick Start
//!
//! ```no_run
//! use machine_ledger::{AccountId, Amount, LedgerConfig, LedgerEnvironment, LedgerService, MachineName};
//! use machine_ledger_testing::InMemoryEventStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let operator = AccountId::from("gym-owner");
//! let (env, _payouts) = LedgerEnvironment::in_memory();
//! let ledger = LedgerService::open(
//!     &LedgerConfig::new(operator.clone()),
//!     env,
//!     Arc::new(InMemoryEventStore::new()),
//! )
//! .await?;
//!
//! ledger.add_machine(&operator, MachineName::from("Rower")).await?;
//! let id = ledger
//!     .book(&AccountId::from("member"), MachineName::from("Rower"), 900, 930, Amount::new(100))
//!     .await?;
//! assert!(ledger.check_access(&MachineName::from("Rower"), 915).await?);
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod auth;
pub mod config;
pub mod environment;
pub mod error;
pub mod reducer;
pub mod registry;
pub mod service;
pub mod slots;
pub mod treasury;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigError, LedgerConfig};
pub use environment::{InMemoryPayouts, LedgerEnvironment, PayoutError, Payouts};
pub use error::LedgerError;
pub use reducer::{LedgerReducer, LedgerState};
pub use service::LedgerService;
pub use types::{
    AccountId, Amount, ClockTime, LedgerAction, LedgerCommand, LedgerEvent, Machine,
    MachineName, Reservation, ReservationId, SlotInterval,
};

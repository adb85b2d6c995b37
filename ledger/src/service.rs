//! Durable, serialized call surface of the ledger.
//!
//! Every mutating operation runs under the write lock:
//!
//! 1. decide the event against the current state
//! 2. append it to the journal at the expected version
//! 3. apply it to state
//!
//! If the append fails, step 3 never happens and the caller gets
//! [`LedgerError::Journal`]. Queries take the read lock and see the last
//! committed state.
//!
//! `withdraw` keeps the lock through the payout. A payout that fails is
//! journaled as `WithdrawalReversed` before the lock is released, so no
//! reader ever sees a treasury that was drained without being paid.

use crate::config::LedgerConfig;
use crate::environment::LedgerEnvironment;
use crate::error::LedgerError;
use crate::reducer::{LedgerReducer, LedgerState};
use crate::types::{AccountId, Amount, LedgerEvent, MachineName, Reservation, ReservationId};
use machine_ledger_core::environment::Clock;
use machine_ledger_core::event::{Event, SerializedEvent};
use machine_ledger_core::event_store::EventStore;
use machine_ledger_core::stream::{StreamId, Version};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

/// Committed state and the journal version it reflects
#[derive(Debug)]
struct Committed {
    state: LedgerState,
    version: Version,
}

/// The machine ledger, backed by an event journal
pub struct LedgerService {
    committed: RwLock<Committed>,
    journal: Arc<dyn EventStore>,
    stream_id: StreamId,
    env: LedgerEnvironment,
}

impl LedgerService {
    /// Opens the ledger on `config.stream_id`, replaying whatever the journal holds
    ///
    /// An empty stream is initialized with a `LedgerOpened` event carrying the
    /// configured operator and slot price. An existing stream keeps the
    /// operator it was opened with.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Journal`] if the stream cannot be loaded, decoded or
    /// initialized.
    #[tracing::instrument(skip_all, fields(stream = %config.stream_id))]
    pub async fn open(
        config: &LedgerConfig,
        env: LedgerEnvironment,
        journal: Arc<dyn EventStore>,
    ) -> Result<Self, LedgerError> {
        let stream_id = config.stream_id.clone();
        let recorded = journal.load_events(stream_id.clone(), None).await?;
        debug!(events = recorded.len(), "Loaded journal");

        let mut state = LedgerState::new(config.operator.clone(), config.slot_price);
        let version = if recorded.is_empty() {
            let genesis = LedgerEvent::LedgerOpened {
                operator: config.operator.clone(),
                slot_price: config.slot_price,
                opened_at: env.clock.now(),
            };
            let serialized = SerializedEvent::from_event(&genesis, None)?;
            let version = journal
                .append_events(stream_id.clone(), Some(Version::INITIAL), vec![serialized])
                .await?;
            LedgerReducer::apply(&mut state, &genesis);
            info!(operator = %config.operator, slot_price = %config.slot_price, "Opened new ledger");
            version
        } else {
            for serialized in &recorded {
                trace!(event = %serialized, "Replaying");
                let event: LedgerEvent = serialized.decode()?;
                LedgerReducer::apply(&mut state, &event);
            }
            if *state.operator() != config.operator {
                warn!(
                    configured = %config.operator,
                    recorded = %state.operator(),
                    "Configured operator differs from the journal, keeping the journal's"
                );
            }
            info!(
                machines = state.registry.len(),
                reservations = state.slots.len(),
                "Replayed ledger"
            );
            Version::new(recorded.len() as u64)
        };

        Ok(Self {
            committed: RwLock::new(Committed { state, version }),
            journal,
            stream_id,
            env,
        })
    }

    /// Decides, journals and applies one event under the write lock
    async fn commit<T, F>(&self, caller: &AccountId, operation: &'static str, decide: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: FnOnce(&LedgerState, &LedgerEnvironment) -> Result<(T, LedgerEvent), LedgerError> + Send,
    {
        metrics::counter!("ledger.commands.total", "operation" => operation).increment(1);

        let mut committed = self.committed.write().await;
        let (outcome, event) = decide(&committed.state, &self.env).map_err(|e| Self::rejected(operation, e))?;
        self.record(&mut committed, caller, operation, &event).await?;
        Ok(outcome)
    }

    /// Appends `event` at the committed version, then applies it
    async fn record(
        &self,
        committed: &mut Committed,
        caller: &AccountId,
        operation: &'static str,
        event: &LedgerEvent,
    ) -> Result<(), LedgerError> {
        let metadata = serde_json::json!({ "caller": caller.as_str() });
        let serialized = SerializedEvent::from_event(event, Some(metadata))
            .map_err(|e| Self::rejected(operation, e.into()))?;

        let started = Instant::now();
        let appended = self
            .journal
            .append_events(self.stream_id.clone(), Some(committed.version), vec![serialized])
            .await;
        metrics::histogram!("ledger.journal.append_seconds").record(started.elapsed().as_secs_f64());

        let version = appended.map_err(|e| Self::rejected(operation, e.into()))?;
        debug!(%version, event = event.event_type(), "Journal append succeeded");

        LedgerReducer::apply(&mut committed.state, event);
        committed.version = version;
        Ok(())
    }

    fn rejected(operation: &'static str, error: LedgerError) -> LedgerError {
        let kind = error.kind();
        metrics::counter!("ledger.commands.rejected", "operation" => operation, "kind" => kind).increment(1);
        if matches!(error, LedgerError::Journal(_)) {
            error!(operation, kind, %error, "Commit failed, nothing applied");
        } else if matches!(error, LedgerError::Payout(_)) {
            error!(operation, kind, %error, "Payout failed, withdrawal reversed");
        } else {
            warn!(operation, kind, %error, "Command rejected");
        }
        error
    }

    // ========== Operations ==========

    /// `addMachine`: operator registers a machine
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::DuplicateMachine`] or
    /// [`LedgerError::Journal`].
    #[tracing::instrument(skip_all, fields(caller = %caller, machine = %name))]
    pub async fn add_machine(&self, caller: &AccountId, name: MachineName) -> Result<(), LedgerError> {
        self.commit(caller, "add_machine", |state, env| {
            let machine = LedgerReducer::decide_add_machine(state, env, caller, name)?;
            Ok(((), LedgerEvent::MachineAdded { machine }))
        })
        .await?;
        info!("Machine added");
        Ok(())
    }

    /// `checkMachine` / `machineExists`
    pub async fn check_machine(&self, name: &MachineName) -> bool {
        self.committed.read().await.state.machine_exists(name)
    }

    /// `book`: reserves `[start, end)` on `machine`, paying `payment`
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownMachine`], [`LedgerError::InvalidInterval`],
    /// [`LedgerError::SlotConflict`], [`LedgerError::InsufficientPayment`],
    /// [`LedgerError::TreasuryOverflow`] or [`LedgerError::Journal`].
    #[tracing::instrument(skip_all, fields(caller = %caller, machine = %machine, start = start, end = end))]
    pub async fn book(
        &self,
        caller: &AccountId,
        machine: MachineName,
        start: u16,
        end: u16,
        payment: Amount,
    ) -> Result<ReservationId, LedgerError> {
        let id = self
            .commit(caller, "book", |state, env| {
                let reservation =
                    LedgerReducer::decide_booking(state, env, caller, machine, start, end, payment)?;
                Ok((reservation.id, LedgerEvent::SlotBooked { reservation }))
            })
            .await?;
        metrics::counter!("ledger.bookings.total").increment(1);
        info!(reservation = %id, "Slot booked");
        Ok(id)
    }

    /// `checkSlot`: true iff nothing on `name` overlaps `[start, end)`
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownMachine`] or [`LedgerError::InvalidInterval`].
    pub async fn check_slot(&self, name: &MachineName, start: u16, end: u16) -> Result<bool, LedgerError> {
        self.committed.read().await.state.check_slot(name, start, end)
    }

    /// `checkAccess`: true iff `name` is reserved at `time`
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownMachine`] or [`LedgerError::InvalidTime`].
    pub async fn check_access(&self, name: &MachineName, time: u16) -> Result<bool, LedgerError> {
        self.committed.read().await.state.check_access(name, time)
    }

    /// `setSlotPrice`: operator replaces the price for later bookings
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::InvalidPrice`] or
    /// [`LedgerError::Journal`].
    #[tracing::instrument(skip_all, fields(caller = %caller, price = price))]
    pub async fn set_slot_price(&self, caller: &AccountId, price: i128) -> Result<(), LedgerError> {
        self.commit(caller, "set_slot_price", |state, env| {
            let price = LedgerReducer::decide_price(state, caller, price)?;
            Ok((
                (),
                LedgerEvent::SlotPriceSet {
                    price,
                    set_at: env.clock.now(),
                },
            ))
        })
        .await?;
        info!("Slot price set");
        Ok(())
    }

    /// `withdraw`: pays the whole treasury to the operator
    ///
    /// Returns the amount paid out. If the payout fails, the withdrawal is
    /// reversed in the journal and the treasury keeps its balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::NothingToWithdraw`],
    /// [`LedgerError::Payout`] or [`LedgerError::Journal`].
    #[tracing::instrument(skip_all, fields(caller = %caller))]
    pub async fn withdraw(&self, caller: &AccountId) -> Result<Amount, LedgerError> {
        metrics::counter!("ledger.commands.total", "operation" => "withdraw").increment(1);

        let mut committed = self.committed.write().await;
        let amount = LedgerReducer::decide_withdrawal(&committed.state, caller)
            .map_err(|e| Self::rejected("withdraw", e))?;
        let to = committed.state.operator().clone();

        let withdrawn = LedgerEvent::FundsWithdrawn {
            to: to.clone(),
            amount,
            withdrawn_at: self.env.clock.now(),
        };
        self.record(&mut committed, caller, "withdraw", &withdrawn).await?;

        if let Err(failure) = self.env.payouts.credit(&to, amount) {
            let reversal = LedgerReducer::reversal(&self.env, to, amount, &failure);
            if let Err(journal) = self.record(&mut committed, caller, "withdraw", &reversal).await {
                error!(%amount, %journal, "Unpaid withdrawal could not be reversed");
            }
            return Err(Self::rejected("withdraw", failure.into()));
        }

        metrics::counter!("ledger.treasury.withdrawn").increment(u64::try_from(amount.value()).unwrap_or(u64::MAX));
        info!(to = %to, amount = %amount, "Treasury withdrawn");
        Ok(amount)
    }

    // ========== Queries ==========

    /// Registered machine names, sorted
    pub async fn machines(&self) -> Vec<MachineName> {
        self.committed.read().await.state.registry.names().cloned().collect()
    }

    /// Reservations on `name`, ordered by start time
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownMachine`] if the machine is not registered.
    pub async fn reservations(&self, name: &MachineName) -> Result<Vec<Reservation>, LedgerError> {
        let committed = self.committed.read().await;
        committed.state.registry.ensure_registered(name)?;
        Ok(committed.state.slots.reservations(name).to_vec())
    }

    /// Price the next booking must attach
    pub async fn slot_price(&self) -> Amount {
        self.committed.read().await.state.treasury.slot_price()
    }

    /// Current custodial balance
    pub async fn treasury_balance(&self) -> Amount {
        self.committed.read().await.state.treasury.balance()
    }

    /// The operator identity
    pub async fn operator(&self) -> AccountId {
        self.committed.read().await.state.operator().clone()
    }

    /// Journal version the state reflects
    pub async fn version(&self) -> Version {
        self.committed.read().await.version
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> LedgerState {
        self.committed.read().await.state.clone()
    }

    /// Journal stream this ledger writes to
    #[must_use]
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }
}

impl std::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService")
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::{InMemoryPayouts, PayoutError, Payouts};
    use machine_ledger_testing::{FailingEventStore, InMemoryEventStore, test_clock};

    fn operator() -> AccountId {
        AccountId::from("operator")
    }

    fn env() -> (LedgerEnvironment, Arc<InMemoryPayouts>) {
        let payouts = Arc::new(InMemoryPayouts::new());
        (
            LedgerEnvironment::new(Arc::new(test_clock()), payouts.clone()),
            payouts,
        )
    }

    #[tokio::test]
    async fn new_stream_gets_genesis_event() {
        let journal = Arc::new(InMemoryEventStore::new());
        let config = LedgerConfig::new(operator());
        let service = LedgerService::open(&config, env().0, journal.clone()).await.unwrap();

        assert_eq!(journal.event_types(&config.stream_id), vec!["LedgerOpened.v1"]);
        assert_eq!(service.version().await, Version::new(1));
        assert_eq!(service.slot_price().await, Amount::new(100));
    }

    #[tokio::test]
    async fn rejection_does_not_touch_journal() {
        let journal = Arc::new(InMemoryEventStore::new());
        let config = LedgerConfig::new(operator());
        let service = LedgerService::open(&config, env().0, journal.clone()).await.unwrap();

        let result = service
            .add_machine(&AccountId::from("member"), MachineName::from("A"))
            .await;

        assert_eq!(
            result,
            Err(LedgerError::Unauthorized {
                caller: AccountId::from("member"),
            })
        );
        assert_eq!(journal.len(&config.stream_id), 1);
    }

    #[tokio::test]
    async fn failed_append_leaves_state_untouched() {
        let journal = Arc::new(FailingEventStore::fail_after(1));
        let config = LedgerConfig::new(operator());
        let service = LedgerService::open(&config, env().0, journal).await.unwrap();

        let result = service.add_machine(&operator(), MachineName::from("A")).await;

        assert!(matches!(result, Err(LedgerError::Journal(_))));
        assert!(!service.check_machine(&MachineName::from("A")).await);
        assert_eq!(service.version().await, Version::new(1));
    }

    #[tokio::test]
    async fn withdraw_pays_operator() {
        let journal = Arc::new(InMemoryEventStore::new());
        let (env, payouts) = env();
        let service = LedgerService::open(&LedgerConfig::new(operator()), env, journal)
            .await
            .unwrap();

        service.add_machine(&operator(), MachineName::from("A")).await.unwrap();
        service
            .book(&AccountId::from("member"), MachineName::from("A"), 900, 930, Amount::new(100))
            .await
            .unwrap();

        assert_eq!(service.withdraw(&operator()).await, Ok(Amount::new(100)));
        assert_eq!(payouts.total_for(&operator()), Amount::new(100));
        assert_eq!(service.treasury_balance().await, Amount::ZERO);
    }

    struct RejectingPayouts;

    impl Payouts for RejectingPayouts {
        fn credit(&self, _to: &AccountId, _amount: Amount) -> Result<(), PayoutError> {
            Err(PayoutError::Unavailable("bank offline".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_payout_keeps_treasury() {
        let journal = Arc::new(InMemoryEventStore::new());
        let config = LedgerConfig::new(operator());
        let env = LedgerEnvironment::new(Arc::new(test_clock()), Arc::new(RejectingPayouts));
        let service = LedgerService::open(&config, env, journal.clone()).await.unwrap();

        service.add_machine(&operator(), MachineName::from("A")).await.unwrap();
        service
            .book(&AccountId::from("member"), MachineName::from("A"), 900, 930, Amount::new(100))
            .await
            .unwrap();

        assert_eq!(
            service.withdraw(&operator()).await,
            Err(LedgerError::Payout("Payout backend unavailable: bank offline".to_string()))
        );
        assert_eq!(service.treasury_balance().await, Amount::new(100));
        assert_eq!(
            journal.event_types(&config.stream_id)[3..],
            ["FundsWithdrawn.v1", "WithdrawalReversed.v1"]
        );
    }
}

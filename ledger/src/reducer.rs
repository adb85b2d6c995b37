//! Ledger aggregate and its reducer.
//!
//! Commands are validated against the current state (`decide`) and turned into
//! [`LedgerEvent`]s, which are the only thing that changes state (`apply`).
//! Replaying every recorded event in order from a fresh state rebuilds the
//! same ledger.

use crate::access;
use crate::auth::AuthorizationGate;
use crate::environment::{LedgerEnvironment, PayoutError};
use crate::error::LedgerError;
use crate::registry::MachineRegistry;
use crate::slots::SlotLedger;
use crate::treasury::Treasury;
use crate::types::{
    AccountId, Amount, LedgerAction, LedgerCommand, LedgerEvent, Machine, MachineName,
    Reservation, SlotInterval,
};
use machine_ledger_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};

/// The whole ledger as one owned aggregate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerState {
    /// Operator check for admin operations
    pub gate: AuthorizationGate,
    /// Registered machines
    pub registry: MachineRegistry,
    /// Reservations per machine
    pub slots: SlotLedger,
    /// Slot price and custodial balance
    pub treasury: Treasury,
    /// Last rejection seen by the reducer, cleared by the next accepted event
    pub last_error: Option<LedgerError>,
}

impl LedgerState {
    /// Creates an empty ledger owned by `operator`
    #[must_use]
    pub fn new(operator: AccountId, slot_price: Amount) -> Self {
        Self {
            gate: AuthorizationGate::new(operator),
            registry: MachineRegistry::new(),
            slots: SlotLedger::new(),
            treasury: Treasury::new(slot_price),
            last_error: None,
        }
    }

    /// The operator identity
    #[must_use]
    pub const fn operator(&self) -> &AccountId {
        self.gate.operator()
    }

    /// `machineExists`
    #[must_use]
    pub fn machine_exists(&self, name: &MachineName) -> bool {
        self.registry.exists(name)
    }

    /// `checkSlot`
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownMachine`] or [`LedgerError::InvalidInterval`].
    pub fn check_slot(&self, name: &MachineName, start: u16, end: u16) -> Result<bool, LedgerError> {
        self.registry.ensure_registered(name)?;
        let interval = SlotInterval::from_military(start, end)?;
        Ok(self.slots.is_free(name, &interval))
    }

    /// `checkAccess`
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownMachine`] or [`LedgerError::InvalidTime`].
    pub fn check_access(&self, name: &MachineName, time: u16) -> Result<bool, LedgerError> {
        access::check_access(&self.registry, &self.slots, name, time)
    }
}

/// Reducer for the machine ledger
#[derive(Clone, Debug, Default)]
pub struct LedgerReducer;

impl LedgerReducer {
    /// Creates a new `LedgerReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates `addMachine` and builds the new machine
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], then [`LedgerError::DuplicateMachine`].
    pub fn decide_add_machine(
        state: &LedgerState,
        env: &LedgerEnvironment,
        caller: &AccountId,
        name: MachineName,
    ) -> Result<Machine, LedgerError> {
        state.gate.authorize(caller)?;
        state.registry.ensure_absent(&name)?;
        Ok(Machine {
            name,
            added_at: env.clock.now(),
        })
    }

    /// Validates `book` and builds the reservation it would create
    ///
    /// # Errors
    ///
    /// In order: [`LedgerError::UnknownMachine`],
    /// [`LedgerError::InvalidInterval`], [`LedgerError::SlotConflict`],
    /// [`LedgerError::InsufficientPayment`], [`LedgerError::TreasuryOverflow`].
    pub fn decide_booking(
        state: &LedgerState,
        env: &LedgerEnvironment,
        caller: &AccountId,
        machine: MachineName,
        start: u16,
        end: u16,
        payment: Amount,
    ) -> Result<Reservation, LedgerError> {
        state.registry.ensure_registered(&machine)?;
        let interval = SlotInterval::from_military(start, end)?;
        state.slots.ensure_free(&machine, &interval)?;
        state.treasury.ensure_payment(payment)?;
        state.treasury.ensure_credit(payment)?;

        Ok(Reservation {
            id: state.slots.next_id(),
            machine,
            interval,
            booked_by: caller.clone(),
            paid: state.treasury.slot_price(),
            booked_at: env.clock.now(),
        })
    }

    /// Validates `setSlotPrice`
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], then [`LedgerError::InvalidPrice`].
    pub fn decide_price(state: &LedgerState, caller: &AccountId, price: i128) -> Result<Amount, LedgerError> {
        state.gate.authorize(caller)?;
        Treasury::validate_price(price)
    }

    /// Validates `withdraw` and returns the amount to pay out
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], then [`LedgerError::NothingToWithdraw`].
    pub fn decide_withdrawal(state: &LedgerState, caller: &AccountId) -> Result<Amount, LedgerError> {
        state.gate.authorize(caller)?;
        state.treasury.ensure_withdrawable()
    }

    /// The event that puts an unpaid withdrawal back into the treasury
    #[must_use]
    pub fn reversal(
        env: &LedgerEnvironment,
        to: AccountId,
        amount: Amount,
        failure: &PayoutError,
    ) -> LedgerEvent {
        LedgerEvent::WithdrawalReversed {
            to,
            amount,
            reason: failure.to_string(),
            reversed_at: env.clock.now(),
        }
    }

    /// Pays out a recorded withdrawal, feeding back a reversal if the payout fails
    fn payout(env: &LedgerEnvironment, to: AccountId, amount: Amount) -> Effect<LedgerAction> {
        let env = env.clone();
        Effect::Future(Box::pin(async move {
            env.payouts
                .credit(&to, amount)
                .err()
                .map(|failure| LedgerAction::Recorded(Self::reversal(&env, to, amount, &failure)))
        }))
    }

    /// Turns a command into the event it would record
    ///
    /// # Errors
    ///
    /// The [`LedgerError`] the command is rejected with. State is not touched.
    pub fn decide(
        state: &LedgerState,
        command: LedgerCommand,
        env: &LedgerEnvironment,
    ) -> Result<LedgerEvent, LedgerError> {
        match command {
            LedgerCommand::AddMachine { caller, name } => {
                Self::decide_add_machine(state, env, &caller, name)
                    .map(|machine| LedgerEvent::MachineAdded { machine })
            }
            LedgerCommand::Book {
                caller,
                machine,
                start,
                end,
                payment,
            } => Self::decide_booking(state, env, &caller, machine, start, end, payment)
                .map(|reservation| LedgerEvent::SlotBooked { reservation }),
            LedgerCommand::SetSlotPrice { caller, price } => {
                Self::decide_price(state, &caller, price).map(|price| LedgerEvent::SlotPriceSet {
                    price,
                    set_at: env.clock.now(),
                })
            }
            LedgerCommand::Withdraw { caller } => {
                Self::decide_withdrawal(state, &caller).map(|amount| LedgerEvent::FundsWithdrawn {
                    to: state.operator().clone(),
                    amount,
                    withdrawn_at: env.clock.now(),
                })
            }
        }
    }

    /// Applies a recorded event to state
    pub fn apply(state: &mut LedgerState, event: &LedgerEvent) {
        match event {
            LedgerEvent::LedgerOpened {
                operator,
                slot_price,
                ..
            } => {
                state.gate = AuthorizationGate::new(operator.clone());
                state.treasury.set_price(*slot_price);
            }
            LedgerEvent::MachineAdded { machine } => {
                state.registry.insert(machine.clone());
            }
            LedgerEvent::SlotBooked { reservation } => {
                state.treasury.credit(reservation.paid);
                state.slots.insert(reservation.clone());
            }
            LedgerEvent::SlotPriceSet { price, .. } => {
                state.treasury.set_price(*price);
            }
            LedgerEvent::FundsWithdrawn { .. } => {
                state.treasury.drain();
            }
            LedgerEvent::WithdrawalReversed { amount, .. } => {
                state.treasury.restore(*amount);
            }
        }
        state.last_error = None;
    }
}

impl Reducer for LedgerReducer {
    type State = LedgerState;
    type Action = LedgerAction;
    type Environment = LedgerEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            LedgerAction::Command(command) => match Self::decide(state, command, env) {
                Ok(event) => {
                    Self::apply(state, &event);
                    if let LedgerEvent::FundsWithdrawn { to, amount, .. } = event {
                        return smallvec![Self::payout(env, to, amount)];
                    }
                }
                Err(error) => state.last_error = Some(error),
            },

            // ========== Events ==========
            LedgerAction::Recorded(event) => Self::apply(state, &event),
            LedgerAction::ValidationFailed { error } => state.last_error = Some(error),
        }

        SmallVec::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::{InMemoryPayouts, Payouts};
    use crate::types::ReservationId;
    use machine_ledger_testing::{ReducerTest, assertions, test_clock};
    use std::sync::Arc;

    fn test_env() -> LedgerEnvironment {
        LedgerEnvironment::new(Arc::new(test_clock()), Arc::new(InMemoryPayouts::new()))
    }

    fn operator() -> AccountId {
        AccountId::from("operator")
    }

    fn member() -> AccountId {
        AccountId::from("member")
    }

    fn add(name: &str) -> LedgerAction {
        LedgerCommand::AddMachine {
            caller: operator(),
            name: MachineName::from(name),
        }
        .into()
    }

    fn book(machine: &str, start: u16, end: u16, payment: u128) -> LedgerAction {
        LedgerCommand::Book {
            caller: member(),
            machine: MachineName::from(machine),
            start,
            end,
            payment: Amount::new(payment),
        }
        .into()
    }

    fn fresh_state() -> LedgerState {
        LedgerState::new(operator(), Amount::new(100))
    }

    #[test]
    fn operator_adds_machine() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(test_env())
            .given_state(fresh_state())
            .when_action(add("A"))
            .then_state(|state| {
                assert!(state.machine_exists(&MachineName::from("A")));
                assert_eq!(state.last_error, None);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn member_cannot_add_machine() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(test_env())
            .given_state(fresh_state())
            .when_action(
                LedgerCommand::AddMachine {
                    caller: member(),
                    name: MachineName::from("A"),
                }
                .into(),
            )
            .then_state(|state| {
                assert!(!state.machine_exists(&MachineName::from("A")));
                assert_eq!(
                    state.last_error,
                    Some(LedgerError::Unauthorized { caller: member() })
                );
            })
            .run();
    }

    #[test]
    fn duplicate_machine_is_rejected() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(test_env())
            .given_state(fresh_state())
            .when_action(add("A"))
            .when_action(add("A"))
            .then_state(|state| {
                assert_eq!(state.registry.len(), 1);
                assert_eq!(
                    state.last_error,
                    Some(LedgerError::DuplicateMachine(MachineName::from("A")))
                );
            })
            .run();
    }

    #[test]
    fn booking_captures_payment() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(test_env())
            .given_state(fresh_state())
            .when_action(add("A"))
            .when_action(book("A", 900, 930, 100))
            .then_state(|state| {
                let booked = state.slots.reservations(&MachineName::from("A"));
                assert_eq!(booked.len(), 1);
                assert_eq!(booked[0].id, ReservationId::FIRST);
                assert_eq!(booked[0].booked_by, member());
                assert_eq!(booked[0].booked_at, test_clock().now());
                assert_eq!(state.treasury.balance(), Amount::new(100));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn booking_precedence() {
        let state = {
            let mut state = fresh_state();
            LedgerReducer::new().reduce(&mut state, add("A"), &test_env());
            LedgerReducer::new().reduce(&mut state, book("A", 900, 930, 100), &test_env());
            state
        };
        let env = test_env();
        let decide = |action: LedgerAction| match action {
            LedgerAction::Command(command) => LedgerReducer::decide(&state, command, &env).err(),
            _ => None,
        };

        // unknown machine wins over a bad interval
        assert_eq!(
            decide(book("B", 1000, 900, 0)),
            Some(LedgerError::UnknownMachine(MachineName::from("B")))
        );
        // bad interval wins over a bad payment
        assert_eq!(
            decide(book("A", 1000, 900, 0)),
            Some(LedgerError::InvalidInterval { start: 1000, end: 900 })
        );
        // conflict wins over a bad payment
        assert_eq!(
            decide(book("A", 915, 945, 0)),
            Some(LedgerError::SlotConflict {
                machine: MachineName::from("A"),
                conflicting: ReservationId::FIRST,
            })
        );
        assert_eq!(
            decide(book("A", 930, 1000, 150)),
            Some(LedgerError::InsufficientPayment {
                required: Amount::new(100),
                attached: Amount::new(150),
            })
        );
        assert_eq!(decide(book("A", 930, 1000, 100)), None);
    }

    #[test]
    fn price_change_is_not_retroactive() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(test_env())
            .given_state(fresh_state())
            .when_action(add("A"))
            .when_action(book("A", 900, 930, 100))
            .when_action(
                LedgerCommand::SetSlotPrice {
                    caller: operator(),
                    price: 250,
                }
                .into(),
            )
            .when_action(book("A", 930, 1000, 250))
            .then_state(|state| {
                let paid: Vec<Amount> = state
                    .slots
                    .reservations(&MachineName::from("A"))
                    .iter()
                    .map(|r| r.paid)
                    .collect();
                assert_eq!(paid, vec![Amount::new(100), Amount::new(250)]);
                assert_eq!(state.treasury.slot_price(), Amount::new(250));
                assert_eq!(state.treasury.balance(), Amount::new(350));
            })
            .run();
    }

    #[test]
    fn negative_price_leaves_price_unchanged() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(test_env())
            .given_state(fresh_state())
            .when_action(
                LedgerCommand::SetSlotPrice {
                    caller: operator(),
                    price: -5,
                }
                .into(),
            )
            .then_state(|state| {
                assert_eq!(state.treasury.slot_price(), Amount::new(100));
                assert_eq!(state.last_error, Some(LedgerError::InvalidPrice(-5)));
            })
            .run();
    }

    #[test]
    fn withdraw_drains_then_rejects() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(test_env())
            .given_state(fresh_state())
            .when_action(add("A"))
            .when_action(book("A", 900, 930, 100))
            .when_action(LedgerCommand::Withdraw { caller: operator() }.into())
            .then_state(|state| {
                assert_eq!(state.treasury.balance(), Amount::ZERO);
                assert_eq!(state.treasury.total_withdrawn(), Amount::new(100));
                assert_eq!(state.last_error, None);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();

        ReducerTest::new(LedgerReducer::new())
            .with_env(test_env())
            .given_state(fresh_state())
            .when_action(LedgerCommand::Withdraw { caller: operator() }.into())
            .then_state(|state| {
                assert_eq!(state.last_error, Some(LedgerError::NothingToWithdraw));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn replaying_events_rebuilds_state() {
        let env = test_env();
        let mut live = fresh_state();
        let mut events = vec![LedgerEvent::LedgerOpened {
            operator: operator(),
            slot_price: Amount::new(100),
            opened_at: env.clock.now(),
        }];

        for action in [add("A"), add("B"), book("A", 900, 930, 100), book("B", 1200, 1300, 100)] {
            if let LedgerAction::Command(command) = action {
                let event = LedgerReducer::decide(&live, command, &env).unwrap();
                LedgerReducer::apply(&mut live, &event);
                events.push(event);
            }
        }

        let mut replayed = LedgerState::new(AccountId::from("placeholder"), Amount::ZERO);
        for event in events {
            LedgerReducer::new().reduce(&mut replayed, LedgerAction::Recorded(event), &env);
        }

        assert_eq!(replayed, live);
        assert_eq!(replayed.check_access(&MachineName::from("B"), 1230), Ok(true));
    }

    struct RefusingPayouts;

    impl Payouts for RefusingPayouts {
        fn credit(&self, to: &AccountId, _amount: Amount) -> Result<(), PayoutError> {
            Err(PayoutError::Rejected {
                to: to.clone(),
                reason: "account frozen".to_string(),
            })
        }
    }

    async fn withdraw_and_settle(env: &LedgerEnvironment) -> LedgerState {
        let mut state = fresh_state();
        let reducer = LedgerReducer::new();
        reducer.reduce(&mut state, add("A"), env);
        reducer.reduce(&mut state, book("A", 900, 930, 100), env);

        let effects = reducer.reduce(&mut state, LedgerCommand::Withdraw { caller: operator() }.into(), env);
        for effect in effects {
            if let Effect::Future(payout) = effect {
                if let Some(feedback) = payout.await {
                    reducer.reduce(&mut state, feedback, env);
                }
            }
        }
        state
    }

    #[tokio::test]
    async fn payout_effect_credits_operator() {
        let payouts = Arc::new(InMemoryPayouts::new());
        let env = LedgerEnvironment::new(Arc::new(test_clock()), payouts.clone());

        let state = withdraw_and_settle(&env).await;

        assert_eq!(state.treasury.balance(), Amount::ZERO);
        assert_eq!(payouts.total_for(&operator()), Amount::new(100));
    }

    #[tokio::test]
    async fn refused_payout_feeds_back_a_reversal() {
        let env = LedgerEnvironment::new(Arc::new(test_clock()), Arc::new(RefusingPayouts));

        let state = withdraw_and_settle(&env).await;

        assert_eq!(state.treasury.balance(), Amount::new(100));
        assert_eq!(state.treasury.total_withdrawn(), Amount::ZERO);
        assert_eq!(state.treasury.ensure_withdrawable(), Ok(Amount::new(100)));
    }
}

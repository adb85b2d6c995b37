//! Demo of the machine ledger against an in-memory journal.
//!
//! Registers a machine, books two adjacent slots, checks availability and
//! access, then withdraws the treasury.
//!
//! Run with: `cargo run -p machine-ledger --features demo`

use machine_ledger::{
    AccountId, Amount, ConfigError, LedgerConfig, LedgerEnvironment, LedgerError, LedgerService,
    MachineName,
};
use machine_ledger_testing::InMemoryEventStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = match LedgerConfig::from_env() {
        Ok(config) => config,
        Err(ConfigError::MissingOperator) => LedgerConfig::new(AccountId::from("operator")),
        Err(error) => return Err(error.into()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    println!("=== Machine Ledger Demo ===\n");

    let (env, payouts) = LedgerEnvironment::in_memory();
    let journal = Arc::new(InMemoryEventStore::new());
    let ledger = LedgerService::open(&config, env, journal.clone()).await?;

    let operator = config.operator.clone();
    let member = AccountId::from("member");
    let machine = MachineName::from("A");
    let price = ledger.slot_price().await;

    println!("Operator {operator} registers machine {machine}");
    ledger.add_machine(&operator, machine.clone()).await?;

    let first = ledger.book(&member, machine.clone(), 900, 930, price).await?;
    println!("Booked 09:00-09:30 as {first}");

    println!(
        "Slot 09:15-09:45 free? {}",
        ledger.check_slot(&machine, 915, 945).await?
    );

    let second = ledger.book(&member, machine.clone(), 930, 1000, price).await?;
    println!("Booked 09:30-10:00 as {second}");

    for time in [929, 930, 1000] {
        println!(
            "Access at {time}? {}",
            ledger.check_access(&machine, time).await?
        );
    }

    match ledger.set_slot_price(&member, 1).await {
        Err(LedgerError::Unauthorized { caller }) => {
            println!("{caller} may not change the price ({})", ledger.slot_price().await);
        }
        other => println!("Unexpected price change result: {other:?}"),
    }

    match ledger.book(&member, MachineName::from("Z"), 900, 930, price).await {
        Err(error) => println!("Booking an unknown machine: {error}"),
        Ok(id) => println!("Unexpectedly booked {id}"),
    }

    println!("\nTreasury holds {}", ledger.treasury_balance().await);
    let paid: Amount = ledger.withdraw(&operator).await?;
    println!("Withdrew {paid} to {operator} (paid out so far: {})", payouts.total_for(&operator));

    if let Err(error) = ledger.withdraw(&operator).await {
        println!("Second withdraw: {error}");
    }

    println!(
        "\nJournal ({} events): {:?}",
        journal.len(ledger.stream_id()),
        journal.event_types(ledger.stream_id())
    );

    Ok(())
}

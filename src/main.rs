use clap::Parser;
use digistore::application::access::OperatorAccess;
use digistore::application::engine::OrderEngine;
use digistore::application::session::SessionTracker;
use digistore::config::ShopConfig;
use digistore::domain::ports::{CustomerStoreBox, OrderStoreBox};
use digistore::infrastructure::crypto_pay::CryptoPayClient;
use digistore::infrastructure::in_memory::{
    InMemoryCustomerStore, InMemoryOrderStore, InMemorySessionStore,
};
use digistore::infrastructure::notifier::LogNotifier;
use digistore::interfaces::csv::event_reader::EventReader;
use digistore::interfaces::csv::order_writer::OrderWriter;
use digistore::interfaces::dispatcher::Dispatcher;
use digistore::telemetry;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input chat events CSV file (event,actor,data)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    #[command(flatten)]
    config: ShopConfig,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(CustomerStoreBox, OrderStoreBox)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = digistore::infrastructure::rocksdb::RocksDBStore::open(db_path).into_diagnostic()?;
        return Ok((Box::new(store.clone()), Box::new(store)));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }

    Ok((
        Box::new(InMemoryCustomerStore::new()),
        Box::new(InMemoryOrderStore::new()),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();
    let cli = Cli::parse();

    let prices = cli.config.prices.price_list().into_diagnostic()?;
    let operators = cli.config.operator_ids();
    let (customers, orders) = open_stores(cli.db_path)?;

    let mut engine = OrderEngine::new(
        customers,
        orders,
        Box::new(LogNotifier::new(operators.clone())),
        prices,
    );
    match CryptoPayClient::from_config(&cli.config.crypto).into_diagnostic()? {
        Some(client) => engine = engine.with_gateway(Box::new(client)),
        None => info!("No crypto pay token configured, crypto rail disabled"),
    }
    let engine = Arc::new(engine);
    let sessions = SessionTracker::new(engine.clone(), Box::new(InMemorySessionStore::new()));
    let dispatcher = Dispatcher::new(engine.clone(), sessions, OperatorAccess::new(operators));

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = EventReader::new(file);
    for (line, event) in reader.events().enumerate() {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line + 1, error = %e, "Error reading event");
                continue;
            }
        };
        let actor = event.actor();
        let result = match event.into_action() {
            Ok(action) => dispatcher.dispatch(actor, action).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(reply) => info!(line = line + 1, %actor, %reply, "Event handled"),
            Err(e) => warn!(line = line + 1, %actor, error = %e, "Error processing event"),
        }
    }

    let orders = engine.export().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(&orders).into_diagnostic()?;

    Ok(())
}

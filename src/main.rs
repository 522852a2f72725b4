//! Orion Broker — Entry Point
//!
//! Loads configuration, initializes logging, wires the store, chain
//! client, venue adapters, hub transport, engine, and reconciler, then
//! runs until SIGINT/SIGTERM.

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

mod adapters;
mod config;
mod domain;
mod error;
mod ports;
mod usecases;

use adapters::chain::gas::GasPriceFeed;
use adapters::chain::gateway::{BlockchainGateway, GatewayConfig};
use adapters::chain::signer::OrderSigner;
use adapters::chain::OrionChainClient;
use adapters::exchange::binance::BinanceExchange;
use adapters::exchange::ExchangeRegistry;
use adapters::hub::HubWsTransport;
use adapters::persistence::FileStore;
use adapters::rest::{self, OperatorState};
use domain::token::TokenRegistry;
use ports::exchange::Exchange;
use ports::hub::{BrokerRegistration, HubInbound};
use ports::store::Store;
use usecases::engine::SubOrderEngine;
use usecases::liability::LiabilityPlanner;
use usecases::reconciler::{BalanceBook, Reconciler};
use usecases::supervisor::Broker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.broker.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.broker.name,
        production = config.chain.production,
        exchanges = config.exchanges.len(),
        "Starting Orion broker"
    );

    // Shared collaborators.
    let registry = Arc::new(TokenRegistry::from_config(&config.tokens)?);
    let store = Arc::new(FileStore::open(&config.persistence.data_dir).await?);

    let private_key = std::env::var(&config.chain.private_key_env)
        .context(format!("{} not set", config.chain.private_key_env))?;
    let matcher = Address::from_str(&config.chain.matcher_address)?;
    let contract = Address::from_str(&config.chain.contract_address)?;
    let chain_id = config.chain.chain_id();

    let chain = Arc::new(OrionChainClient::new(
        BlockchainGateway::new(GatewayConfig::new(config.chain.gateway_url.clone()))?,
        GasPriceFeed::new(config.chain.gas_feed_url.clone())?,
        OrderSigner::new(&private_key, matcher, chain_id, Arc::clone(&registry))?,
        Arc::clone(&registry),
        contract,
        chain_id,
    ));

    let mut venues: Vec<Arc<dyn Exchange>> = Vec::with_capacity(config.exchanges.len());
    for venue_config in &config.exchanges {
        venues.push(Arc::new(BinanceExchange::from_config(
            venue_config,
            Arc::clone(&registry),
        )?));
    }
    let exchanges = Arc::new(ExchangeRegistry::new(venues));

    // Transport first, handlers attached once the broker exists.
    let hub = Arc::new(HubWsTransport::new(config.hub.ws_url.clone()));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (ready_tx, ready_rx) = watch::channel(false);

    let engine = Arc::new(SubOrderEngine::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        Arc::clone(&exchanges),
        hub.clone() as Arc<dyn ports::hub::HubOutbound>,
    ));

    let balances = Arc::new(BalanceBook::default());
    let planner = LiabilityPlanner::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        Arc::clone(&exchanges),
        Arc::clone(&balances),
        config.liability.due_period_seconds,
    );
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        Arc::clone(&exchanges),
        hub.clone() as Arc<dyn ports::hub::HubOutbound>,
        Arc::clone(&engine),
        Arc::clone(&balances),
        planner,
    ));

    let registration = BrokerRegistration {
        address: ports::chain::ChainClient::address(chain.as_ref()),
        name: config.broker.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        exchanges: exchanges.ids(),
    };
    let broker = Arc::new(Broker::new(
        engine,
        reconciler,
        chain,
        hub.clone() as Arc<dyn ports::hub::HubOutbound>,
        registration,
        shutdown_tx.clone(),
    ));

    hub.attach_handlers(broker.clone() as Arc<dyn HubInbound>).await;
    let transport_handle = tokio::spawn(hub.clone().run(shutdown_tx.subscribe()));

    // State-change feed; a UI websocket layer subscribes here. Until one
    // is attached, changes land in the log.
    let mut updates = broker.engine().subscribe();
    tokio::spawn(async move {
        while let Ok(report) = updates.recv().await {
            info!(id = report.id, status = ?report.status, "Sub-order update");
        }
    });

    // Operator REST.
    let operator_state = OperatorState::new(
        store.clone() as Arc<dyn Store>,
        Arc::clone(&balances),
        ready_rx,
    );
    let bind_address = config.operator.bind_address.clone();
    let rest_handle = tokio::spawn(async move {
        if let Err(e) = rest::serve(operator_state, &bind_address).await {
            error!(error = %e, "Operator REST failed");
        }
    });

    // Authenticate and start the loops once the transport is up.
    hub.wait_connected().await?;
    broker.connect_to_hub().await?;
    let _ = ready_tx.send(true);

    // Wait for SIGINT or SIGTERM.
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
    }

    // Loops stop at their next yield; in-flight writes are durable.
    let _ = shutdown_tx.send(());
    let _ = ready_tx.send(false);

    let _ = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        transport_handle,
    )
    .await;
    rest_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

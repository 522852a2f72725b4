//! Broker Supervisor - Wiring and Lifecycle
//!
//! Owns the engine and the reconciler, authenticates to the hub by
//! signing the current time as a personal message, and manages the
//! background loop lifecycle. A transport reconnect re-authenticates but
//! does not restart the loops; they survive transport drops.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use super::engine::SubOrderEngine;
use super::reconciler::Reconciler;
use crate::domain::now_ms;
use crate::domain::order::{CreateSubOrder, StatusAck, SubOrderReport};
use crate::ports::chain::ChainClient;
use crate::ports::hub::{BrokerRegistration, HubAuth, HubInbound, HubOutbound};
use crate::ports::store::Store;

/// Top-level broker: handler set for the hub transport plus loop
/// lifecycle management.
pub struct Broker<S: Store, C: ChainClient> {
    engine: Arc<SubOrderEngine<S, C>>,
    reconciler: Arc<Reconciler<S, C>>,
    chain: Arc<C>,
    hub: Arc<dyn HubOutbound>,
    registration: BrokerRegistration,
    loops: Mutex<Vec<JoinHandle<()>>>,
    shutdown: broadcast::Sender<()>,
}

impl<S: Store, C: ChainClient> Broker<S, C> {
    pub fn new(
        engine: Arc<SubOrderEngine<S, C>>,
        reconciler: Arc<Reconciler<S, C>>,
        chain: Arc<C>,
        hub: Arc<dyn HubOutbound>,
        registration: BrokerRegistration,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            engine,
            reconciler,
            chain,
            hub,
            registration,
            loops: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    /// The lifecycle engine, for the operator surfaces.
    pub fn engine(&self) -> Arc<SubOrderEngine<S, C>> {
        Arc::clone(&self.engine)
    }

    /// Authenticate, register, and (re)start the background loops.
    pub async fn connect_to_hub(&self) -> Result<()> {
        let mut loops = self.loops.lock().await;
        for handle in loops.drain(..) {
            handle.abort();
        }

        self.authenticate().await?;
        *loops = self.reconciler.spawn_loops(&self.shutdown);

        info!(loop_count = loops.len(), "Broker connected, loops running");
        Ok(())
    }

    /// Sign the current time and present it to the hub.
    async fn authenticate(&self) -> Result<()> {
        let time = now_ms();
        let signature = self.chain.sign_auth(&time.to_string())?;
        self.hub
            .connect(HubAuth {
                address: self.chain.address(),
                time,
                signature,
            })
            .await?;
        self.hub.register(&self.registration).await?;
        Ok(())
    }
}

#[async_trait]
impl<S: Store, C: ChainClient> HubInbound for Broker<S, C> {
    async fn on_create_sub_order(&self, request: CreateSubOrder) -> Result<SubOrderReport> {
        self.engine.on_create_sub_order(request).await
    }

    async fn on_cancel_sub_order(&self, id: u64) -> Result<Option<SubOrderReport>> {
        self.engine.on_cancel_sub_order(id).await
    }

    async fn on_check_sub_order(&self, id: u64) -> Result<SubOrderReport> {
        self.engine.on_check_sub_order(id).await
    }

    async fn on_sub_order_status_accepted(&self, ack: StatusAck) -> Result<()> {
        self.engine.on_sub_order_status_accepted(ack).await
    }

    /// Re-authenticate on a reestablished transport. Loop timers are
    /// untouched.
    async fn on_reconnect(&self) -> Result<()> {
        info!("Hub transport reestablished, re-authenticating");
        self.authenticate().await
    }
}

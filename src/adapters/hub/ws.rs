//! Hub WebSocket Transport
//!
//! Maintains the connection to the aggregator hub, dispatches inbound
//! messages into the broker's `HubInbound` handler set, and implements
//! `HubOutbound` for pushes. Reconnects with backoff on drops and
//! notifies the broker through `on_reconnect` so it can re-authenticate;
//! the reconciler loops keep running across transport drops.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::domain::order::{CreateSubOrder, StatusAck, SubOrderReport};
use crate::ports::hub::{BrokerRegistration, HubAuth, HubInbound, HubOutbound};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Inbound hub messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundMessage {
    CreateSubOrder(CreateSubOrder),
    CancelSubOrder { id: u64 },
    CheckSubOrder { id: u64 },
    SubOrderStatusAccepted(StatusAck),
}

/// Outbound hub messages.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundMessage<'a> {
    Connect(&'a HubAuth),
    SubOrderStatus(&'a SubOrderReport),
    Balances { balances: serde_json::Value },
    Register(&'a BrokerRegistration),
}

/// WebSocket transport to the aggregator hub.
pub struct HubWsTransport {
    ws_url: String,
    /// Attached after the broker is constructed (mutual references).
    handlers: RwLock<Option<Arc<dyn HubInbound>>>,
    sink: Mutex<Option<WsSink>>,
    last_balances: RwLock<Option<String>>,
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
}

impl HubWsTransport {
    pub fn new(ws_url: String) -> Self {
        let (connected_tx, connected_rx) = watch::channel(false);
        Self {
            ws_url,
            handlers: RwLock::new(None),
            sink: Mutex::new(None),
            last_balances: RwLock::new(None),
            connected_tx,
            connected_rx,
        }
    }

    /// Attach the broker handler set. Must happen before `run`.
    pub async fn attach_handlers(&self, handlers: Arc<dyn HubInbound>) {
        *self.handlers.write().await = Some(handlers);
    }

    /// Wait until the transport has an established connection.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.connected_rx.clone();
        while !*rx.borrow() {
            rx.changed().await.context("Transport stopped")?;
        }
        Ok(())
    }

    /// Connection loop: connect, pump inbound messages, reconnect with
    /// backoff on drops.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut first_connection = true;
        let mut backoff = Duration::from_secs(1);

        loop {
            let stream = tokio::select! {
                result = connect_async(&self.ws_url) => result,
                _ = shutdown_rx.recv() => return,
            };

            let (ws, _) = match stream {
                Ok(ok) => ok,
                Err(e) => {
                    warn!(error = %e, "Hub connection failed, retrying");
                    tokio::select! {
                        _ = sleep(backoff) => {}
                        _ = shutdown_rx.recv() => return,
                    }
                    backoff = (backoff * 2).min(Duration::from_secs(30));
                    continue;
                }
            };

            info!(url = %self.ws_url, "Hub connected");
            backoff = Duration::from_secs(1);

            let (sink, mut inbound) = ws.split();
            *self.sink.lock().await = Some(sink);
            let _ = self.connected_tx.send(true);

            if first_connection {
                first_connection = false;
            } else if let Some(handlers) = self.handlers.read().await.clone() {
                if let Err(e) = handlers.on_reconnect().await {
                    error!(error = %e, "Reconnect handler failed");
                }
            }

            loop {
                tokio::select! {
                    message = inbound.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                self.dispatch(text.to_string()).await;
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let mut sink = self.sink.lock().await;
                                if let Some(sink) = sink.as_mut() {
                                    let _ = sink.send(Message::Pong(payload)).await;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                warn!("Hub connection closed");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "Hub read error");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let mut sink = self.sink.lock().await;
                        if let Some(sink) = sink.as_mut() {
                            let _ = sink.send(Message::Close(None)).await;
                        }
                        return;
                    }
                }
            }

            *self.sink.lock().await = None;
            let _ = self.connected_tx.send(false);
        }
    }

    /// Decode one inbound frame and hand it to the broker. Each message
    /// runs in its own task; the engine serializes per sub-order id.
    async fn dispatch(self: &Arc<Self>, text: String) {
        let Some(handlers) = self.handlers.read().await.clone() else {
            warn!("Inbound hub message before handlers attached");
            return;
        };

        let message = match serde_json::from_str::<InboundMessage>(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Unparseable hub message");
                return;
            }
        };

        let transport = Arc::clone(self);
        tokio::spawn(async move {
            let result = match message {
                InboundMessage::CreateSubOrder(request) => {
                    let id = request.id;
                    match handlers.on_create_sub_order(request).await {
                        Ok(report) => transport.send_sub_order_status(&report).await,
                        Err(e) => Err(e.context(format!("create sub-order {id}"))),
                    }
                }
                InboundMessage::CancelSubOrder { id } => {
                    match handlers.on_cancel_sub_order(id).await {
                        Ok(Some(report)) => transport.send_sub_order_status(&report).await,
                        Ok(None) => Ok(()),
                        Err(e) => Err(e.context(format!("cancel sub-order {id}"))),
                    }
                }
                InboundMessage::CheckSubOrder { id } => {
                    match handlers.on_check_sub_order(id).await {
                        Ok(report) => transport.send_sub_order_status(&report).await,
                        Err(e) => Err(e.context(format!("check sub-order {id}"))),
                    }
                }
                InboundMessage::SubOrderStatusAccepted(ack) => {
                    handlers.on_sub_order_status_accepted(ack).await
                }
            };

            if let Err(e) = result {
                warn!(error = %e, "Hub message handling failed");
            }
        });
    }

    /// Serialize and write one outbound frame.
    async fn send(&self, message: &OutboundMessage<'_>) -> Result<()> {
        let json = serde_json::to_string(message).context("Failed to serialize hub message")?;

        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().context("Hub transport disconnected")?;
        sink.send(Message::text(json))
            .await
            .context("Hub send failed")?;

        debug!("Hub message sent");
        Ok(())
    }
}

#[async_trait]
impl HubOutbound for HubWsTransport {
    async fn connect(&self, auth: HubAuth) -> Result<()> {
        self.send(&OutboundMessage::Connect(&auth)).await
    }

    async fn register(&self, registration: &BrokerRegistration) -> Result<()> {
        self.send(&OutboundMessage::Register(registration)).await
    }

    async fn send_sub_order_status(&self, report: &SubOrderReport) -> Result<()> {
        self.send(&OutboundMessage::SubOrderStatus(report)).await
    }

    async fn send_balances(&self, payload: &str) -> Result<()> {
        let balances: serde_json::Value =
            serde_json::from_str(payload).context("Balance payload is not JSON")?;
        self.send(&OutboundMessage::Balances { balances }).await?;

        *self.last_balances.write().await = Some(payload.to_string());
        Ok(())
    }

    async fn last_balances_json(&self) -> Option<String> {
        self.last_balances.read().await.clone()
    }
}

//! Blockchain Gateway Client - REST Surface of the Chain Node
//!
//! Wraps reqwest with a concurrency cap and transient-error retries for
//! the `/broker/*` read endpoints and the raw-transaction broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::settlement::{Liability, TxQueryStatus};

/// Configuration for the gateway client.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum concurrent requests.
    pub max_concurrent: usize,
    /// Maximum retries on transient errors.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub retry_base_delay: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(15),
            max_concurrent: 8,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

/// Raw transaction broadcast request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
    signed_tx_raw: &'a str,
}

/// Liability entry as reported by the gateway.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiabilityDto {
    asset_name: String,
    outstanding_amount: Decimal,
    timestamp: u64,
}

/// REST client for the blockchain gateway.
pub struct BlockchainGateway {
    http: Client,
    config: GatewayConfig,
    semaphore: Arc<Semaphore>,
}

impl BlockchainGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build gateway HTTP client")?;

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));

        Ok(Self {
            http,
            config,
            semaphore,
        })
    }

    /// GET a JSON payload with retries on transport errors and 5xx.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .context("Semaphore closed")?;

        let url = format!("{}{}", self.config.base_url, path);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                sleep(delay).await;
            }

            match self.http.get(&url).send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    warn!(url = %url, status = %resp.status(), "Gateway server error");
                    last_error = Some(anyhow::anyhow!("gateway returned {}", resp.status()));
                }
                Ok(resp) => {
                    let resp = resp
                        .error_for_status()
                        .context(format!("Gateway request failed: {path}"))?;
                    return resp
                        .json::<T>()
                        .await
                        .context(format!("Gateway response malformed: {path}"));
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Gateway request error");
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("gateway unreachable")))
    }

    pub async fn get_allowance(&self, address: &str, asset: &str) -> Result<Decimal> {
        self.get_json(&format!("/broker/getAllowance/{address}/{asset}"))
            .await
    }

    pub async fn get_nonce(&self, address: &str) -> Result<Option<u64>> {
        self.get_json(&format!("/broker/getNonce/{address}")).await
    }

    pub async fn get_stake(&self, address: &str) -> Result<Decimal> {
        self.get_json(&format!("/broker/getStake/{address}")).await
    }

    pub async fn get_transaction_status(&self, hash: &str) -> Result<TxQueryStatus> {
        self.get_json(&format!("/broker/getTransactionStatus/{hash}"))
            .await
    }

    pub async fn get_liabilities(&self, address: &str) -> Result<Vec<Liability>> {
        let dtos: Vec<LiabilityDto> = self
            .get_json(&format!("/broker/getLiabilities/{address}"))
            .await?;
        Ok(dtos
            .into_iter()
            .map(|d| Liability {
                asset_name: d.asset_name,
                outstanding_amount: d.outstanding_amount,
                timestamp: d.timestamp,
            })
            .collect())
    }

    pub async fn get_contract_balance(
        &self,
        address: &str,
    ) -> Result<HashMap<String, Decimal>> {
        self.get_json(&format!("/broker/getContractBalance/{address}"))
            .await
    }

    pub async fn get_wallet_balance(&self, address: &str) -> Result<HashMap<String, Decimal>> {
        self.get_json(&format!("/broker/getWalletBalance/{address}"))
            .await
    }

    /// Broadcast a signed raw transaction.
    pub async fn execute(&self, signed_tx_raw: &str) -> Result<()> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .context("Semaphore closed")?;

        let url = format!("{}/broker/execute", self.config.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&ExecuteRequest { signed_tx_raw })
            .send()
            .await
            .context("Broadcast request failed")?;

        let resp = resp
            .error_for_status()
            .context("Gateway rejected broadcast")?;

        debug!(status = %resp.status(), "Transaction broadcast accepted");
        Ok(())
    }
}

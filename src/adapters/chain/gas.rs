//! Gas Price Feed - External Gwei Oracle
//!
//! Queries the external gas feed before every broadcast. The feed's
//! "fast" value is tenths of gwei; the usable price is fast ÷ 10 rounded
//! up, rejected above the 300 gwei cap so a fee spike aborts the write
//! before signing.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::MAX_GAS_PRICE_GWEI;
use crate::error::BrokerError;

/// Gas feed response; only the fast lane is consumed.
#[derive(Debug, Deserialize)]
struct GasFeedResponse {
    fast: f64,
}

/// Client for the external gas price feed.
pub struct GasPriceFeed {
    http: Client,
    url: String,
    /// Last accepted price in gwei, for diagnostics.
    cached_gwei: AtomicU64,
}

impl GasPriceFeed {
    pub fn new(url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build gas feed HTTP client")?;

        Ok(Self {
            http,
            url,
            cached_gwei: AtomicU64::new(0),
        })
    }

    /// Fetch the current fast gas price in gwei.
    ///
    /// # Errors
    /// `BrokerError::GasPriceTooHigh` when the network price exceeds the
    /// broadcast cap.
    pub async fn fast_gwei(&self) -> Result<u64> {
        let resp: GasFeedResponse = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("Gas feed request failed")?
            .error_for_status()
            .context("Gas feed returned an error status")?
            .json()
            .await
            .context("Gas feed response malformed")?;

        let gwei = (resp.fast / 10.0).ceil() as u64;

        if gwei > MAX_GAS_PRICE_GWEI {
            return Err(BrokerError::GasPriceTooHigh(gwei, MAX_GAS_PRICE_GWEI).into());
        }

        self.cached_gwei.store(gwei, Ordering::Relaxed);
        debug!(gas_gwei = gwei, "Gas price updated");

        Ok(gwei)
    }

    /// Last accepted gas price without a feed call.
    pub fn cached_gwei(&self) -> u64 {
        self.cached_gwei.load(Ordering::Relaxed)
    }
}

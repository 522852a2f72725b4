//! Binance Venue Adapter - Signed REST API
//!
//! Implements the `Exchange` port against the Binance spot REST API.
//! Requests are HMAC-SHA256 signed over the query string with the API
//! secret. Two venue idiosyncrasies are papered over here so the rest of
//! the broker never sees them:
//! - withdrawals draw from the funding wallet, so spot balance is moved
//!   there with an internal transfer before the withdrawal is applied;
//! - the withdrawal history reports "completed" while the transaction is
//!   still being mined; the status is downgraded to pending until a
//!   transaction id is present.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::hex;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::ExchangeConfig;
use crate::domain::order::{Side, SubOrder, Trade, TradeStatus};
use crate::domain::settlement::{Withdrawal, WithdrawalStatus};
use crate::domain::token::TokenRegistry;
use crate::domain::now_ms;
use crate::error::BrokerError;
use crate::ports::exchange::{
    Exchange, VenueOrder, WithdrawLimit, WithdrawalUpdate,
};

/// Venue error body.
#[derive(Debug, Deserialize)]
struct VenueError {
    code: i64,
    msg: String,
}

/// Order placement / status response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    status: String,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    executed_qty: Option<Decimal>,
}

/// Account balances response.
#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: Decimal,
}

/// One coin entry of the capital config listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinConfig {
    coin: String,
    network_list: Vec<NetworkConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkConfig {
    is_default: bool,
    withdraw_min: Decimal,
    withdraw_fee: Decimal,
}

/// Withdrawal application response.
#[derive(Debug, Deserialize)]
struct WithdrawApplyResponse {
    id: String,
}

/// One row of the withdrawal history.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawHistoryRow {
    id: String,
    status: u8,
    #[serde(default)]
    tx_id: Option<String>,
}

/// Binance spot adapter.
pub struct BinanceExchange {
    id: String,
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    withdraw_enabled: bool,
    registry: Arc<TokenRegistry>,
}

impl BinanceExchange {
    /// Build the adapter, resolving API secrets from the environment.
    pub fn from_config(config: &ExchangeConfig, registry: Arc<TokenRegistry>) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .context(format!("{} not set", config.api_key_env))?;
        let api_secret = std::env::var(&config.api_secret_env)
            .context(format!("{} not set", config.api_secret_env))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build venue HTTP client")?;

        Ok(Self {
            id: config.id.clone(),
            http,
            base_url: config.base_url.clone(),
            api_key,
            api_secret,
            withdraw_enabled: config.withdraw_enabled,
            registry,
        })
    }

    /// "BTC-USDT" → "BTCUSDT".
    fn venue_symbol(symbol: &str) -> String {
        symbol.replace('-', "")
    }

    /// Append timestamp and HMAC signature to a query string.
    fn sign_query(&self, query: &str) -> String {
        let stamped = if query.is_empty() {
            format!("timestamp={}", now_ms())
        } else {
            format!("{query}&timestamp={}", now_ms())
        };
        let mac = hmac_sha256::HMAC::mac(stamped.as_bytes(), self.api_secret.as_bytes());
        format!("{stamped}&signature={}", hex::encode(mac))
    }

    /// Issue a signed request and decode the JSON response. Venue-level
    /// errors surface as `BrokerError::Submit` with the venue message.
    async fn signed_request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &str,
    ) -> Result<T> {
        let url = format!("{}{}?{}", self.base_url, path, self.sign_query(query));

        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context(format!("Venue request failed: {path}"))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .context(format!("Venue response malformed: {path}"));
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<VenueError>(&body)
            .map(|e| format!("{} (code {})", e.msg, e.code))
            .unwrap_or(body);

        if status == StatusCode::BAD_REQUEST {
            return Err(BrokerError::Submit(message).into());
        }
        anyhow::bail!("venue returned {status}: {message}")
    }

    /// Map a venue order status onto a terminal trade, if any.
    fn trade_from_status(&self, sub_order: &SubOrder, resp: &OrderResponse) -> Option<Trade> {
        let exchange_order_id = sub_order.exchange_order_id.clone()?;
        // A canceled order may omit the fill; treat missing as zero.
        let filled = resp.executed_qty.unwrap_or(Decimal::ZERO);
        let price = resp.price.unwrap_or(sub_order.price);

        match resp.status.as_str() {
            "FILLED" => Some(Trade {
                exchange: self.id.clone(),
                exchange_order_id,
                price,
                amount: filled,
                status: TradeStatus::Filled,
            }),
            "CANCELED" | "EXPIRED" | "REJECTED" => Some(Trade {
                exchange: self.id.clone(),
                exchange_order_id,
                price,
                amount: filled,
                status: TradeStatus::Canceled,
            }),
            "NEW" | "PARTIALLY_FILLED" => None,
            other => {
                warn!(
                    sub_order_id = sub_order.id,
                    status = other,
                    "Unknown venue order status"
                );
                None
            }
        }
    }
}

#[async_trait]
impl Exchange for BinanceExchange {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip(self), fields(venue = %self.id))]
    async fn submit_sub_order(
        &self,
        id: u64,
        symbol: &str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Result<VenueOrder> {
        let side_str = match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let query = format!(
            "symbol={}&side={}&type=LIMIT&timeInForce=GTC&quantity={}&price={}&newClientOrderId={}",
            Self::venue_symbol(symbol),
            side_str,
            amount,
            price,
            id,
        );

        let resp: OrderResponse = self
            .signed_request(Method::POST, "/api/v3/order", &query)
            .await?;

        debug!(order_id = resp.order_id, "Venue accepted placement");
        Ok(VenueOrder {
            exchange_order_id: resp.order_id.to_string(),
        })
    }

    #[instrument(skip(self, sub_order), fields(venue = %self.id, sub_order_id = sub_order.id))]
    async fn cancel_sub_order(&self, sub_order: &SubOrder) -> Result<()> {
        let query = format!(
            "symbol={}&origClientOrderId={}",
            Self::venue_symbol(&sub_order.symbol),
            sub_order.id,
        );
        let _: serde_json::Value = self
            .signed_request(Method::DELETE, "/api/v3/order", &query)
            .await?;
        Ok(())
    }

    async fn check_sub_orders(&self, sub_orders: &[SubOrder]) -> Result<Vec<Trade>> {
        let mut trades = Vec::new();

        for sub_order in sub_orders {
            let query = format!(
                "symbol={}&origClientOrderId={}",
                Self::venue_symbol(&sub_order.symbol),
                sub_order.id,
            );
            match self
                .signed_request::<OrderResponse>(Method::GET, "/api/v3/order", &query)
                .await
            {
                Ok(resp) => {
                    if let Some(trade) = self.trade_from_status(sub_order, &resp) {
                        trades.push(trade);
                    }
                }
                Err(e) => {
                    warn!(
                        sub_order_id = sub_order.id,
                        error = %e,
                        "Venue status poll failed"
                    );
                }
            }
        }

        Ok(trades)
    }

    async fn balances(&self) -> Result<HashMap<String, Decimal>> {
        let resp: AccountResponse = self
            .signed_request(Method::GET, "/api/v3/account", "")
            .await?;

        Ok(resp
            .balances
            .into_iter()
            .filter(|b| self.registry.contains(&b.asset) && b.free > Decimal::ZERO)
            .map(|b| (b.asset, b.free))
            .collect())
    }

    fn has_withdraw(&self) -> bool {
        self.withdraw_enabled
    }

    async fn withdraw_limit(&self, currency: &str) -> Result<WithdrawLimit> {
        let coins: Vec<CoinConfig> = self
            .signed_request(Method::GET, "/sapi/v1/capital/config/getall", "")
            .await?;

        let coin = coins
            .iter()
            .find(|c| c.coin == currency)
            .context(format!("Venue does not list {currency}"))?;
        let network = coin
            .network_list
            .iter()
            .find(|n| n.is_default)
            .or_else(|| coin.network_list.first())
            .context(format!("No withdrawal network for {currency}"))?;

        Ok(WithdrawLimit {
            min: network.withdraw_min,
            fee: network.withdraw_fee,
        })
    }

    #[instrument(skip(self, address), fields(venue = %self.id))]
    async fn withdraw(&self, currency: &str, amount: Decimal, address: &str) -> Option<String> {
        // Withdrawals are served from the funding wallet; move the spot
        // balance there first.
        let transfer = format!(
            "type=MAIN_FUNDING&asset={currency}&amount={amount}"
        );
        if let Err(e) = self
            .signed_request::<serde_json::Value>(Method::POST, "/sapi/v1/asset/transfer", &transfer)
            .await
        {
            warn!(currency, %amount, error = %e, "Funding transfer failed");
            return None;
        }

        let query = format!(
            "coin={currency}&amount={amount}&address={address}"
        );
        match self
            .signed_request::<WithdrawApplyResponse>(
                Method::POST,
                "/sapi/v1/capital/withdraw/apply",
                &query,
            )
            .await
        {
            Ok(resp) => Some(resp.id),
            Err(e) => {
                warn!(currency, %amount, error = %e, "Withdrawal apply failed");
                None
            }
        }
    }

    async fn check_withdraws(
        &self,
        withdrawals: &[Withdrawal],
    ) -> Result<Vec<WithdrawalUpdate>> {
        let rows: Vec<WithdrawHistoryRow> = self
            .signed_request(Method::GET, "/sapi/v1/capital/withdraw/history", "")
            .await?;
        let by_id: HashMap<&str, &WithdrawHistoryRow> =
            rows.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut updates = Vec::new();
        for withdrawal in withdrawals {
            let Some(row) = by_id.get(withdrawal.exchange_withdraw_id.as_str()) else {
                continue;
            };
            // 0 email-sent, 2 awaiting-approval, 4 processing stay pending.
            // 6 reads "completed" but the venue sets it while the transfer
            // is still mining; only trust it once a tx id exists.
            let status = match row.status {
                1 => Some(WithdrawalStatus::Canceled),
                3 | 5 => Some(WithdrawalStatus::Failed),
                6 if row.tx_id.is_some() => Some(WithdrawalStatus::Ok),
                6 => None,
                _ => None,
            };
            if let Some(status) = status {
                updates.push(WithdrawalUpdate {
                    exchange_withdraw_id: withdrawal.exchange_withdraw_id.clone(),
                    status,
                });
            }
        }

        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_symbol() {
        assert_eq!(BinanceExchange::venue_symbol("BTC-USDT"), "BTCUSDT");
        assert_eq!(BinanceExchange::venue_symbol("ETHUSDT"), "ETHUSDT");
    }
}

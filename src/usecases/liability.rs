//! Liability Planner - Discharging On-chain Debt
//!
//! Observes chain-reported liabilities and schedules the cheapest
//! discharge: a wallet deposit when the wallet covers the debt, otherwise
//! a venue withdrawal toward the broker's on-chain address. At most one
//! compensation is in flight at a time: the planner stands down while any
//! transaction or withdrawal is pending.

use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, instrument, warn};

use super::reconciler::BalanceBook;
use crate::adapters::exchange::ExchangeRegistry;
use crate::domain::now_secs;
use crate::domain::settlement::{Liability, Withdrawal, WithdrawalStatus};
use crate::ports::chain::ChainClient;
use crate::ports::exchange::Exchange;
use crate::ports::store::Store;

/// ETH kept back for gas when planning a discharge.
pub const GAS_RESERVE_ETH: Decimal = dec!(0.045);

/// Plans and initiates liability discharges.
pub struct LiabilityPlanner<S: Store, C: ChainClient> {
    store: Arc<S>,
    chain: Arc<C>,
    exchanges: Arc<ExchangeRegistry>,
    balances: Arc<BalanceBook>,
    /// Grace period before an outstanding liability is acted on.
    due_period_seconds: u64,
}

impl<S: Store, C: ChainClient> LiabilityPlanner<S, C> {
    pub fn new(
        store: Arc<S>,
        chain: Arc<C>,
        exchanges: Arc<ExchangeRegistry>,
        balances: Arc<BalanceBook>,
        due_period_seconds: u64,
    ) -> Self {
        Self {
            store,
            chain,
            exchanges,
            balances,
            due_period_seconds,
        }
    }

    /// Evaluate one liability and, when due and unguarded, initiate
    /// exactly one compensating move.
    #[instrument(skip(self, liability), fields(asset = %liability.asset_name, outstanding = %liability.outstanding_amount))]
    pub async fn manage(&self, liability: &Liability) -> Result<()> {
        if liability.outstanding_amount <= Decimal::ZERO {
            return Ok(());
        }
        if now_secs().saturating_sub(liability.timestamp) <= self.due_period_seconds {
            return Ok(());
        }

        // One compensation in flight at a time.
        if !self.store.pending_transactions().await?.is_empty() {
            info!("Transaction pending, deferring liability");
            return Ok(());
        }
        if !self.store.withdrawals_to_check().await?.is_empty() {
            info!("Withdrawal pending, deferring liability");
            return Ok(());
        }

        let wallet = self.chain.get_wallet_balance().await?;
        let Some(&eth_balance) = wallet.get("ETH") else {
            warn!("Wallet ETH balance unknown, skipping liability");
            return Ok(());
        };
        let Some(&asset_balance) = wallet.get(&liability.asset_name) else {
            warn!("Wallet asset balance unknown, skipping liability");
            return Ok(());
        };

        let available = if liability.asset_name == "ETH" {
            eth_balance - GAS_RESERVE_ETH
        } else {
            asset_balance
        };

        if available >= liability.outstanding_amount {
            return self
                .deposit(liability.outstanding_amount, &liability.asset_name)
                .await;
        }

        let remaining = liability.outstanding_amount - available.max(Decimal::ZERO);
        match self.pick_exchange(&liability.asset_name, remaining).await {
            Some((venue, amount)) => {
                self.withdraw_from_venue(venue, &liability.asset_name, amount)
                    .await
            }
            None => {
                info!(
                    %remaining,
                    "No venue can cover the liability, retrying next tick"
                );
                Ok(())
            }
        }
    }

    /// Deposit from the wallet into the settlement contract.
    #[instrument(skip(self))]
    async fn deposit(&self, amount: Decimal, asset: &str) -> Result<()> {
        let transaction = if asset == "ETH" {
            self.chain.deposit_eth(amount).await?
        } else {
            let allowance = self.chain.get_allowance(asset).await?;
            if allowance < amount {
                warn!(
                    %allowance,
                    %amount,
                    "Allowance too low, operator must approve the contract"
                );
                return Ok(());
            }
            self.chain.deposit_erc20(amount, asset).await?
        };

        info!(hash = %transaction.transaction_hash, "Deposit broadcast");
        self.store.insert_transaction(&transaction).await?;
        Ok(())
    }

    /// First venue (in config order) able to cover `remaining` plus its
    /// withdrawal fee, with the venue minimum honored.
    async fn pick_exchange(
        &self,
        asset: &str,
        remaining: Decimal,
    ) -> Option<(Arc<dyn Exchange>, Decimal)> {
        for venue in self.exchanges.iter() {
            if !venue.has_withdraw() {
                continue;
            }
            let limit = match venue.withdraw_limit(asset).await {
                Ok(limit) => limit,
                Err(e) => {
                    warn!(venue = venue.id(), error = %e, "Withdraw limit unavailable");
                    continue;
                }
            };

            let amount_with_fee = (remaining + limit.fee).max(limit.min);
            let Some(balance) = self.balances.get(venue.id(), asset) else {
                continue;
            };
            if balance > amount_with_fee {
                return Some((Arc::clone(venue), amount_with_fee));
            }
        }
        None
    }

    /// Initiate a venue withdrawal toward the broker's on-chain address.
    async fn withdraw_from_venue(
        &self,
        venue: Arc<dyn Exchange>,
        currency: &str,
        amount: Decimal,
    ) -> Result<()> {
        let address = self.chain.address();
        match venue.withdraw(currency, amount, &address).await {
            Some(exchange_withdraw_id) => {
                info!(
                    venue = venue.id(),
                    withdraw_id = %exchange_withdraw_id,
                    %amount,
                    "Venue withdrawal initiated"
                );
                self.store
                    .insert_withdrawal(&Withdrawal {
                        exchange_withdraw_id,
                        exchange: venue.id().to_string(),
                        currency: currency.to_string(),
                        amount,
                        status: WithdrawalStatus::Pending,
                    })
                    .await
            }
            None => {
                warn!(venue = venue.id(), "Venue declined the withdrawal");
                Ok(())
            }
        }
    }
}

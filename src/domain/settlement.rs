//! Settlement-side domain types.
//!
//! Withdrawals from venues, on-chain transactions, chain-reported
//! liabilities, and the signed blockchain order the aggregator settles
//! against the contract.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status of an exchange withdrawal. Non-pending statuses are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Ok,
    Failed,
    Canceled,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A withdrawal initiated on a venue toward the broker's on-chain address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    /// Venue-assigned withdrawal identifier.
    pub exchange_withdraw_id: String,
    /// Venue the withdrawal was initiated on.
    pub exchange: String,
    /// Currency being withdrawn.
    pub currency: String,
    /// Withdrawn amount, inclusive of the venue fee.
    pub amount: Decimal,
    /// Current status; pending until the venue reports otherwise.
    pub status: WithdrawalStatus,
}

/// Persisted status of a broadcast transaction. OK and FAIL are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Ok,
    Fail,
}

/// Gateway answer for a transaction lookup. NONE means the node does not
/// know the hash (yet); NONE older than ten minutes is treated as FAIL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxQueryStatus {
    Pending,
    Ok,
    Fail,
    None,
}

/// Contract method a broadcast transaction invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxMethod {
    DepositEth,
    DepositErc20,
    Withdraw,
    Approve,
    LockStake,
    ReleaseStake,
}

/// A broadcast on-chain transaction tracked to a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction hash as a 0x-prefixed hex string.
    pub transaction_hash: String,
    /// Invoked contract method.
    pub method: TxMethod,
    /// Asset symbol the transaction moves.
    pub asset: String,
    /// Amount in display units.
    pub amount: Decimal,
    /// Broadcast time, milliseconds since epoch.
    pub create_time: u64,
    /// PENDING until the chain confirms or the lookup times out.
    pub status: TransactionStatus,
}

/// On-chain-reported debt of the broker to the settlement contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Liability {
    /// Asset symbol the liability is denominated in.
    pub asset_name: String,
    /// Outstanding amount still owed.
    pub outstanding_amount: Decimal,
    /// When the liability was incurred, seconds since epoch.
    pub timestamp: u64,
}

/// EIP-712-signed limit order handed to the aggregator for settlement.
///
/// Integer fields carry base units (1e8 scaling); `id` is the keccak-256
/// canonical-form digest and `signature` the typed-data signature, both
/// 0x-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainOrder {
    pub id: String,
    pub sender_address: String,
    pub matcher_address: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub matcher_fee_asset: String,
    pub amount: u64,
    pub price: u64,
    pub matcher_fee: u64,
    pub nonce: u64,
    pub expiration: u64,
    /// 1 for buy, 0 for sell.
    pub buy_side: u8,
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdrawal_terminality() {
        assert!(!WithdrawalStatus::Pending.is_terminal());
        assert!(WithdrawalStatus::Ok.is_terminal());
        assert!(WithdrawalStatus::Failed.is_terminal());
        assert!(WithdrawalStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_tx_status_wire_form() {
        let json = serde_json::to_string(&TxQueryStatus::None).unwrap();
        assert_eq!(json, "\"NONE\"");
        let parsed: TxQueryStatus = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(parsed, TxQueryStatus::Pending);
    }
}

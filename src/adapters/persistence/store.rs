//! File Store - Journaled Keyed State Persistence
//!
//! Implements the `Store` port with an append-only JSONL journal of
//! upsert records replayed into in-memory indexes at startup. Each line
//! is a self-contained JSON record; writes flush before returning, so
//! acknowledged state survives a crash. On startup the journal is
//! compacted into a fresh file via tmp-write + atomic rename.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::domain::order::{SubOrder, SubOrderStatus, Trade};
use crate::domain::settlement::{
    Transaction, TransactionStatus, Withdrawal, WithdrawalStatus,
};
use crate::ports::store::Store;

/// One journal line: the latest full value of a keyed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalRecord {
    SubOrder(SubOrder),
    Trade(Trade),
    Withdrawal(Withdrawal),
    Transaction(Transaction),
}

/// In-memory indexes rebuilt from the journal.
#[derive(Debug, Default)]
struct Indexes {
    sub_orders: HashMap<u64, SubOrder>,
    /// `(exchange, exchange_order_id)` → sub-order id.
    by_exchange_id: HashMap<(String, String), u64>,
    trades: HashMap<(String, String), Trade>,
    withdrawals: HashMap<String, Withdrawal>,
    transactions: HashMap<String, Transaction>,
}

impl Indexes {
    fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::SubOrder(sub) => {
                if let Some(eid) = &sub.exchange_order_id {
                    self.by_exchange_id
                        .insert((sub.exchange.clone(), eid.clone()), sub.id);
                }
                self.sub_orders.insert(sub.id, sub);
            }
            JournalRecord::Trade(trade) => {
                self.trades.insert(
                    (trade.exchange.clone(), trade.exchange_order_id.clone()),
                    trade,
                );
            }
            JournalRecord::Withdrawal(w) => {
                self.withdrawals.insert(w.exchange_withdraw_id.clone(), w);
            }
            JournalRecord::Transaction(tx) => {
                self.transactions.insert(tx.transaction_hash.clone(), tx);
            }
        }
    }
}

/// Journal-backed implementation of the `Store` port.
pub struct FileStore {
    indexes: RwLock<Indexes>,
    /// Append handle; a mutex keeps journal lines whole under
    /// concurrent writers.
    journal: Mutex<File>,
}

impl FileStore {
    /// Open (or create) the store in `data_dir`, replaying and
    /// compacting the journal.
    pub async fn open(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        let journal_path = dir.join("journal.jsonl");
        let indexes = Self::replay(&journal_path).await?;
        Self::compact(&journal_path, &indexes).await?;

        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .await
            .context("Failed to open journal for append")?;

        info!(
            path = %journal_path.display(),
            sub_orders = indexes.sub_orders.len(),
            trades = indexes.trades.len(),
            withdrawals = indexes.withdrawals.len(),
            transactions = indexes.transactions.len(),
            "Store opened"
        );

        Ok(Self {
            indexes: RwLock::new(indexes),
            journal: Mutex::new(journal),
        })
    }

    /// Rebuild the indexes from the journal, skipping malformed lines.
    async fn replay(path: &Path) -> Result<Indexes> {
        let mut indexes = Indexes::default();

        if !path.exists() {
            return Ok(indexes);
        }

        let content = fs::read_to_string(path)
            .await
            .context("Failed to read journal")?;

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) => indexes.apply(record),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed journal line");
                }
            }
        }

        Ok(indexes)
    }

    /// Rewrite the journal with one line per live record (tmp → rename).
    async fn compact(path: &Path, indexes: &Indexes) -> Result<()> {
        let tmp = path.with_extension("jsonl.tmp");
        let mut out = String::new();

        for sub in indexes.sub_orders.values() {
            out.push_str(&serde_json::to_string(&JournalRecord::SubOrder(sub.clone()))?);
            out.push('\n');
        }
        for trade in indexes.trades.values() {
            out.push_str(&serde_json::to_string(&JournalRecord::Trade(trade.clone()))?);
            out.push('\n');
        }
        for w in indexes.withdrawals.values() {
            out.push_str(&serde_json::to_string(&JournalRecord::Withdrawal(w.clone()))?);
            out.push('\n');
        }
        for tx in indexes.transactions.values() {
            out.push_str(&serde_json::to_string(&JournalRecord::Transaction(
                tx.clone(),
            ))?);
            out.push('\n');
        }

        fs::write(&tmp, out)
            .await
            .context("Failed to write compacted journal")?;
        fs::rename(&tmp, path)
            .await
            .context("Failed to rename compacted journal")?;

        Ok(())
    }

    /// Append one record and flush it to disk.
    async fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialize record")?;
        line.push('\n');

        let mut journal = self.journal.lock().await;
        journal
            .write_all(line.as_bytes())
            .await
            .context("Failed to append journal record")?;
        journal.flush().await.context("Failed to flush journal")?;

        Ok(())
    }

    async fn upsert_sub_order(&self, sub_order: &SubOrder) -> Result<()> {
        self.append(&JournalRecord::SubOrder(sub_order.clone())).await?;
        let mut indexes = self.indexes.write().await;
        indexes.apply(JournalRecord::SubOrder(sub_order.clone()));
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn insert_sub_order(&self, sub_order: &SubOrder) -> Result<()> {
        self.upsert_sub_order(sub_order).await
    }

    async fn update_sub_order(&self, sub_order: &SubOrder) -> Result<()> {
        self.upsert_sub_order(sub_order).await
    }

    async fn sub_order_by_id(&self, id: u64) -> Result<Option<SubOrder>> {
        Ok(self.indexes.read().await.sub_orders.get(&id).cloned())
    }

    async fn sub_order_by_exchange_id(
        &self,
        exchange: &str,
        exchange_order_id: &str,
    ) -> Result<Option<SubOrder>> {
        let indexes = self.indexes.read().await;
        let key = (exchange.to_string(), exchange_order_id.to_string());
        Ok(indexes
            .by_exchange_id
            .get(&key)
            .and_then(|id| indexes.sub_orders.get(id))
            .cloned())
    }

    async fn open_sub_orders(&self) -> Result<Vec<SubOrder>> {
        let indexes = self.indexes.read().await;
        Ok(indexes
            .sub_orders
            .values()
            .filter(|s| {
                matches!(s.status, SubOrderStatus::Prepare | SubOrderStatus::Accepted)
            })
            .cloned()
            .collect())
    }

    async fn sub_orders_to_check(&self) -> Result<Vec<SubOrder>> {
        let indexes = self.indexes.read().await;
        Ok(indexes
            .sub_orders
            .values()
            .filter(|s| s.status == SubOrderStatus::Accepted && s.exchange_order_id.is_some())
            .cloned()
            .collect())
    }

    async fn sub_orders_to_resend(&self) -> Result<Vec<SubOrder>> {
        let indexes = self.indexes.read().await;
        Ok(indexes
            .sub_orders
            .values()
            .filter(|s| s.status.is_terminal() && !s.sent_to_aggregator)
            .cloned()
            .collect())
    }

    async fn all_sub_orders(&self) -> Result<Vec<SubOrder>> {
        let indexes = self.indexes.read().await;
        let mut all: Vec<SubOrder> = indexes.sub_orders.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        Ok(all)
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<()> {
        self.append(&JournalRecord::Trade(trade.clone())).await?;
        let mut indexes = self.indexes.write().await;
        indexes.apply(JournalRecord::Trade(trade.clone()));
        Ok(())
    }

    async fn trade_by_exchange_id(
        &self,
        exchange: &str,
        exchange_order_id: &str,
    ) -> Result<Option<Trade>> {
        let key = (exchange.to_string(), exchange_order_id.to_string());
        Ok(self.indexes.read().await.trades.get(&key).cloned())
    }

    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<()> {
        self.append(&JournalRecord::Withdrawal(withdrawal.clone())).await?;
        let mut indexes = self.indexes.write().await;
        indexes.apply(JournalRecord::Withdrawal(withdrawal.clone()));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_withdrawal_status(
        &self,
        exchange_withdraw_id: &str,
        status: WithdrawalStatus,
    ) -> Result<()> {
        let updated = {
            let indexes = self.indexes.read().await;
            match indexes.withdrawals.get(exchange_withdraw_id) {
                Some(w) if w.status.is_terminal() => {
                    warn!(
                        withdraw_id = exchange_withdraw_id,
                        current = ?w.status,
                        requested = ?status,
                        "Ignoring status update on terminal withdrawal"
                    );
                    return Ok(());
                }
                Some(w) => {
                    let mut w = w.clone();
                    w.status = status;
                    w
                }
                None => {
                    warn!(withdraw_id = exchange_withdraw_id, "Unknown withdrawal");
                    return Ok(());
                }
            }
        };

        self.append(&JournalRecord::Withdrawal(updated.clone())).await?;
        let mut indexes = self.indexes.write().await;
        indexes.apply(JournalRecord::Withdrawal(updated));
        Ok(())
    }

    async fn withdrawals_to_check(&self) -> Result<Vec<Withdrawal>> {
        let indexes = self.indexes.read().await;
        Ok(indexes
            .withdrawals
            .values()
            .filter(|w| w.status == WithdrawalStatus::Pending)
            .cloned()
            .collect())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.append(&JournalRecord::Transaction(transaction.clone())).await?;
        let mut indexes = self.indexes.write().await;
        indexes.apply(JournalRecord::Transaction(transaction.clone()));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_transaction_status(
        &self,
        transaction_hash: &str,
        status: TransactionStatus,
    ) -> Result<()> {
        let updated = {
            let indexes = self.indexes.read().await;
            match indexes.transactions.get(transaction_hash) {
                Some(tx) if tx.status != TransactionStatus::Pending => {
                    warn!(
                        hash = transaction_hash,
                        current = ?tx.status,
                        requested = ?status,
                        "Ignoring status update on terminal transaction"
                    );
                    return Ok(());
                }
                Some(tx) => {
                    let mut tx = tx.clone();
                    tx.status = status;
                    tx
                }
                None => {
                    warn!(hash = transaction_hash, "Unknown transaction");
                    return Ok(());
                }
            }
        };

        self.append(&JournalRecord::Transaction(updated.clone())).await?;
        let mut indexes = self.indexes.write().await;
        indexes.apply(JournalRecord::Transaction(updated));
        Ok(())
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>> {
        let indexes = self.indexes.read().await;
        Ok(indexes
            .transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .cloned()
            .collect())
    }
}

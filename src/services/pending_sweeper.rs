//! Retires checkouts the customer never came back from.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::TransactionStatus;
use crate::ports::{RepositoryResult, TransactionRepository};

pub struct PendingSweeper {
    transactions: Arc<dyn TransactionRepository>,
    ttl: Duration,
}

impl PendingSweeper {
    pub fn new(transactions: Arc<dyn TransactionRepository>, ttl: Duration) -> Self {
        Self { transactions, ttl }
    }

    /// Moves pending transactions older than the TTL to `rejected`. Rows that
    /// left `pending` meanwhile are not touched.
    pub async fn sweep(&self) -> RepositoryResult<u64> {
        let cutoff = Utc::now() - self.ttl;
        let expired = self
            .transactions
            .expire_pending_before(cutoff, TransactionStatus::Rejected)
            .await?;

        if expired > 0 {
            info!(expired, cutoff = %cutoff, "Stale pending transactions rejected");
        }
        Ok(expired)
    }

    pub fn spawn_periodic(self, every: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = every.as_secs(), "Pending transaction sweeper started");
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    error!(error = %e, "Pending transaction sweep failed");
                }
            }
        })
    }
}

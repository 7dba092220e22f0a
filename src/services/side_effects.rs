//! Best-effort work that follows a completed purchase: clearing carts and
//! emailing download links.
//!
//! Jobs go through a bounded queue drained by one worker task. Submitting
//! never waits, and nothing that happens in the worker can reach the
//! reconciliation response.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::Product;
use crate::notifications::{EmailMessage, MailError, Mailer};
use crate::ports::{CartRepository, CatalogRepository, RepositoryError};
use crate::services::download_token::{DownloadTokenError, DownloadTokenSigner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseConfirmation {
    pub transaction_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub guest_session_id: Option<String>,
    pub amount: i64,
    pub product_ids: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error("failed to clear cart: {0}")]
    Cart(#[source] RepositoryError),
    #[error("failed to load products: {0}")]
    Catalog(#[source] RepositoryError),
    #[error("failed to sign download link: {0}")]
    DownloadToken(#[from] DownloadTokenError),
    #[error("failed to send email: {0}")]
    Mail(#[from] MailError),
}

/// Handle used to enqueue confirmation jobs. Cheap to clone.
#[derive(Clone)]
pub struct SideEffectDispatcher {
    sender: mpsc::Sender<PurchaseConfirmation>,
}

impl SideEffectDispatcher {
    /// Spawns the worker. It stops once every dispatcher clone is dropped and
    /// the queue is drained, which is what the returned handle resolves on.
    pub fn start(worker: SideEffectWorker, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(Arc::new(worker).run(receiver));
        (Self { sender }, handle)
    }

    /// Enqueues a job without waiting. Returns false if it had to be dropped.
    pub fn submit(&self, job: PurchaseConfirmation) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                error!(
                    transaction_id = %job.transaction_id,
                    "Side-effect queue is full; dropping purchase confirmation"
                );
                false
            }
            Err(TrySendError::Closed(job)) => {
                error!(
                    transaction_id = %job.transaction_id,
                    "Side-effect worker is not running; dropping purchase confirmation"
                );
                false
            }
        }
    }
}

pub struct SideEffectWorker {
    carts: Arc<dyn CartRepository>,
    catalog: Arc<dyn CatalogRepository>,
    mailer: Arc<dyn Mailer>,
    signer: DownloadTokenSigner,
    public_base_url: String,
}

impl SideEffectWorker {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        catalog: Arc<dyn CatalogRepository>,
        mailer: Arc<dyn Mailer>,
        signer: DownloadTokenSigner,
        public_base_url: String,
    ) -> Self {
        Self {
            carts,
            catalog,
            mailer,
            signer,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn run(self: Arc<Self>, mut receiver: mpsc::Receiver<PurchaseConfirmation>) {
        info!("Side-effect worker started");

        while let Some(job) = receiver.recv().await {
            let transaction_id = job.transaction_id.clone();
            let worker = Arc::clone(&self);
            // Each job runs in its own task so a panic is contained to it.
            if let Err(e) = tokio::spawn(async move { worker.handle(job).await }).await {
                error!(transaction_id = %transaction_id, error = %e, "Side-effect job aborted");
            }
        }

        info!("Side-effect worker stopped");
    }

    /// Runs every step for one job; failures are logged and discarded.
    pub async fn handle(&self, job: PurchaseConfirmation) {
        if let Err(e) = self.clear_carts(&job).await {
            warn!(transaction_id = %job.transaction_id, error = %e, "Cart clearing failed");
        }

        match self.send_confirmation(&job).await {
            Ok(()) => info!(
                transaction_id = %job.transaction_id,
                products = job.product_ids.len(),
                "Purchase confirmation sent"
            ),
            Err(e) => error!(
                transaction_id = %job.transaction_id,
                error = %e,
                "Purchase confirmation email failed"
            ),
        }
    }

    async fn clear_carts(&self, job: &PurchaseConfirmation) -> Result<(), SideEffectError> {
        let cleared = self
            .carts
            .clear_for_user(&job.customer_email)
            .await
            .map_err(SideEffectError::Cart)?;

        let guest_cleared = match &job.guest_session_id {
            Some(session_id) => self
                .carts
                .clear_for_session(session_id)
                .await
                .map_err(SideEffectError::Cart)?,
            None => 0,
        };

        info!(
            transaction_id = %job.transaction_id,
            cleared,
            guest_cleared,
            "Carts cleared"
        );
        Ok(())
    }

    async fn send_confirmation(&self, job: &PurchaseConfirmation) -> Result<(), SideEffectError> {
        let products = self
            .catalog
            .find_by_ids(&job.product_ids)
            .await
            .map_err(SideEffectError::Catalog)?;

        let now = Utc::now();
        let mut links = Vec::with_capacity(job.product_ids.len());
        for product_id in &job.product_ids {
            let token = self.signer.sign(&job.customer_email, product_id, now)?;
            let name = products
                .iter()
                .find(|p| &p.id == product_id)
                .map(Product::display_name)
                .unwrap_or_else(|| product_id.clone());
            links.push(DownloadLink {
                name,
                url: format!("{}/downloads/{}", self.public_base_url, token),
            });
        }

        let message = render_confirmation(job, &links);
        self.mailer.send(&message).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub name: String,
    pub url: String,
}

pub fn render_confirmation(job: &PurchaseConfirmation, links: &[DownloadLink]) -> EmailMessage {
    let mut text = format!(
        "Hi {},\n\nThank you for your purchase (order {}, total ${}).\n\nYour files:\n",
        job.customer_name, job.transaction_id, job.amount
    );
    for link in links {
        text.push_str(&format!("  - {}: {}\n", link.name, link.url));
    }
    text.push_str("\nDownload links are personal and expire; request new ones from your account.\n");

    EmailMessage {
        to: job.customer_email.clone(),
        to_name: job.customer_name.clone(),
        subject: format!("Your purchase {} is ready", job.transaction_id),
        text,
    }
}

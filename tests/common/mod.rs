#![allow(dead_code)]

mod store;

use async_trait::async_trait;
use axum::Router;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use storefront_payments::domain::Product;
use storefront_payments::gateway::{
    CommitResponse, CreateRequest, CreateResponse, GatewayError, PaymentGateway, AUTHORIZED,
};
use storefront_payments::health::DependencyChecker;
use storefront_payments::notifications::{EmailMessage, MailError, Mailer};
use storefront_payments::services::{
    CheckoutPages, DownloadTokenSigner, ReturnCallback, ReturnReconciler, SideEffectDispatcher,
    SideEffectWorker, TransactionInitiator,
};
use storefront_payments::{create_app, AppState};

pub use store::InMemoryStore;

pub const PUBLIC_BASE_URL: &str = "https://api.shop.test";
pub const FRONTEND_BASE_URL: &str = "https://shop.test";
pub const DOWNLOAD_BASE_URL: &str = "https://files.shop.test";
pub const DOWNLOAD_SECRET: &str = "integration-download-secret-0123456789";

pub const EMAIL: &str = "ana@example.com";
pub const NAME: &str = "Ana Pérez";

#[derive(Clone)]
struct Session {
    buy_order: String,
    session_id: String,
    amount: i64,
}

#[derive(Default)]
struct GatewayState {
    sessions: HashMap<String, Session>,
    creates: Vec<CreateRequest>,
    commits: Vec<String>,
    fail_create: bool,
    fail_commit: bool,
    decline: bool,
    amount_delta: i64,
}

/// Gateway double: issues sequential tokens and answers commits from the
/// sessions it opened.
#[derive(Default)]
pub struct ScriptedGateway {
    state: Mutex<GatewayState>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut GatewayState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn fail_create(&self, failing: bool) {
        self.with_state(|s| s.fail_create = failing);
    }

    pub fn fail_commit(&self, failing: bool) {
        self.with_state(|s| s.fail_commit = failing);
    }

    pub fn decline(&self, declining: bool) {
        self.with_state(|s| s.decline = declining);
    }

    /// Commits report the session amount plus `delta`.
    pub fn skew_amount(&self, delta: i64) {
        self.with_state(|s| s.amount_delta = delta);
    }

    /// Opens a session without going through `create`.
    pub fn register_session(&self, token: &str, buy_order: &str, amount: i64) {
        self.with_state(|s| {
            s.sessions.insert(
                token.to_string(),
                Session {
                    buy_order: buy_order.to_string(),
                    session_id: format!("S-{}", buy_order),
                    amount,
                },
            )
        });
    }

    pub fn creates(&self) -> Vec<CreateRequest> {
        self.with_state(|s| s.creates.clone())
    }

    pub fn commits(&self) -> Vec<String> {
        self.with_state(|s| s.commits.clone())
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create(&self, request: &CreateRequest) -> Result<CreateResponse, GatewayError> {
        self.with_state(|s| {
            s.creates.push(request.clone());
            if s.fail_create {
                return Err(GatewayError::Status {
                    status: 503,
                    body: "service unavailable".to_string(),
                });
            }

            let token = format!("tok-{:04}", s.creates.len());
            s.sessions.insert(
                token.clone(),
                Session {
                    buy_order: request.buy_order.clone(),
                    session_id: request.session_id.clone(),
                    amount: request.amount,
                },
            );
            Ok(CreateResponse {
                token,
                url: "https://gateway.test/webpayserver/initTransaction".to_string(),
            })
        })
    }

    async fn commit(&self, token: &str) -> Result<CommitResponse, GatewayError> {
        self.with_state(|s| {
            s.commits.push(token.to_string());
            if s.fail_commit {
                return Err(GatewayError::CircuitBreakerOpen("scripted outage".to_string()));
            }

            let session = s.sessions.get(token).cloned().ok_or_else(|| GatewayError::Status {
                status: 422,
                body: "invalid token".to_string(),
            })?;

            let (status, response_code) = if s.decline {
                ("FAILED".to_string(), Some(-1))
            } else {
                (AUTHORIZED.to_string(), Some(0))
            };

            Ok(CommitResponse {
                status,
                response_code,
                amount: session.amount + s.amount_delta,
                buy_order: session.buy_order,
                session_id: Some(session.session_id),
                authorization_code: Some("1213".to_string()),
                payment_type_code: Some("VN".to_string()),
            })
        })
    }
}

/// Mailer double that keeps every message it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    attempts: Mutex<usize>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// Polls until `count` send attempts were made or two seconds pass.
    pub async fn wait_for_attempts(&self, count: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.attempts() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        *self.attempts.lock().unwrap() += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Rejected {
                status: 503,
                body: "mail service down".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn product(id: &str, name: &str) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        company: Some("Acme Ltd.".to_string()),
        price: 2900,
    }
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn confirmation(token: &str) -> ReturnCallback {
    ReturnCallback {
        token_ws: Some(token.to_string()),
        ..ReturnCallback::default()
    }
}

/// Every service wired over the in-memory store and the doubles above.
pub struct Harness {
    pub store: InMemoryStore,
    pub gateway: Arc<ScriptedGateway>,
    pub mailer: Arc<RecordingMailer>,
    pub signer: DownloadTokenSigner,
    pub initiator: Arc<TransactionInitiator>,
    pub reconciler: Arc<ReturnReconciler>,
    pub worker: JoinHandle<()>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = InMemoryStore::new();
        for (id, name) in [
            ("A", "Balance 2021"),
            ("B", "Balance 2022"),
            ("C", "Balance 2023"),
            ("D", "Ledger 2022"),
            ("E", "Ledger 2023"),
            ("F", "Payroll 2023"),
        ] {
            store.add_product(product(id, name)).await;
        }

        let gateway = Arc::new(ScriptedGateway::new());
        let mailer = Arc::new(RecordingMailer::default());
        let signer = DownloadTokenSigner::new(DOWNLOAD_SECRET, chrono::Duration::hours(72));
        let shared = Arc::new(store.clone());

        let worker = SideEffectWorker::new(
            shared.clone(),
            shared.clone(),
            mailer.clone(),
            signer.clone(),
            PUBLIC_BASE_URL.to_string(),
        );
        let (dispatcher, worker) = SideEffectDispatcher::start(worker, 16);

        let initiator = TransactionInitiator::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            gateway.clone(),
            PUBLIC_BASE_URL,
        );
        let reconciler = ReturnReconciler::new(
            shared.clone(),
            shared,
            gateway.clone(),
            dispatcher,
            CheckoutPages::new(FRONTEND_BASE_URL),
        );

        Self {
            store,
            gateway,
            mailer,
            signer,
            initiator: Arc::new(initiator),
            reconciler: Arc::new(reconciler),
            worker,
        }
    }

    pub fn app_state(&self) -> AppState {
        let shared = Arc::new(self.store.clone());
        let checkers: Vec<Arc<dyn DependencyChecker>> = vec![shared.clone()];
        AppState {
            initiator: self.initiator.clone(),
            reconciler: self.reconciler.clone(),
            transactions: shared.clone(),
            purchases: shared,
            download_signer: self.signer.clone(),
            download_base_url: DOWNLOAD_BASE_URL.to_string(),
            health_checkers: Arc::new(checkers),
            start_time: Instant::now(),
        }
    }

    pub fn app(&self) -> Router {
        create_app(self.app_state())
    }
}

use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{CommitResponse, CreateRequest, CreateResponse, GatewayError, PaymentGateway};

const TRANSACTIONS_PATH: &str = "/rswebpaytransaction/api/webpay/v1.2/transactions";
const API_KEY_ID_HEADER: &str = "Tbk-Api-Key-Id";
const API_KEY_SECRET_HEADER: &str = "Tbk-Api-Key-Secret";

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

/// HTTP client for a Webpay-Plus style REST gateway.
///
/// No retries: a failed call is surfaced immediately. Consecutive transport or
/// 5xx failures open the circuit breaker, after which calls are rejected
/// without touching the network until the backoff elapses.
#[derive(Clone)]
pub struct WebpayClient {
    client: Client,
    base_url: String,
    commerce_code: String,
    api_key: String,
    circuit_breaker: Breaker,
}

impl WebpayClient {
    pub fn new(base_url: String, commerce_code: String, api_key: String) -> Self {
        Self::with_circuit_breaker(base_url, commerce_code, api_key, 3, 60)
    }

    /// Creates a client with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        commerce_code: String,
        api_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        WebpayClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            commerce_code,
            api_key,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn transactions_url(&self) -> String {
        format!("{}{}", self.base_url, TRANSACTIONS_PATH)
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, GatewayError>>,
    {
        let result = self
            .circuit_breaker
            .call_with(|e: &GatewayError| e.is_transient(), call)
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl PaymentGateway for WebpayClient {
    async fn create(&self, request: &CreateRequest) -> Result<CreateResponse, GatewayError> {
        let url = self.transactions_url();
        let call = self
            .client
            .post(&url)
            .header(API_KEY_ID_HEADER, &self.commerce_code)
            .header(API_KEY_SECRET_HEADER, &self.api_key)
            .json(request);

        let created: CreateResponse = self
            .guarded(async move { read_json(call.send().await?).await })
            .await?;

        if created.token.is_empty() || created.url.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "create response is missing token or url".to_string(),
            ));
        }

        tracing::debug!(buy_order = %request.buy_order, "Gateway session created");
        Ok(created)
    }

    async fn commit(&self, token: &str) -> Result<CommitResponse, GatewayError> {
        if !super::is_well_formed_token(token) {
            return Err(GatewayError::InvalidToken);
        }

        let url = format!("{}/{}", self.transactions_url(), token);
        let call = self
            .client
            .put(&url)
            .header(API_KEY_ID_HEADER, &self.commerce_code)
            .header(API_KEY_SECRET_HEADER, &self.api_key);

        self.guarded(async move { read_json(call.send().await?).await })
            .await
    }
}

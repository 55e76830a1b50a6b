//! HTTP client for the external payment gateway.
//!
//! The gateway speaks JSON:
//!
//! ```text
//! POST {base}/trade/page-pay  { out_trade_no, total_amount, subject }
//!   -> { code, pay_url?, msg? }
//! POST {base}/trade/query     { out_trade_no }
//!   -> { code, trade_status?, trade_no? }
//! ```
//!
//! Connection failures and 5xx answers are transient and retried with
//! backoff. Anything else the gateway says is surfaced as
//! [`GatewayError::Protocol`].

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use storefront_core::payment::{CODE_SUCCESS, GatewayError, PaymentGateway, TradeQuery};
use storefront_core::{BoxFuture, Money, OrderId};
use storefront_runtime::retry::{RetryPolicy, retry_with_predicate};

/// Request sent to create a page-pay trade.
#[derive(Debug, Serialize)]
struct PagePayRequest<'a> {
    out_trade_no: &'a str,
    /// Decimal amount, two fraction digits
    total_amount: String,
    subject: &'a str,
}

/// Response to a page-pay request.
#[derive(Debug, Deserialize)]
struct PagePayResponse {
    code: String,
    #[serde(default)]
    pay_url: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Request sent to query a trade.
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    out_trade_no: &'a str,
}

/// [`PaymentGateway`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpPaymentGateway {
    /// Client for the gateway at `base_url` (e.g. `http://gateway:8090`).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::builder()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(200))
                .jitter(true)
                .build(),
        })
    }

    /// Replace the retry policy for transient failures.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let (client, url) = (&self.client, &url);
        retry_with_predicate(
            self.retry.clone(),
            move || async move {
                let response = client
                    .post(url)
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| GatewayError::Transport(e.to_string()))?;
                decode(response).await
            },
            GatewayError::is_transient,
        )
        .await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(GatewayError::Transport(format!("HTTP {status}")));
    }
    if !status.is_success() {
        return Err(GatewayError::Protocol(format!("HTTP {status}")));
    }
    response
        .json()
        .await
        .map_err(|e| GatewayError::Protocol(e.to_string()))
}

impl PaymentGateway for HttpPaymentGateway {
    fn initiate_payment(
        &self,
        order_id: &OrderId,
        amount: Money,
        description: &str,
    ) -> BoxFuture<'_, Result<String, GatewayError>> {
        let order_id = order_id.clone();
        let subject = description.to_string();
        Box::pin(async move {
            let request = PagePayRequest {
                out_trade_no: order_id.as_str(),
                total_amount: amount.to_string(),
                subject: &subject,
            };
            let response: PagePayResponse = self.post_json("/trade/page-pay", &request).await?;

            match response {
                PagePayResponse {
                    code,
                    pay_url: Some(url),
                    ..
                } if code == CODE_SUCCESS && !url.is_empty() => Ok(url),
                PagePayResponse { code, msg, .. } => Err(GatewayError::Protocol(format!(
                    "page-pay refused: code={code} msg={}",
                    msg.as_deref().unwrap_or("-")
                ))),
            }
        })
    }

    fn query_payment(&self, order_id: &OrderId) -> BoxFuture<'_, Result<TradeQuery, GatewayError>> {
        let order_id = order_id.clone();
        Box::pin(async move {
            let request = QueryRequest {
                out_trade_no: order_id.as_str(),
            };
            self.post_json("/trade/query", &request).await
        })
    }
}

//! Polymarket CLOB HTTP adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::signing::Signer;
use super::ExchangeClient;
use crate::config::ExchangeEnv;
use crate::error::{ConfigError, ExchangeError};
use crate::trading::Side;

/// Order submission request body.
#[derive(Debug, Clone, Serialize)]
struct OrderRequest {
    token_id: String,
    side: String,
    price: String,
    size: String,
    fee_rate_bps: String,
    nonce: String,
    expiration: String,
    taker: String,
    maker: String,
    signature_type: u8,
    signature: String,
    order_type: String,
}

/// Order submission result.
#[derive(Debug, Clone, Deserialize)]
struct SubmitResult {
    #[serde(alias = "orderID", alias = "orderId", alias = "order_id", alias = "id")]
    order_id: Option<String>,
    error: Option<String>,
    #[serde(alias = "errorMsg")]
    error_msg: Option<String>,
}

/// Exchange order id from a 2xx submission body.
fn order_id_from_body(body: &str) -> Result<String, ExchangeError> {
    let result: SubmitResult = serde_json::from_str(body)
        .map_err(|e| ExchangeError::Rejected(format!("accepted but response unparsable: {}", e)))?;

    if let Some(error) = result.error.or(result.error_msg).filter(|e| !e.is_empty()) {
        return Err(ExchangeError::Rejected(error));
    }

    result
        .order_id
        .ok_or_else(|| ExchangeError::Rejected("no order id in response".to_string()))
}

/// Price endpoint response.
#[derive(Debug, Clone, Deserialize)]
struct PriceResponse {
    price: Decimal,
}

/// Map an HTTP failure status onto retry semantics.
fn classify(status: StatusCode, body: &str) -> ExchangeError {
    let msg = format!("HTTP {} - {}", status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ExchangeError::Transient(msg)
    } else {
        ExchangeError::Rejected(msg)
    }
}

fn transport(e: reqwest::Error) -> ExchangeError {
    ExchangeError::Transient(format!("HTTP request failed: {}", e))
}

/// Live CLOB client.
#[derive(Debug, Clone)]
pub struct ClobClient {
    http: reqwest::Client,
    clob_url: String,
    signer: Option<Signer>,
}

impl ClobClient {
    /// Build a client from environment settings.
    ///
    /// Without a private key the client can read prices but every order
    /// operation is rejected.
    pub fn new(env: &ExchangeEnv) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(env.http_timeout_ms))
            .connect_timeout(Duration::from_millis(500))
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "HTTP_TIMEOUT_MS",
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        let signer = match env.polymarket_private_key.as_deref().filter(|k| !k.is_empty()) {
            Some(_) => {
                let key = env.private_key()?;
                let signer = Signer::from_private_key(key, env.polymarket_signature_type)
                    .map_err(|e| ConfigError::Invalid {
                        key: "POLYMARKET_PRIVATE_KEY",
                        reason: e.to_string(),
                    })?;
                Some(signer)
            }
            None => None,
        };

        Ok(Self {
            http,
            clob_url: env.polymarket_clob_url.trim_end_matches('/').to_string(),
            signer,
        })
    }

    /// Wallet address, when a private key is configured.
    pub fn address(&self) -> Option<String> {
        self.signer.as_ref().map(Signer::address)
    }

    fn signer(&self) -> Result<&Signer, ExchangeError> {
        self.signer
            .as_ref()
            .ok_or_else(|| ExchangeError::Rejected("no private key configured".to_string()))
    }

    async fn authed(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ExchangeError> {
        for (key, value) in self.signer()?.auth_headers().await? {
            request = request.header(key, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl ExchangeClient for ClobClient {
    #[instrument(skip_all, fields(token_id = %token_id, side = %side))]
    async fn execute_order(
        &self,
        price: Decimal,
        size: Decimal,
        side: Side,
        token_id: &str,
    ) -> Result<String, ExchangeError> {
        let signer = self.signer()?;

        let now = chrono::Utc::now();
        let nonce = now.timestamp_millis().to_string();
        let expiration = (now.timestamp() + 3600).to_string();

        let message = format!(
            "{}:{}:{}:{}:{}:{}",
            token_id, side, price, size, nonce, expiration
        );
        let signature = signer.sign(message.as_bytes()).await?;

        let order = OrderRequest {
            token_id: token_id.to_string(),
            side: side.to_string(),
            price: price.to_string(),
            size: size.to_string(),
            fee_rate_bps: "0".to_string(),
            nonce,
            expiration,
            taker: "0x0000000000000000000000000000000000000000".to_string(),
            maker: signer.address(),
            signature_type: signer.signature_type(),
            signature,
            order_type: "GTC".to_string(),
        };

        let url = format!("{}/order", self.clob_url);
        let request = self.authed(self.http.post(&url).json(&order)).await?;
        let response = request.send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        // Past a 2xx the order may already rest on the book; nothing below is retryable.
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Rejected(format!("accepted but body unreadable: {}", e)))?;
        let order_id = order_id_from_body(&body)?;

        info!(order_id = %order_id, price = %price, size = %size, "Order accepted by exchange");
        Ok(order_id)
    }

    #[instrument(skip_all, fields(token_id = %token_id))]
    async fn get_orderbook_price(&self, token_id: &str) -> Result<Decimal, ExchangeError> {
        let url = format!("{}/price", self.clob_url);
        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id), ("side", "BUY")])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        let parsed: PriceResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::Transient(format!("failed to parse price: {}", e)))?;

        debug!(price = %parsed.price, "Fetched order-book price");
        Ok(parsed.price)
    }

    fn supports_cancel(&self) -> bool {
        true
    }

    #[instrument(skip_all, fields(order_id = %order_id))]
    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        let url = format!("{}/order", self.clob_url);
        let body = serde_json::json!({ "orderID": order_id });
        let request = self.authed(self.http.delete(&url).json(&body)).await?;
        let response = request.send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }
        Ok(())
    }
}

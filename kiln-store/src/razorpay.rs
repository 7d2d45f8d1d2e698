use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use kiln_core::payment::{GatewayError, GatewayOrder, GatewayRefund, PaymentGateway, RefundInstruction};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::app_config::GatewayConfig;

/// Razorpay REST client. Authenticates with HTTP basic auth (key id / key secret).
pub struct RazorpayGateway {
    base_url: String,
    key_id: String,
    key_secret: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    /// Unix seconds
    created_at: i64,
}

impl OrderResponse {
    fn into_gateway_order(self) -> GatewayOrder {
        GatewayOrder {
            id: self.id,
            amount: self.amount,
            currency: self.currency,
            receipt: self.receipt.unwrap_or_default(),
            created_at: unix_seconds(self.created_at),
        }
    }
}

#[derive(Deserialize)]
struct RefundResponse {
    id: String,
    payment_id: String,
    amount: i64,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn unix_seconds(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// Best-effort reading of the provider's error envelope
fn rejection_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => match (error.code, error.description) {
            (Some(code), Some(description)) => format!("{}: {}", code, description),
            (None, Some(description)) => description,
            (Some(code), None) => code,
            (None, None) => format!("HTTP {}", status.as_u16()),
        },
        Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
    }
}

impl RazorpayGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            client,
        })
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Calling payment gateway");

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, "Gateway request failed: {}", e);
                GatewayError::Transport(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = rejection_message(status, &body);
            error!(url = %url, status = status.as_u16(), "Gateway rejected request: {}", message);
            return if status.is_server_error() {
                Err(GatewayError::Transport(message))
            } else {
                Err(GatewayError::Rejected(message))
            };
        }

        resp.json::<R>()
            .await
            .map_err(|e| GatewayError::Transport(format!("Malformed gateway response: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let body = CreateOrderBody {
            amount,
            currency,
            receipt,
        };
        let order: OrderResponse = self.post("/orders", &body).await?;
        Ok(order.into_gateway_order())
    }

    async fn refund(
        &self,
        payment_id: &str,
        instruction: RefundInstruction,
    ) -> Result<GatewayRefund, GatewayError> {
        let path = format!("/payments/{}/refund", payment_id);
        let refund: RefundResponse = self.post(&path, &instruction).await?;
        Ok(GatewayRefund {
            id: refund.id,
            payment_id: refund.payment_id,
            amount: refund.amount,
        })
    }
}

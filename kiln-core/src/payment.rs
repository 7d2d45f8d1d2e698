use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Gateway-side order created before the customer is asked to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String, // Provider's ID (e.g., order_Hx12...)
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundSpeed {
    Normal,
    Optimum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundInstruction {
    pub amount: i64,
    pub speed: RefundSpeed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway rejected the request: {0}")]
    Rejected(String),
    #[error("Gateway transport failure: {0}")]
    Transport(String),
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// The gateway could not be reached, as opposed to answering with a refusal
    pub fn is_outage(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Unavailable(_))
    }
}

/// Payment provider contract. All amounts are minor currency units.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create the provider-side order the checkout widget is opened against
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError>;

    /// Refund a captured payment
    async fn refund(
        &self,
        payment_id: &str,
        instruction: RefundInstruction,
    ) -> Result<GatewayRefund, GatewayError>;
}

/// Checks the signature the checkout widget hands back after payment.
///
/// The provider signs `"{gateway_order_id}|{gateway_payment_id}"` with
/// HMAC-SHA256 keyed by the account's key secret and hex-encodes the digest.
#[derive(Clone)]
pub struct SignatureVerifier {
    key_secret: String,
}

impl SignatureVerifier {
    pub fn new(key_secret: impl Into<String>) -> Self {
        Self {
            key_secret: key_secret.into(),
        }
    }

    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        let expected = self.sign(gateway_order_id, gateway_payment_id);
        let matches = expected == signature;
        if !matches {
            tracing::warn!(gateway_order_id, gateway_payment_id, "Payment signature mismatch");
        }
        matches
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").field("key_secret", &"********").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_matches_reference_digest() {
        let verifier = SignatureVerifier::new("secret");
        let signature = verifier.sign("order_abc", "pay_xyz");

        assert_eq!(
            signature,
            "6c4490ce5c4839b0437f2b5dccb1fc7301518f94c6d1165b96d0903bfd33b2ae"
        );
        assert!(verifier.verify("order_abc", "pay_xyz", &signature));
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let verifier = SignatureVerifier::new("secret");
        let signature = verifier.sign("order_abc", "pay_xyz");

        assert!(!verifier.verify("order_abc", "pay_other", &signature));
        assert!(!verifier.verify("order_abc", "pay_xyz", &signature.to_uppercase()));
        assert!(!SignatureVerifier::new("other-secret").verify("order_abc", "pay_xyz", &signature));
    }

    #[test]
    fn test_refund_speed_wire_format() {
        let json = serde_json::to_string(&RefundSpeed::Optimum).unwrap();
        assert_eq!(json, "\"optimum\"");
    }
}

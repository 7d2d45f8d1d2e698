use async_trait::async_trait;
use chrono::Utc;
use kiln_core::payment::{
    GatewayError, GatewayOrder, GatewayRefund, PaymentGateway, RefundInstruction, RefundSpeed,
    SignatureVerifier,
};
use kiln_shared::Money;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything the lifecycle manager needs from the payment provider
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    verifier: SignatureVerifier,
    currency: String,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, verifier: SignatureVerifier, currency: &str) -> Self {
        Self {
            gateway,
            verifier,
            currency: currency.to_string(),
        }
    }

    /// Create the gateway order the checkout widget charges against
    pub async fn open_gateway_order(&self, total: Money) -> Result<GatewayOrder, GatewayError> {
        let receipt = format!("receipt_order_{}", Utc::now().timestamp_millis());
        self.gateway
            .create_order(total.minor(), &self.currency, &receipt)
            .await
    }

    pub fn verify_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        self.verifier.verify(gateway_order_id, gateway_payment_id, signature)
    }

    /// Refund the whole amount of a captured payment
    pub async fn refund_in_full(
        &self,
        gateway_payment_id: &str,
        amount: Money,
    ) -> Result<GatewayRefund, GatewayError> {
        self.gateway
            .refund(
                gateway_payment_id,
                RefundInstruction {
                    amount: amount.minor(),
                    speed: RefundSpeed::Optimum,
                },
            )
            .await
    }
}

/// In-process gateway for tests and local development.
/// Amounts are echoed back; failures can be switched on per call type.
#[derive(Default)]
pub struct MockPaymentGateway {
    sequence: AtomicU64,
    fail_orders: AtomicBool,
    fail_refunds: AtomicBool,
    orders: Mutex<Vec<GatewayOrder>>,
    refunds: Mutex<Vec<GatewayRefund>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_order_creation(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    pub async fn created_orders(&self) -> Vec<GatewayOrder> {
        self.orders.lock().await.clone()
    }

    pub async fn issued_refunds(&self) -> Vec<GatewayRefund> {
        self.refunds.lock().await.clone()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_mock_{:06}", prefix, n)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("Simulated gateway outage".to_string()));
        }
        if amount <= 0 {
            return Err(GatewayError::Rejected("amount must be at least 1".to_string()));
        }

        let order = GatewayOrder {
            id: self.next_id("order"),
            amount,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
            created_at: Utc::now(),
        };
        self.orders.lock().await.push(order.clone());
        Ok(order)
    }

    async fn refund(
        &self,
        payment_id: &str,
        instruction: RefundInstruction,
    ) -> Result<GatewayRefund, GatewayError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected(
                "The payment has been fully refunded already".to_string(),
            ));
        }

        let refund = GatewayRefund {
            id: self.next_id("rfnd"),
            payment_id: payment_id.to_string(),
            amount: instruction.amount,
        };
        self.refunds.lock().await.push(refund.clone());
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gateway_amounts_are_minor_units() {
        let gateway = Arc::new(MockPaymentGateway::new());
        let orchestrator =
            PaymentOrchestrator::new(gateway.clone(), SignatureVerifier::new("secret"), "INR");

        let order = orchestrator.open_gateway_order(Money::from_major(1000.0)).await.unwrap();
        assert_eq!(order.amount, 100_000);
        assert_eq!(order.currency, "INR");
        assert!(order.receipt.starts_with("receipt_order_"));

        let refund = orchestrator
            .refund_in_full("pay_1", Money::from_major(1000.0))
            .await
            .unwrap();
        assert_eq!(refund.amount, 100_000);
        assert_eq!(gateway.issued_refunds().await.len(), 1);
    }

    #[tokio::test]
    async fn test_simulated_refund_failure() {
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.fail_refunds(true);
        let orchestrator =
            PaymentOrchestrator::new(gateway.clone(), SignatureVerifier::new("secret"), "INR");

        let result = orchestrator.refund_in_full("pay_1", Money::from_major(10.0)).await;
        assert!(matches!(result, Err(GatewayError::Rejected(_))));
        assert!(gateway.issued_refunds().await.is_empty());
    }
}

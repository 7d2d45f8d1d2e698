use kiln_catalog::{CartLine, CatalogError, CheckoutPricing, ClientTotals, ProductRepository, ShippingPolicy};
use kiln_core::payment::{GatewayError, GatewayOrder, PaymentGateway, SignatureVerifier};
use kiln_core::RepositoryError;
use kiln_shared::{Masked, Money};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::changes::{Actor, ChangeType, OrderChange};
use crate::models::{CustomerDetails, Order, OrderNumber, OrderStatus, PaymentMethod, RefundStatus};
use crate::orchestrator::PaymentOrchestrator;
use crate::repository::OrderRepository;

const ORDER_NUMBER_ATTEMPTS: usize = 5;
const DEFAULT_REFUND_REASON: &str = "Order cancelled";

/// Trust material and pricing rules handed to the manager at construction
#[derive(Clone)]
pub struct LifecycleConfig {
    pub currency: String,
    /// Gateway key secret, used to check payment signatures
    pub signing_secret: Masked<String>,
    pub shipping: ShippingPolicy,
}

/// Checkout submission
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub items: Vec<CartLine>,
    pub customer_details: CustomerDetails,
    pub payment_method: String,
    pub totals: ClientTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order: Order,
    /// Present for online orders; the client opens the payment widget with it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order: Option<GatewayOrder>,
}

/// What the payment widget returns after a successful charge
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    #[serde(alias = "razorpay_order_id", alias = "razorpayOrderId")]
    pub gateway_order_id: String,
    #[serde(alias = "razorpay_payment_id", alias = "razorpayPaymentId")]
    pub gateway_payment_id: String,
    #[serde(alias = "razorpay_signature", alias = "razorpaySignature")]
    pub gateway_signature: String,
}

/// Customer payout details for a refund request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub upi_id: Option<String>,
    pub bank_details: Option<String>,
}

/// Result of an admin refund. A gateway failure is recorded on the order
/// rather than returned as an error.
#[derive(Debug, Clone)]
pub enum RefundOutcome {
    Refunded(Order),
    /// `outage` is set when the gateway could not be reached at all
    Failed { order: Order, error: String, outage: bool },
}

impl RefundOutcome {
    pub fn order(&self) -> &Order {
        match self {
            RefundOutcome::Refunded(order) => order,
            RefundOutcome::Failed { order, .. } => order,
        }
    }
}

/// Owns order creation, payment verification, status transitions,
/// cancellation and refunds
pub struct OrderLifecycleManager {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn ProductRepository>,
    payments: PaymentOrchestrator,
    pricing: CheckoutPricing,
}

impl OrderLifecycleManager {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn ProductRepository>,
        gateway: Arc<dyn PaymentGateway>,
        config: LifecycleConfig,
    ) -> Self {
        let verifier = SignatureVerifier::new(config.signing_secret.into_inner());
        Self {
            orders,
            catalog,
            payments: PaymentOrchestrator::new(gateway, verifier, &config.currency),
            pricing: CheckoutPricing::new(config.shipping),
        }
    }

    /// Price the cart from the catalog, open a gateway order for online
    /// payment, then persist the order.
    ///
    /// The gateway order is not rolled back if persistence fails afterwards.
    pub async fn create_order(&self, request: CheckoutRequest) -> Result<CreatedOrder, OrderError> {
        let payment_method: PaymentMethod = request
            .payment_method
            .parse()
            .map_err(OrderError::InvalidRequest)?;
        request
            .customer_details
            .validate()
            .map_err(OrderError::InvalidRequest)?;

        let quote = self
            .pricing
            .quote_from_catalog(&request.items, self.catalog.as_ref())
            .await?;
        quote.reconcile(&request.totals)?;

        let gateway_order = match payment_method {
            PaymentMethod::Online => {
                let gateway_order = self.payments.open_gateway_order(quote.total).await.map_err(|e| {
                    error!("Failed to create gateway order: {}", e);
                    e
                })?;
                Some(gateway_order)
            }
            PaymentMethod::Cod => None,
        };

        let mut order = Order::from_quote(
            OrderNumber::generate(),
            request.customer_details,
            payment_method,
            quote,
        );
        order.payment_details.gateway_order_id = gateway_order.as_ref().map(|g| g.id.clone());

        self.insert_with_unique_number(&mut order).await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            payment_method = ?order.payment_method,
            total = %order.total,
            "Order created"
        );
        self.record(
            OrderChange::new(order.id, ChangeType::Created, Actor::Customer)
                .with_values(json!(null), json!({"status": order.status})),
        )
        .await;

        Ok(CreatedOrder {
            order,
            gateway_order,
        })
    }

    /// Mark the order paid once the gateway signature checks out.
    ///
    /// Re-submitting the same valid confirmation re-applies the same values.
    pub async fn verify_payment(&self, confirmation: PaymentConfirmation) -> Result<Order, OrderError> {
        let PaymentConfirmation {
            gateway_order_id,
            gateway_payment_id,
            gateway_signature,
        } = confirmation;

        if gateway_order_id.is_empty() || gateway_payment_id.is_empty() || gateway_signature.is_empty() {
            return Err(OrderError::InvalidRequest(
                "gateway order id, payment id and signature are required".to_string(),
            ));
        }

        if !self
            .payments
            .verify_signature(&gateway_order_id, &gateway_payment_id, &gateway_signature)
        {
            return Err(OrderError::PaymentVerificationFailed);
        }

        let mut order = self
            .orders
            .find_by_gateway_order_id(&gateway_order_id)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(gateway_order_id.clone()))?;

        let old_status = order.status;
        order.mark_paid(&gateway_payment_id, &gateway_signature);
        self.orders.save_order(&order).await?;

        info!(order_id = %order.id, order_number = %order.order_number, "Payment verified");
        self.record(
            OrderChange::new(order.id, ChangeType::PaymentVerified, Actor::System).with_values(
                json!({"status": old_status}),
                json!({"status": order.status, "isPaid": true, "gatewayPaymentId": gateway_payment_id}),
            ),
        )
        .await;

        Ok(order)
    }

    /// Customer cancellation. Delivered and cancelled orders are final.
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let mut order = self.load(order_id).await?;

        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(OrderError::InvalidStateTransition {
                from: order.status.to_string(),
                to: OrderStatus::Cancelled.to_string(),
                reason: "order cannot be cancelled".to_string(),
            });
        }

        let old_status = order.status;
        order.update_status(OrderStatus::Cancelled);
        self.orders.save_order(&order).await?;

        info!(order_id = %order.id, from = %old_status, "Order cancelled");
        self.record(
            OrderChange::new(order.id, ChangeType::Cancelled, Actor::Customer)
                .with_values(json!({"status": old_status}), json!({"status": order.status})),
        )
        .await;

        Ok(order)
    }

    /// Admin status change, checked against the transition table.
    /// Setting the current status again is a no-op.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        admin: &str,
    ) -> Result<Order, OrderError> {
        let mut order = self.load(order_id).await?;
        if order.status == new_status {
            return Ok(order);
        }

        if !order.status.can_transition_to(new_status) {
            return Err(OrderError::InvalidStateTransition {
                from: order.status.to_string(),
                to: new_status.to_string(),
                reason: "not allowed by the order lifecycle; use a status override".to_string(),
            });
        }

        let old_status = order.status;
        order.update_status(new_status);
        self.orders.save_order(&order).await?;

        info!(order_id = %order.id, from = %old_status, to = %new_status, "Order status updated");
        self.record(
            OrderChange::new(order.id, ChangeType::StatusUpdated, Actor::Admin(admin.to_string()))
                .with_values(json!({"status": old_status}), json!({"status": new_status})),
        )
        .await;

        Ok(order)
    }

    /// Admin correction that bypasses the transition table. Needs a reason
    /// and is always audited.
    pub async fn override_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        reason: &str,
        admin: &str,
    ) -> Result<Order, OrderError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrderError::InvalidRequest(
                "a reason is required to override order status".to_string(),
            ));
        }

        let mut order = self.load(order_id).await?;
        let old_status = order.status;
        order.update_status(new_status);
        self.orders.save_order(&order).await?;

        warn!(
            order_id = %order.id,
            from = %old_status,
            to = %new_status,
            admin,
            reason,
            "Order status overridden"
        );
        self.record(
            OrderChange::new(order.id, ChangeType::StatusOverridden, Actor::Admin(admin.to_string()))
                .with_values(json!({"status": old_status}), json!({"status": new_status}))
                .with_reason(reason),
        )
        .await;

        Ok(order)
    }

    /// Admin refund of the full order total through the gateway.
    ///
    /// `processing` is persisted before the gateway call. A crash inside the
    /// call leaves the order in `processing`; calling refund again retries.
    pub async fn refund(
        &self,
        order_id: Uuid,
        refund_reason: Option<String>,
        admin: &str,
    ) -> Result<RefundOutcome, OrderError> {
        let mut order = self.load(order_id).await?;

        order
            .refund_eligibility()
            .map_err(|reason| OrderError::InvalidStateTransition {
                from: order.refund_status.to_string(),
                to: RefundStatus::Refunded.to_string(),
                reason,
            })?;

        let payment_id = order
            .payment_details
            .gateway_payment_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OrderError::InvalidRequest("No payment ID found for refund".to_string()))?;

        let reason = refund_reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string());
        let actor = Actor::Admin(admin.to_string());

        let previous = order.refund_status;
        order.set_refund_status(RefundStatus::Processing);
        self.orders.save_order(&order).await?;
        self.record(
            OrderChange::new(order.id, ChangeType::RefundProcessing, actor.clone())
                .with_values(json!({"refundStatus": previous}), json!({"refundStatus": order.refund_status})),
        )
        .await;

        match self.payments.refund_in_full(&payment_id, order.total).await {
            Ok(refund) => {
                let amount = Money::from_minor(refund.amount);
                order.record_refund(refund.id.clone(), amount, reason.clone());
                self.orders.save_order(&order).await?;

                info!(
                    order_id = %order.id,
                    refund_id = %refund.id,
                    amount = %amount,
                    "Refund processed"
                );
                self.record(
                    OrderChange::new(order.id, ChangeType::Refunded, actor)
                        .with_values(
                            json!({"refundStatus": RefundStatus::Processing}),
                            json!({"refundStatus": order.refund_status, "refundId": refund.id, "refundAmount": amount}),
                        )
                        .with_reason(reason),
                )
                .await;

                Ok(RefundOutcome::Refunded(order))
            }
            Err(e) => {
                let message = e.to_string();
                let outage = e.is_outage();
                error!(order_id = %order.id, error = %message, "Gateway refund failed");

                order.record_refund_failure(message.clone(), reason.clone());
                self.orders.save_order(&order).await?;
                self.record(
                    OrderChange::new(order.id, ChangeType::RefundFailed, actor)
                        .with_values(
                            json!({"refundStatus": RefundStatus::Processing}),
                            json!({"refundStatus": order.refund_status, "refundError": message}),
                        )
                        .with_reason(reason),
                )
                .await;

                Ok(RefundOutcome::Failed {
                    order,
                    error: message,
                    outage,
                })
            }
        }
    }

    /// Customer asks for a refund and leaves payout details for the admin
    pub async fn request_refund(
        &self,
        order_id: Uuid,
        request: RefundRequest,
    ) -> Result<Order, OrderError> {
        let mut order = self.load(order_id).await?;

        order
            .refund_eligibility()
            .map_err(|reason| OrderError::InvalidStateTransition {
                from: order.refund_status.to_string(),
                to: RefundStatus::Requested.to_string(),
                reason,
            })?;

        if matches!(order.refund_status, RefundStatus::Requested | RefundStatus::Processing) {
            return Err(OrderError::InvalidStateTransition {
                from: order.refund_status.to_string(),
                to: RefundStatus::Requested.to_string(),
                reason: "a refund is already in progress".to_string(),
            });
        }

        let upi_id = non_blank(request.upi_id);
        let bank_details = non_blank(request.bank_details);
        if upi_id.is_none() && bank_details.is_none() {
            return Err(OrderError::InvalidRequest(
                "Please provide UPI ID or bank details".to_string(),
            ));
        }

        let previous = order.refund_status;
        order.record_refund_request(upi_id, bank_details);
        self.orders.save_order(&order).await?;

        info!(order_id = %order.id, "Refund requested");
        self.record(
            OrderChange::new(order.id, ChangeType::RefundRequested, Actor::Customer)
                .with_values(json!({"refundStatus": previous}), json!({"refundStatus": order.refund_status})),
        )
        .await;

        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.load(order_id).await
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_orders().await?)
    }

    pub async fn list_user_orders(&self, user_id: &str) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_orders_for_user(user_id).await?)
    }

    pub async fn order_history(&self, order_id: Uuid) -> Result<Vec<OrderChange>, OrderError> {
        self.load(order_id).await?;
        Ok(self.orders.list_order_changes(order_id).await?)
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))
    }

    async fn insert_with_unique_number(&self, order: &mut Order) -> Result<(), OrderError> {
        let mut attempt = 1;
        loop {
            match self.orders.insert_order(order).await {
                Ok(()) => return Ok(()),
                Err(RepositoryError::Conflict(what)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    warn!(conflict = %what, attempt, "Order number collision, regenerating");
                    order.order_number = OrderNumber::generate();
                    attempt += 1;
                }
                Err(e) => {
                    error!("Failed to persist order: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    async fn record(&self, change: OrderChange) {
        if let Err(e) = self.orders.add_order_change(&change).await {
            warn!(
                order_id = %change.order_id,
                change_type = ?change.change_type,
                "Failed to write audit record: {}",
                e
            );
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Payment verification failed: invalid signature")]
    PaymentVerificationFailed,

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),
}

impl From<CatalogError> for OrderError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(msg) => OrderError::InvalidRequest(msg),
            CatalogError::NotFound(id) => OrderError::InvalidRequest(format!("Unknown product {}", id)),
            CatalogError::Repository(e) => OrderError::Persistence(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_accepts_widget_field_names() {
        let conf: PaymentConfirmation = serde_json::from_value(json!({
            "razorpay_order_id": "order_1",
            "razorpay_payment_id": "pay_1",
            "razorpay_signature": "sig"
        }))
        .unwrap();
        assert_eq!(conf.gateway_order_id, "order_1");
        assert_eq!(conf.gateway_payment_id, "pay_1");

        let conf: PaymentConfirmation = serde_json::from_value(json!({
            "gatewayOrderId": "order_2",
            "gatewayPaymentId": "pay_2",
            "gatewaySignature": "sig"
        }))
        .unwrap();
        assert_eq!(conf.gateway_order_id, "order_2");
    }

    #[test]
    fn test_catalog_errors_map_to_order_errors() {
        let err: OrderError = CatalogError::NotFound("p1".to_string()).into();
        assert!(matches!(err, OrderError::InvalidRequest(_)));

        let err: OrderError = CatalogError::Repository(RepositoryError::Backend("down".to_string())).into();
        assert!(matches!(err, OrderError::Persistence(_)));
    }
}

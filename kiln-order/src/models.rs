use chrono::{DateTime, Utc};
use kiln_catalog::{PricedLine, Quote};
use kiln_shared::{Masked, Money};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    #[serde(alias = "Processing")]
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    #[serde(alias = "Pending Payment")]
    PendingPayment,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::PendingPayment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::PendingPayment => "pending_payment",
        }
    }

    /// States reachable from `self` in the normal flow
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Processing, PendingPayment, Cancelled],
            PendingPayment => &[Processing, Cancelled],
            Confirmed => &[Processing, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    /// Accepts the canonical names plus the legacy `Processing` and
    /// `Pending Payment` spellings still present in older documents.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" => return Ok(OrderStatus::Processing),
            "Pending Payment" => return Ok(OrderStatus::PendingPayment),
            _ => {}
        }
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cod,
    Online,
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(PaymentMethod::Cod),
            "online" => Ok(PaymentMethod::Online),
            other => Err(format!("Invalid payment method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    NotRequested,
    Requested,
    Processing,
    Refunded,
    Failed,
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefundStatus::NotRequested => "not_requested",
            RefundStatus::Requested => "requested",
            RefundStatus::Processing => "processing",
            RefundStatus::Refunded => "refunded",
            RefundStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Human-readable order identifier, `ORD-{unix millis}-{0..999}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate() -> Self {
        let suffix: u16 = rand::thread_rng().gen_range(0..1000);
        Self(format!("ORD-{}-{}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a product at order time. Never re-read from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Uuid,
    pub title: String,
    pub price: Money,
    pub quantity: u32,
    pub image: String,
}

impl From<PricedLine> for LineItem {
    fn from(line: PricedLine) -> Self {
        Self {
            product_id: line.product_id,
            title: line.title,
            price: line.price,
            quantity: line.quantity,
            image: line.image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub email: Masked<String>,
    pub phone: Masked<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

impl CustomerDetails {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("name", self.name.as_str()),
            ("email", self.email.expose().as_str()),
            ("phone", self.phone.expose().as_str()),
            ("address", self.address.as_str()),
            ("city", self.city.as_str()),
            ("state", self.state.as_str()),
            ("pincode", self.pincode.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(format!("customerDetails.{} is required", field));
        }
        if !self.email.expose().contains('@') {
            return Err("customerDetails.email is not a valid address".to_string());
        }
        Ok(())
    }
}

/// Gateway references, filled in as the online payment progresses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentDetails {
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefundDetails {
    pub refund_id: Option<String>,
    pub refund_amount: Money,
    pub refund_date: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub refund_error: Option<String>,
    pub upi_id: Option<Masked<String>>,
    pub bank_details: Option<Masked<String>>,
}

/// A single checkout transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub order_number: OrderNumber,
    pub items: Vec<LineItem>,
    pub customer_details: CustomerDetails,
    pub payment_method: PaymentMethod,
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub is_paid: bool,
    #[serde(default)]
    pub payment_details: PaymentDetails,
    #[serde(default)]
    pub refund_status: RefundStatus,
    #[serde(default)]
    pub refund_details: RefundDetails,
    pub order_date: DateTime<Utc>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build an order from a server-side quote. Online orders wait for
    /// payment in `pending`; cash-on-delivery orders go straight to `processing`.
    pub fn from_quote(
        order_number: OrderNumber,
        customer_details: CustomerDetails,
        payment_method: PaymentMethod,
        quote: Quote,
    ) -> Self {
        let now = Utc::now();
        let status = match payment_method {
            PaymentMethod::Online => OrderStatus::Pending,
            PaymentMethod::Cod => OrderStatus::Processing,
        };

        Self {
            id: Uuid::new_v4(),
            order_number,
            items: quote.lines.into_iter().map(LineItem::from).collect(),
            customer_details,
            payment_method,
            subtotal: quote.subtotal,
            shipping: quote.shipping,
            total: quote.total,
            status,
            payment_status: PaymentStatus::Pending,
            is_paid: false,
            payment_details: PaymentDetails::default(),
            refund_status: RefundStatus::NotRequested,
            refund_details: RefundDetails::default(),
            order_date: now,
            estimated_delivery: None,
            tracking_number: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update order status
    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// Record a verified online payment. Orders still waiting on payment
    /// move to `processing`; a cancelled order stays cancelled and becomes
    /// eligible for refund; shipped or delivered orders are not regressed.
    pub fn mark_paid(&mut self, gateway_payment_id: &str, gateway_signature: &str) {
        self.is_paid = true;
        self.payment_status = PaymentStatus::Paid;
        self.payment_details.gateway_payment_id = Some(gateway_payment_id.to_string());
        self.payment_details.gateway_signature = Some(gateway_signature.to_string());

        if matches!(
            self.status,
            OrderStatus::Pending
                | OrderStatus::PendingPayment
                | OrderStatus::Confirmed
                | OrderStatus::Processing
        ) {
            self.status = OrderStatus::Processing;
        }
        self.updated_at = Utc::now();
    }

    /// Online, paid, cancelled and not yet refunded
    pub fn refund_eligibility(&self) -> Result<(), String> {
        if self.payment_method != PaymentMethod::Online {
            return Err("cash-on-delivery orders cannot be refunded through the gateway".to_string());
        }
        if !self.is_paid {
            return Err("order has not been paid".to_string());
        }
        if self.status != OrderStatus::Cancelled {
            return Err("order must be cancelled before it is refunded".to_string());
        }
        if self.refund_status == RefundStatus::Refunded {
            return Err("order has already been refunded".to_string());
        }
        Ok(())
    }

    pub fn set_refund_status(&mut self, status: RefundStatus) {
        self.refund_status = status;
        self.updated_at = Utc::now();
    }

    /// Customer payout details for a manual refund
    pub fn record_refund_request(&mut self, upi_id: Option<String>, bank_details: Option<String>) {
        self.refund_details.upi_id = upi_id.map(Masked);
        self.refund_details.bank_details = bank_details.map(Masked);
        self.refund_details.refund_reason = Some("User requested refund".to_string());
        self.refund_details.refund_date = Some(Utc::now());
        self.set_refund_status(RefundStatus::Requested);
    }

    /// Gateway accepted the refund. `amount` is what the gateway reports.
    pub fn record_refund(&mut self, refund_id: String, amount: Money, reason: String) {
        self.refund_details.refund_id = Some(refund_id);
        self.refund_details.refund_amount = amount;
        self.refund_details.refund_date = Some(Utc::now());
        self.refund_details.refund_reason = Some(reason);
        self.refund_details.refund_error = None;
        self.set_refund_status(RefundStatus::Refunded);
    }

    pub fn record_refund_failure(&mut self, error: String, reason: String) {
        self.refund_details.refund_id = None;
        self.refund_details.refund_amount = Money::ZERO;
        self.refund_details.refund_date = Some(Utc::now());
        self.refund_details.refund_reason = Some(reason);
        self.refund_details.refund_error = Some(error);
        self.set_refund_status(RefundStatus::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> CustomerDetails {
        CustomerDetails {
            name: "Asha Rao".to_string(),
            user_id: None,
            email: Masked::from("asha@example.com"),
            phone: Masked::from("9876543210"),
            address: "12 Potters Lane".to_string(),
            city: "Khurja".to_string(),
            state: "Uttar Pradesh".to_string(),
            pincode: "203131".to_string(),
        }
    }

    fn quote(total: f64) -> Quote {
        Quote {
            lines: vec![PricedLine {
                product_id: Uuid::new_v4(),
                title: "Glazed Vase".to_string(),
                price: Money::from_major(total),
                quantity: 1,
                image: "vase.jpg".to_string(),
            }],
            subtotal: Money::from_major(total),
            shipping: Money::ZERO,
            total: Money::from_major(total),
        }
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Shipped.can_transition_to(Cancelled));

        assert!(!Processing.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Shipped));
        assert!(!Cancelled.can_transition_to(Delivered));

        assert!(Delivered.is_terminal());
        assert!(Cancelled.is_terminal());
        for status in OrderStatus::ALL {
            assert_eq!(status.is_terminal(), matches!(status, Delivered | Cancelled));
        }
    }

    #[test]
    fn test_legacy_status_spellings_normalize() {
        assert_eq!("Processing".parse::<OrderStatus>().unwrap(), OrderStatus::Processing);
        assert_eq!("Pending Payment".parse::<OrderStatus>().unwrap(), OrderStatus::PendingPayment);
        assert!("PROCESSING".parse::<OrderStatus>().is_err());

        let legacy: OrderStatus = serde_json::from_str("\"Processing\"").unwrap();
        assert_eq!(serde_json::to_string(&legacy).unwrap(), "\"processing\"");
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("cod".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cod);
        assert_eq!("online".parse::<PaymentMethod>().unwrap(), PaymentMethod::Online);
        assert!("card".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_initial_state_depends_on_payment_method() {
        let cod = Order::from_quote(OrderNumber::generate(), customer(), PaymentMethod::Cod, quote(400.0));
        assert_eq!(cod.status, OrderStatus::Processing);
        assert!(!cod.is_paid);

        let online =
            Order::from_quote(OrderNumber::generate(), customer(), PaymentMethod::Online, quote(400.0));
        assert_eq!(online.status, OrderStatus::Pending);
        assert_eq!(online.payment_status, PaymentStatus::Pending);
        assert_eq!(online.refund_status, RefundStatus::NotRequested);
    }

    #[test]
    fn test_mark_paid_does_not_revive_cancelled_order() {
        let mut order =
            Order::from_quote(OrderNumber::generate(), customer(), PaymentMethod::Online, quote(400.0));
        order.update_status(OrderStatus::Cancelled);
        order.mark_paid("pay_1", "sig");

        assert!(order.is_paid);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.refund_eligibility().is_ok());
    }

    #[test]
    fn test_refund_eligibility() {
        let mut order = Order::from_quote(OrderNumber::generate(), customer(), PaymentMethod::Cod, quote(400.0));
        order.is_paid = true;
        order.update_status(OrderStatus::Cancelled);
        assert!(order.refund_eligibility().is_err());

        order.payment_method = PaymentMethod::Online;
        assert!(order.refund_eligibility().is_ok());

        order.set_refund_status(RefundStatus::Refunded);
        assert!(order.refund_eligibility().is_err());
    }

    #[test]
    fn test_order_number_format() {
        let number = OrderNumber::generate();
        let parts: Vec<&str> = number.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert!(parts[1].parse::<i64>().is_ok());
        assert!(parts[2].parse::<u16>().unwrap() < 1000);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let order =
            Order::from_quote(OrderNumber::generate(), customer(), PaymentMethod::Online, quote(1000.0));
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["_id"], order.id.to_string());
        assert_eq!(json["paymentMethod"], "online");
        assert_eq!(json["refundStatus"], "not_requested");
        assert_eq!(json["total"], 1000);
        assert_eq!(json["customerDetails"]["email"], "asha@example.com");

        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn test_customer_details_validation() {
        assert!(customer().validate().is_ok());

        let mut missing_city = customer();
        missing_city.city = "  ".to_string();
        assert_eq!(missing_city.validate().unwrap_err(), "customerDetails.city is required");

        let mut bad_email = customer();
        bad_email.email = Masked::from("not-an-email");
        assert!(bad_email.validate().is_err());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who performed a lifecycle change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "subject", rename_all = "snake_case")]
pub enum Actor {
    Customer,
    /// Admin user, identified by the token subject
    Admin(String),
    /// Gateway callbacks and other non-human triggers
    System,
}

impl Actor {
    pub fn label(&self) -> String {
        match self {
            Actor::Customer => "customer".to_string(),
            Actor::Admin(subject) => format!("admin:{}", subject),
            Actor::System => "system".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    PaymentVerified,
    StatusUpdated,
    StatusOverridden,
    Cancelled,
    RefundRequested,
    RefundProcessing,
    Refunded,
    RefundFailed,
}

/// Append-only audit record of one lifecycle change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderChange {
    pub id: Uuid,
    pub order_id: Uuid,
    pub change_type: ChangeType,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub actor: Actor,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderChange {
    pub fn new(order_id: Uuid, change_type: ChangeType, actor: Actor) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            change_type,
            old_value: None,
            new_value: None,
            actor,
            reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_values(mut self, old_value: Value, new_value: Value) -> Self {
        self.old_value = Some(old_value);
        self.new_value = Some(new_value);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_serialization() {
        let order_id = Uuid::new_v4();
        let change = OrderChange::new(order_id, ChangeType::StatusOverridden, Actor::Admin("admin-7".to_string()))
            .with_values(json!({"status": "cancelled"}), json!({"status": "delivered"}))
            .with_reason("Courier confirmed delivery");

        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["changeType"], "status_overridden");
        assert_eq!(value["actor"], json!({"kind": "admin", "subject": "admin-7"}));
        assert_eq!(value["newValue"]["status"], "delivered");
        assert_eq!(change.actor.label(), "admin:admin-7");
    }
}

use async_trait::async_trait;
use kiln_core::{RepoResult, RepositoryError};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::changes::OrderChange;
use crate::models::Order;

/// Repository trait for order documents
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Fails with `Conflict` when the order number is already taken
    async fn insert_order(&self, order: &Order) -> RepoResult<()>;

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<Order>>;

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> RepoResult<Option<Order>>;

    /// Newest first
    async fn list_orders(&self) -> RepoResult<Vec<Order>>;

    /// Newest first
    async fn list_orders_for_user(&self, user_id: &str) -> RepoResult<Vec<Order>>;

    /// Replace the stored document. Last writer wins.
    async fn save_order(&self, order: &Order) -> RepoResult<()>;

    async fn add_order_change(&self, change: &OrderChange) -> RepoResult<()>;

    /// Oldest first
    async fn list_order_changes(&self, order_id: Uuid) -> RepoResult<Vec<OrderChange>>;
}

/// Process-local document store used by tests and the `memory` storage backend
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
    changes: RwLock<Vec<OrderChange>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert_order(&self, order: &Order) -> RepoResult<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict(format!("order id {}", order.id)));
        }
        if orders.values().any(|o| o.order_number == order.order_number) {
            return Err(RepositoryError::Conflict(format!(
                "order number {}",
                order.order_number
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> RepoResult<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.payment_details.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn list_orders(&self) -> RepoResult<Vec<Order>> {
        let orders = self.orders.read().await.values().cloned().collect();
        Ok(newest_first(orders))
    }

    async fn list_orders_for_user(&self, user_id: &str) -> RepoResult<Vec<Order>> {
        let orders = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.customer_details.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        Ok(newest_first(orders))
    }

    async fn save_order(&self, order: &Order) -> RepoResult<()> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("order {}", order.id))),
        }
    }

    async fn add_order_change(&self, change: &OrderChange) -> RepoResult<()> {
        self.changes.write().await.push(change.clone());
        Ok(())
    }

    async fn list_order_changes(&self, order_id: Uuid) -> RepoResult<Vec<OrderChange>> {
        Ok(self
            .changes
            .read()
            .await
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect())
    }
}

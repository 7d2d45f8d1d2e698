use async_trait::async_trait;
use kiln_core::{RepoResult, RepositoryError};
use kiln_order::{Order, OrderChange, OrderRepository};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::repo_error;

/// Orders stored as jsonb documents, with the lookup keys lifted into columns
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    document: Json<Order>,
}

#[derive(sqlx::FromRow)]
struct ChangeRow {
    document: Json<OrderChange>,
}

fn change_type_label(change: &OrderChange) -> RepoResult<String> {
    serde_json::to_value(change.change_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| RepositoryError::Backend("unserializable change type".to_string()))
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert_order(&self, order: &Order) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, gateway_order_id, user_id, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id)
        .bind(order.order_number.as_str())
        .bind(order.payment_details.gateway_order_id.as_deref())
        .bind(order.customer_details.user_id.as_deref())
        .bind(Json(order))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(repo_error)?;

        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT document FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(repo_error)?;

        Ok(row.map(|r| r.document.0))
    }

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> RepoResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT document FROM orders WHERE gateway_order_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(repo_error)?;

        Ok(row.map(|r| r.document.0))
    }

    async fn list_orders(&self) -> RepoResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT document FROM orders ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(repo_error)?;

        Ok(rows.into_iter().map(|r| r.document.0).collect())
    }

    async fn list_orders_for_user(&self, user_id: &str) -> RepoResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT document FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_error)?;

        Ok(rows.into_iter().map(|r| r.document.0).collect())
    }

    async fn save_order(&self, order: &Order) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET gateway_order_id = $2, document = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.payment_details.gateway_order_id.as_deref())
        .bind(Json(order))
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(repo_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("order {}", order.id)));
        }
        Ok(())
    }

    async fn add_order_change(&self, change: &OrderChange) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_changes (id, order_id, change_type, document, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(change.id)
        .bind(change.order_id)
        .bind(change_type_label(change)?)
        .bind(Json(change))
        .bind(change.created_at)
        .execute(&self.pool)
        .await
        .map_err(repo_error)?;

        Ok(())
    }

    async fn list_order_changes(&self, order_id: Uuid) -> RepoResult<Vec<OrderChange>> {
        let rows = sqlx::query_as::<_, ChangeRow>(
            "SELECT document FROM order_changes WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_error)?;

        Ok(rows.into_iter().map(|r| r.document.0).collect())
    }
}

use async_trait::async_trait;
use kiln_catalog::{Product, ProductRepository};
use kiln_core::{RepoResult, RepositoryError};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::repo_error;

pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    document: Json<Product>,
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn create_product(&self, product: &Product) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(product.id)
        .bind(Json(product))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(repo_error)?;

        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT document FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(repo_error)?;

        Ok(row.map(|r| r.document.0))
    }

    async fn list_products(&self) -> RepoResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT document FROM products ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(repo_error)?;

        Ok(rows.into_iter().map(|r| r.document.0).collect())
    }

    async fn update_product(&self, product: &Product) -> RepoResult<()> {
        let result = sqlx::query("UPDATE products SET document = $2, updated_at = $3 WHERE id = $1")
            .bind(product.id)
            .bind(Json(product))
            .bind(product.updated_at)
            .execute(&self.pool)
            .await
            .map_err(repo_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("product {}", product.id)));
        }
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("DELETE FROM products WHERE id = $1 RETURNING document")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(repo_error)?;

        Ok(row.map(|r| r.document.0))
    }

    async fn search_products(&self, query: &str, limit: usize) -> RepoResult<Vec<Product>> {
        let pattern = format!(
            "%{}%",
            query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT document FROM products
            WHERE document->>'title' ILIKE $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_error)?;

        Ok(rows.into_iter().map(|r| r.document.0).collect())
    }
}

use async_trait::async_trait;
use kiln_core::{RepoResult, RepositoryError};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::product::Product;

/// Repository trait for product catalog access
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create_product(&self, product: &Product) -> RepoResult<()>;

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>>;

    /// Newest first
    async fn list_products(&self) -> RepoResult<Vec<Product>>;

    async fn update_product(&self, product: &Product) -> RepoResult<()>;

    /// Returns the removed product, `None` if it did not exist
    async fn delete_product(&self, id: Uuid) -> RepoResult<Option<Product>>;

    /// Case-insensitive title match, newest first, at most `limit` results
    async fn search_products(&self, query: &str, limit: usize) -> RepoResult<Vec<Product>> {
        let needle = query.to_lowercase();
        Ok(self
            .list_products()
            .await?
            .into_iter()
            .filter(|p| p.title.to_lowercase().contains(&needle))
            .take(limit)
            .collect())
    }
}

/// Process-local catalog used by tests and the `memory` storage backend
#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<Uuid, Product>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn create_product(&self, product: &Product) -> RepoResult<()> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(RepositoryError::Conflict(format!("product {}", product.id)));
        }
        products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn list_products(&self) -> RepoResult<Vec<Product>> {
        let mut products: Vec<Product> = self.products.read().await.values().cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn update_product(&self, product: &Product) -> RepoResult<()> {
        let mut products = self.products.write().await;
        match products.get_mut(&product.id) {
            Some(existing) => {
                *existing = product.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("product {}", product.id))),
        }
    }

    async fn delete_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        Ok(self.products.write().await.remove(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{Category, NewProduct};
    use kiln_shared::Money;

    fn product(title: &str) -> Product {
        NewProduct {
            title: title.to_string(),
            images: vec!["p.jpg".to_string()],
            description: "Glazed stoneware piece".to_string(),
            price: Money::from_major(250.0),
            category: Category::Vases,
            rating: None,
        }
        .into_product()
        .unwrap()
    }

    #[tokio::test]
    async fn test_crud_and_search() {
        let repo = InMemoryProductRepository::new();
        let vase = product("Celadon Vase");
        repo.create_product(&vase).await.unwrap();
        repo.create_product(&product("Bud Vase")).await.unwrap();
        repo.create_product(&product("Serving Jug")).await.unwrap();

        assert!(matches!(
            repo.create_product(&vase).await,
            Err(RepositoryError::Conflict(_))
        ));

        let hits = repo.search_products("VASE", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(repo.search_products("vase", 1).await.unwrap().len(), 1);

        let mut renamed = vase.clone();
        renamed.title = "Celadon Urn".to_string();
        repo.update_product(&renamed).await.unwrap();
        assert_eq!(repo.get_product(vase.id).await.unwrap().unwrap().title, "Celadon Urn");

        assert_eq!(repo.delete_product(vase.id).await.unwrap().map(|p| p.id), Some(vase.id));
        assert!(repo.delete_product(vase.id).await.unwrap().is_none());
        assert!(matches!(
            repo.update_product(&renamed).await,
            Err(RepositoryError::NotFound(_))
        ));
    }
}

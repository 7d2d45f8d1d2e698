use chrono::{DateTime, Utc};
use kiln_core::RepositoryError;
use kiln_shared::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TITLE_MIN: usize = 3;
const TITLE_MAX: usize = 100;
const DESCRIPTION_MIN: usize = 10;
const RATING_MAX: f64 = 5.0;

/// Storefront categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Dinning,
    Pots,
    Jugs,
    Mugs,
    Plates,
    #[serde(rename = "Home Decor")]
    HomeDecor,
    Vases,
    Others,
}

/// A catalog entry. Its `price` is the authoritative price checkout uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "image")]
    pub images: Vec<String>,
    pub description: String,
    pub price: Money,
    pub category: Category,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// First image, used as the line-item thumbnail on orders
    pub fn primary_image(&self) -> &str {
        self.images.first().map(String::as_str).unwrap_or_default()
    }

    /// Apply a partial update and re-validate the result
    pub fn apply(&mut self, update: ProductUpdate) -> Result<(), CatalogError> {
        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(images) = update.images {
            self.images = images;
        }
        if let Some(description) = update.description {
            self.description = description.trim().to_string();
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(rating) = update.rating {
            self.rating = round_rating(rating);
        }

        validate(&self.title, &self.images, &self.description, self.price, self.rating)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Payload for adding a product
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub title: String,
    #[serde(rename = "image")]
    pub images: Vec<String>,
    pub description: String,
    pub price: Money,
    pub category: Category,
    pub rating: Option<f64>,
}

impl NewProduct {
    pub fn into_product(self) -> Result<Product, CatalogError> {
        let title = self.title.trim().to_string();
        let description = self.description.trim().to_string();
        let rating = round_rating(self.rating.unwrap_or(0.0));

        validate(&title, &self.images, &description, self.price, rating)?;

        let now = Utc::now();
        Ok(Product {
            id: Uuid::new_v4(),
            title,
            images: self.images,
            description,
            price: self.price,
            category: self.category,
            rating,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Payload for a partial product update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub title: Option<String>,
    #[serde(rename = "image")]
    pub images: Option<Vec<String>>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub category: Option<Category>,
    pub rating: Option<f64>,
}

fn round_rating(rating: f64) -> f64 {
    (rating * 10.0).round() / 10.0
}

fn validate(
    title: &str,
    images: &[String],
    description: &str,
    price: Money,
    rating: f64,
) -> Result<(), CatalogError> {
    let title_len = title.chars().count();
    if !(TITLE_MIN..=TITLE_MAX).contains(&title_len) {
        return Err(CatalogError::Validation(format!(
            "title must be between {} and {} characters",
            TITLE_MIN, TITLE_MAX
        )));
    }
    if description.chars().count() < DESCRIPTION_MIN {
        return Err(CatalogError::Validation(format!(
            "description must be at least {} characters",
            DESCRIPTION_MIN
        )));
    }
    if images.iter().all(|i| i.trim().is_empty()) {
        return Err(CatalogError::Validation("at least one image is required".to_string()));
    }
    if price.is_negative() {
        return Err(CatalogError::Validation("price cannot be negative".to_string()));
    }
    if !(0.0..=RATING_MAX).contains(&rating) {
        return Err(CatalogError::Validation(format!("rating must be between 0 and {}", RATING_MAX)));
    }
    Ok(())
}

/// Catalog-related errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Invalid product: {0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

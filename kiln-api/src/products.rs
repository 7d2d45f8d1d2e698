use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Json, Router,
};
use kiln_catalog::{CatalogError, NewProduct, Product, ProductUpdate};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ApiJson, ApiPath, ApiQuery, AppError};
use crate::middleware::admin_auth_middleware;
use crate::state::AppState;

const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/getall", get(list_products))
        .route("/get/{id}", get(get_product))
        .route("/search", get(search_products));

    let admin = Router::new()
        .route("/add", post(create_product))
        .route("/update/{id}", put(update_product))
        .route("/delete/{id}", delete(delete_product))
        .route_layer(from_fn_with_state(state, admin_auth_middleware));

    public.merge(admin)
}

/// POST /api/products/add
async fn create_product(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewProduct>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let product = req.into_product()?;
    state.products.create_product(&product).await?;

    tracing::info!(product_id = %product.id, title = %product.title, "Product added");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Product added successfully",
            "product": product,
        })),
    ))
}

/// GET /api/products/getall
async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.products.list_products().await?))
}

/// GET /api/products/get/{id}
async fn get_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Product>, AppError> {
    let product = state
        .products
        .get_product(id)
        .await?
        .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
    Ok(Json(product))
}

/// GET /api/products/search?q=
async fn search_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return Err(AppError::InvalidRequest("Query is required".to_string()));
    }

    let products = state.products.search_products(q, SEARCH_LIMIT).await?;
    tracing::debug!(query = %q, results = products.len(), "Product search");
    Ok(Json(products))
}

/// PUT /api/products/update/{id}
async fn update_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<ProductUpdate>,
) -> Result<Json<Value>, AppError> {
    let mut product = state
        .products
        .get_product(id)
        .await?
        .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

    product.apply(update)?;
    state.products.update_product(&product).await?;

    Ok(Json(json!({
        "message": "Product updated successfully",
        "product": product,
    })))
}

/// DELETE /api/products/delete/{id}
async fn delete_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    let product = state
        .products
        .delete_product(id)
        .await?
        .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

    tracing::info!(product_id = %product.id, "Product deleted");
    Ok(Json(json!({
        "message": "Product deleted successfully",
        "product": product,
    })))
}

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use kiln_catalog::{CartLine, ClientTotals};
use kiln_order::{
    CheckoutRequest, CustomerDetails, OrderChange, OrderStatus, PaymentConfirmation, RefundOutcome,
    RefundRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ApiJson, ApiPath, AppError};
use crate::middleware::{admin_auth_middleware, gateway_circuit_middleware, Claims, GatewayOutage};
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<CartLine>,
    pub customer_details: CustomerDetails,
    pub payment_method: String,
    /// Totals as displayed by the storefront; checked against the server quote
    #[serde(flatten)]
    pub totals: ClientTotals,
}

impl From<CreateOrderRequest> for CheckoutRequest {
    fn from(req: CreateOrderRequest) -> Self {
        CheckoutRequest {
            items: req.items,
            customer_details: req.customer_details,
            payment_method: req.payment_method,
            totals: req.totals,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct OverrideStatusRequest {
    pub status: OrderStatus,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOrderRequest {
    pub refund_reason: Option<String>,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/verify-payment", post(verify_payment))
        .route("/user/{user_id}", get(list_user_orders))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", put(cancel_order))
        .route("/{id}/request-refund", put(request_refund));

    let checkout = Router::new()
        .route("/create", post(create_order))
        .route_layer(from_fn_with_state(state.clone(), gateway_circuit_middleware));

    let admin = Router::new()
        .route("/", get(list_orders))
        .route("/{id}/status", put(update_status))
        .route("/{id}/status/override", put(override_status))
        .route("/{id}/history", get(order_history))
        .route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    let refunds = Router::new()
        .route("/{id}/refund", put(refund_order))
        .route_layer(from_fn_with_state(state.clone(), gateway_circuit_middleware))
        .route_layer(from_fn_with_state(state, admin_auth_middleware));

    public.merge(checkout).merge(admin).merge(refunds)
}

// ============================================================================
// Customer Handlers
// ============================================================================

/// POST /api/orders/create
async fn create_order(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let created = state.orders.create_order(req.into()).await?;

    let message = if created.gateway_order.is_some() {
        "Order created, proceed to payment"
    } else {
        "Order placed successfully (COD)"
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": message,
            "order": created.order,
            "gatewayOrder": created.gateway_order,
        })),
    ))
}

/// POST /api/orders/verify-payment
async fn verify_payment(
    State(state): State<AppState>,
    ApiJson(confirmation): ApiJson<PaymentConfirmation>,
) -> Result<Json<Value>, AppError> {
    let order = state.orders.verify_payment(confirmation).await?;

    Ok(Json(json!({
        "message": "Payment verified successfully",
        "orderId": order.id,
        "order": order,
    })))
}

/// GET /api/orders/user/{user_id}
async fn list_user_orders(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<String>,
) -> Result<Json<Value>, AppError> {
    let orders = state.orders.list_user_orders(&user_id).await?;
    Ok(Json(json!(orders)))
}

/// GET /api/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    let order = state.orders.get_order(id).await?;
    Ok(Json(json!(order)))
}

/// PUT /api/orders/{id}/cancel
async fn cancel_order(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    let order = state.orders.cancel_order(id).await?;

    Ok(Json(json!({
        "message": "Order cancelled successfully",
        "order": order,
    })))
}

/// PUT /api/orders/{id}/request-refund
async fn request_refund(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<RefundRequest>,
) -> Result<Json<Value>, AppError> {
    let order = state.orders.request_refund(id, req).await?;

    Ok(Json(json!({
        "message": "Refund request submitted",
        "order": order,
    })))
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// GET /api/orders
async fn list_orders(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let orders = state.orders.list_orders().await?;
    Ok(Json(json!(orders)))
}

/// PUT /api/orders/{id}/status
async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let order = state.orders.update_status(id, req.status, &claims.sub).await?;
    Ok(Json(json!(order)))
}

/// PUT /api/orders/{id}/status/override
async fn override_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<OverrideStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let order = state
        .orders
        .override_status(id, req.status, &req.reason, &claims.sub)
        .await?;
    Ok(Json(json!(order)))
}

/// GET /api/orders/{id}/history
async fn order_history(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<OrderChange>>, AppError> {
    Ok(Json(state.orders.order_history(id).await?))
}

/// PUT /api/orders/{id}/refund
///
/// The body is optional; an empty body refunds with the default reason.
async fn refund_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> Result<Response, AppError> {
    let req = if body.is_empty() {
        RefundOrderRequest::default()
    } else {
        serde_json::from_slice::<RefundOrderRequest>(&body)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid refund request: {}", e)))?
    };

    let outcome = state.orders.refund(id, req.refund_reason, &claims.sub).await?;

    let response = match outcome {
        RefundOutcome::Refunded(order) => (
            StatusCode::OK,
            Json(json!({
                "message": "Refund processed successfully",
                "order": order,
            })),
        )
            .into_response(),
        RefundOutcome::Failed { order, error, outage } => {
            let mut response = (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "message": "Refund failed",
                    "error": error,
                    "order": order,
                })),
            )
                .into_response();
            if outage {
                response.extensions_mut().insert(GatewayOutage);
            }
            response
        }
    };

    Ok(response)
}

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kiln_catalog::CatalogError;
use kiln_core::RepositoryError;
use kiln_order::OrderError;
use serde_json::json;

use crate::middleware::GatewayOutage;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    InvalidStateTransition(String),
    #[error("Invalid signature")]
    PaymentVerificationFailed,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    Gateway(String),
    #[error("{0}")]
    GatewayDown(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::InvalidStateTransition(_) => (StatusCode::BAD_REQUEST, "invalid_state_transition"),
            AppError::PaymentVerificationFailed => (StatusCode::BAD_REQUEST, "payment_verification_failed"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Gateway(_) | AppError::GatewayDown(_) => (StatusCode::BAD_GATEWAY, "gateway_error"),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match &self {
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "message": message,
            "error": code,
        }));

        let mut response = (status, body).into_response();
        if matches!(self, AppError::GatewayDown(_)) {
            response.extensions_mut().insert(GatewayOutage);
        }
        response
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidRequest(msg) => AppError::InvalidRequest(msg),
            OrderError::OrderNotFound(_) => AppError::NotFound("Order not found".to_string()),
            e @ OrderError::InvalidStateTransition { .. } => AppError::InvalidStateTransition(e.to_string()),
            OrderError::PaymentVerificationFailed => AppError::PaymentVerificationFailed,
            OrderError::Gateway(e) => {
                tracing::error!("Payment gateway failure: {}", e);
                if e.is_outage() {
                    AppError::GatewayDown(e.to_string())
                } else {
                    AppError::Gateway(e.to_string())
                }
            }
            OrderError::Persistence(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => AppError::NotFound("Product not found".to_string()),
            CatalogError::Validation(msg) => AppError::InvalidRequest(msg),
            CatalogError::Repository(e) => e.into(),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        if rejection.status().is_server_error() {
            AppError::Internal(rejection.body_text())
        } else {
            AppError::InvalidRequest(rejection.body_text())
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// `axum::Json` with rejections rendered as `{message, error}` bodies
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_errors_map_to_status_codes() {
        let cases = [
            (OrderError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (OrderError::OrderNotFound("x".into()), StatusCode::NOT_FOUND),
            (OrderError::PaymentVerificationFailed, StatusCode::BAD_REQUEST),
            (
                OrderError::InvalidStateTransition {
                    from: "delivered".into(),
                    to: "cancelled".into(),
                    reason: "order cannot be cancelled".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                OrderError::Gateway(kiln_core::payment::GatewayError::Transport("timeout".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                OrderError::Persistence(RepositoryError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_only_unreachable_gateway_is_marked_as_outage() {
        use kiln_core::payment::GatewayError;

        let down = AppError::from(OrderError::Gateway(GatewayError::Transport("timeout".into()))).into_response();
        assert_eq!(down.status(), StatusCode::BAD_GATEWAY);
        assert!(down.extensions().get::<GatewayOutage>().is_some());

        let refused =
            AppError::from(OrderError::Gateway(GatewayError::Rejected("already refunded".into()))).into_response();
        assert_eq!(refused.status(), StatusCode::BAD_GATEWAY);
        assert!(refused.extensions().get::<GatewayOutage>().is_none());
    }

    #[tokio::test]
    async fn test_internal_details_are_not_leaked() {
        let response = AppError::Internal("connection refused on 10.0.0.5".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"message": "Internal Server Error", "error": "internal_error"}));
    }
}

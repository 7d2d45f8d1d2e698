use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::{AppState, AuthConfig};

pub const ADMIN_ROLE: &str = "admin";

/// Token claims shared with the user service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    #[serde(alias = "id")]
    pub sub: String,
    #[serde(default)]
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ADMIN_ROLE)
    }
}

impl AuthConfig {
    /// Sign a token that expires after the configured lifetime
    pub fn issue_token(&self, subject: &str, role: &str) -> Result<String, AppError> {
        let exp = chrono::Utc::now() + chrono::Duration::seconds(self.expiration as i64);
        let claims = Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            exp: exp.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            AppError::Authentication("Invalid or expired token".to_string())
        })
    }
}

/// Requires a bearer token carrying the admin role. The claims are placed in
/// the request extensions for the handler.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Authentication("Missing bearer token".to_string()))?;

    let claims = state.auth.verify_token(bearer.token())?;
    if !claims.is_admin() {
        tracing::warn!(subject = %claims.sub, role = %claims.role, "Admin route refused");
        return Err(AppError::Authorization("Admin access required".to_string()));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthConfig {
        AuthConfig {
            secret: "unit-test-secret".to_string(),
            expiration: 60,
        }
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let token = auth().issue_token("admin-1", "admin").unwrap();
        let claims = auth().verify_token(&token).unwrap();
        assert_eq!(claims.sub, "admin-1");
        assert!(claims.is_admin());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = auth().issue_token("admin-1", "admin").unwrap();
        let other = AuthConfig {
            secret: "another-secret".to_string(),
            expiration: 60,
        };
        assert!(matches!(other.verify_token(&token), Err(AppError::Authentication(_))));
    }

    #[test]
    fn test_user_service_id_claim_is_accepted() {
        let claims: Claims =
            serde_json::from_str(r#"{"id": "64f0c2", "role": "user", "exp": 4102444800}"#).unwrap();
        assert_eq!(claims.sub, "64f0c2");
        assert!(!claims.is_admin());
    }
}

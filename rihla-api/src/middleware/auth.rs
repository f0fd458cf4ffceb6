use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rihla_core::{BookingError, TokenVerifier};
use rihla_shared::UserId;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

/// Only the subject is trusted from the token; roles come from the directory.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// HS256 bearer token verifier.
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign a token for `sub`, valid for `ttl_seconds`.
    pub fn issue(&self, sub: &str, ttl_seconds: i64) -> Result<String, BookingError> {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now() + chrono::Duration::seconds(ttl_seconds)).timestamp() as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| BookingError::Authentication(format!("token encoding failed: {}", e)))
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<UserId, BookingError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|e| BookingError::Authentication(format!("invalid bearer token: {}", e)))
    }
}

// ============================================================================
// Principal Middleware
// ============================================================================

/// Resolve the caller once per request and put the `Principal` into the
/// request extensions. No `Authorization` header means a guest.
pub async fn principal_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer.as_ref().map(|TypedHeader(Authorization(b))| b.token());
    let principal = state.resolver.resolve(token).await?;

    tracing::debug!(principal = %principal.id, role = %principal.role, "Principal resolved");
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

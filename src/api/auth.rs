//! Minimal JWT auth.
//!
//! - A registered user logs in with their email at `/api/auth/login`
//! - Server returns a JWT valid for ~30 days
//! - All protected endpoints require `Authorization: Bearer <jwt>`
//!
//! Credential verification (the OTP flow) is an external collaborator; this
//! layer only supplies an authenticated principal to the core operations.
//! The middleware re-loads the user on every request so ownership and role
//! guards always see the current role, never a stale claim.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

use super::routes::AppState;
use super::types::{LoginRequest, LoginResponse};
use crate::users::User;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    /// Subject: user id.
    sub: String,
    /// Role at issue time (informational; guards use the stored role).
    #[serde(default)]
    rol: String,
    /// Issued-at unix seconds
    iat: i64,
    /// Expiration unix seconds
    exp: i64,
}

fn issue_jwt(secret: &str, ttl_days: i64, user: &User) -> anyhow::Result<(String, i64)> {
    let now = Utc::now();
    let exp = now + Duration::days(ttl_days.max(1));
    let claims = Claims {
        sub: user.id.clone(),
        rol: user.role.as_str().to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims.exp))
}

fn verify_jwt(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let validation = Validation::default();
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}

/// POST /api/auth/login - Issue a token for a registered email.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    let email = req.email.trim();
    if email.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Email required".to_string()));
    }

    // One generic message for unknown emails to avoid account enumeration.
    let user = state
        .store
        .user_by_email(email)
        .await
        .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()))?;

    let secret = state.config.jwt_secret().ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "JWT_SECRET not configured".to_string(),
        )
    })?;

    let (token, exp) = issue_jwt(secret, state.config.jwt_ttl_days, &user)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(LoginResponse {
        token,
        exp,
        user_id: user.id,
        role: user.role,
    }))
}

/// Middleware: verify the bearer token and attach the current `User`.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let secret = match state.config.jwt_secret() {
        Some(s) => s,
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "JWT_SECRET not configured",
            )
                .into_response();
        }
    };

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .unwrap_or("");

    if token.is_empty() {
        return (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response();
    }

    let claims = match verify_jwt(token, secret) {
        Ok(claims) => claims,
        Err(_) => {
            return (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response();
        }
    };

    match state.store.user_by_id(&claims.sub).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(_) => (StatusCode::UNAUTHORIZED, "Unknown user").into_response(),
    }
}

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use quibble_shared::{ApiResponse, AuthResponse, TokenRequest, User};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, AppState};

// ── JWT Claims ──

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,   // user id
    pub exp: usize, // expiry (unix timestamp)
}

impl Claims {
    pub fn new(user_id: i64) -> Self {
        let exp = thirty_days_from_now();
        Self { sub: user_id, exp }
    }
}

fn thirty_days_from_now() -> usize {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as usize;
    now + 30 * 24 * 60 * 60
}

// ── Identity extraction ──

/// Reads the authenticated user id from the `Authorization: Bearer` header.
/// Absent or invalid token → Unauthorized; callers perform no mutation.
pub fn extract_user_id(headers: &HeaderMap, jwt_secret: &str) -> Result<i64, ApiError> {
    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    Ok(data.claims.sub)
}

pub fn sign_token(user_id: i64, jwt_secret: &str) -> Result<String, ApiError> {
    encode(
        &Header::default(),
        &Claims::new(user_id),
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|_| ApiError::Store)
}

// ── Handlers ──

/// POST /api/auth/token — development stand-in for the external identity
/// provider: upserts a user by name and returns a signed token for it.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let username = payload.username.trim().to_string();
    if username.is_empty() {
        let mut details = crate::error::FieldErrors::new();
        details
            .entry("username".to_string())
            .or_default()
            .push("Username is required".to_string());
        return Err(ApiError::validation(details));
    }

    let avatar = payload.avatar_url.unwrap_or_default();
    let pool = state.db.clone();

    let user = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO users (username, avatar_url) VALUES (?1, ?2)
             ON CONFLICT(username) DO UPDATE SET avatar_url = ?2",
            rusqlite::params![username, avatar],
        )?;

        let user = conn.query_row(
            "SELECT id, username, avatar_url FROM users WHERE username = ?1",
            [&username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    avatar_url: row.get(2)?,
                })
            },
        )?;

        Ok::<_, ApiError>(user)
    })
    .await??;

    let token = sign_token(user.id, &state.jwt_secret)?;

    Ok(Json(ApiResponse::ok(AuthResponse { token, user })))
}

/// GET /api/auth/me — return the current user
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user_id = extract_user_id(&headers, &state.jwt_secret)?;

    let pool = state.db.clone();
    let user = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        conn.query_row(
            "SELECT id, username, avatar_url FROM users WHERE id = ?1",
            [user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    avatar_url: row.get(2)?,
                })
            },
        )
        .map_err(|_| ApiError::NotFound("User"))
    })
    .await??;

    Ok(Json(ApiResponse::ok(user)))
}

//! Center API key authentication middleware.
//!
//! This middleware intercepts every `/api/v1` request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and look up the active key and its center
//! 3. Inject the center context into the request
//! 4. Reject unauthorized requests with HTTP 401

use crate::{db::DbPool, error::AppError, models::center_api_key::CenterApiKey};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Tenant context attached to authenticated requests.
///
/// Every query a handler runs is scoped by `center_id`, so one center never
/// sees another center's students, fees, or audit records.
#[derive(Debug, Clone)]
pub struct CenterContext {
    /// Tenant the request acts on
    pub center_id: Uuid,

    /// Shown in the logs of center-wide runs
    pub center_name: String,
}

/// Hex-encoded SHA-256 of a secret. Only hashes of API keys and legacy
/// portal tokens are stored.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the value of an `Authorization: Bearer <token>` header.
pub fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Center API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Look up the matching active key joined with its center
/// 4. If found: inject `CenterContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
///
/// # Returns
///
/// - `Ok(Response)` if authenticated successfully (calls next handler)
/// - `Err(AppError::InvalidApiKey)` if authentication fails (returns 401)
pub async fn center_auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = bearer_token(&request).ok_or(AppError::InvalidApiKey)?;
    let key_hash = hash_secret(api_key);

    let key = sqlx::query_as::<_, CenterApiKey>(
        r#"
        SELECT k.id, k.center_id, c.name AS center_name
        FROM center_api_keys k
        JOIN centers c ON c.id = k.center_id
        WHERE k.key_hash = $1 AND k.is_active = true
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    tracing::debug!(
        api_key_id = %key.id,
        center = %key.center_name,
        "center request authenticated"
    );

    let context = CenterContext {
        center_id: key.center_id,
        center_name: key.center_name,
    };

    // Handlers extract this with Extension<CenterContext>
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn hashes_are_hex_sha256() {
        assert_eq!(
            hash_secret("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn bearer_prefix_is_required() {
        let request = Request::builder()
            .header("Authorization", "Bearer key_123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("key_123"));

        let request = Request::builder()
            .header("Authorization", "Basic key_123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(bearer_token(&request), None);
    }
}

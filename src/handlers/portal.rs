//! Portal HTTP handlers.
//!
//! Center-authenticated token management:
//! - POST /api/v1/portal-tokens - Issue a token
//! - DELETE /api/v1/portal-tokens/{id} - Revoke a token
//!
//! Portal-authenticated views:
//! - GET /portal/v1/fees - Fees of the token's student

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::CenterContext,
    models::portal::{IssuePortalTokenRequest, IssuedPortalToken, PortalContext},
    services::portal_service,
    state::AppState,
};

/// Issue a portal token.
///
/// # Endpoint
///
/// `POST /api/v1/portal-tokens`
///
/// # Request Body
///
/// ```json
/// { "role": "student", "subject_id": "660e8400-...", "ttl_hours": 72 }
/// ```
///
/// Set `"legacy": true` to get an opaque UUID token instead of a JWT.
///
/// # Response
///
/// - **Success (200 OK)**: The token, shown only this once
/// - **Error (400)**: `ttl_hours` out of range
/// - **Error (404)**: Student or parent token for a student not in this center
pub async fn issue_portal_token(
    State(state): State<AppState>,
    Extension(center): Extension<CenterContext>,
    Json(request): Json<IssuePortalTokenRequest>,
) -> Result<Json<IssuedPortalToken>, AppError> {
    let issued =
        portal_service::issue(&state.pool, &state.portal_keys, center.center_id, request).await?;

    Ok(Json(issued))
}

/// Revoke a portal token.
///
/// # Endpoint
///
/// `DELETE /api/v1/portal-tokens/{id}`
///
/// # Response
///
/// - **Success (200 OK)**: `{ "success": true, "id": "..." }`
/// - **Error (404)**: Token not found in this center
pub async fn revoke_portal_token(
    State(state): State<AppState>,
    Extension(center): Extension<CenterContext>,
    Path(token_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    portal_service::revoke(&state.pool, center.center_id, token_id).await?;

    Ok(Json(json!({
        "success": true,
        "id": token_id,
    })))
}

/// Fees visible to the portal session.
///
/// # Endpoint
///
/// `GET /portal/v1/fees`
///
/// # Authentication
///
/// Student or parent portal token. Teacher tokens are rejected with 401.
pub async fn portal_fees(
    State(state): State<AppState>,
    Extension(portal): Extension<PortalContext>,
) -> Result<Json<Value>, AppError> {
    let fees = portal_service::portal_fees(&state.pool, &portal).await?;

    Ok(Json(json!({
        "success": true,
        "student_id": portal.subject_id,
        "fees": fees,
    })))
}

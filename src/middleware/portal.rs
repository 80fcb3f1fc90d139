//! Portal token authentication middleware.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError, middleware::auth::bearer_token, services::portal_service, state::AppState,
};

/// Authenticate a `/portal/v1` request.
///
/// Accepts `Authorization: Bearer <token>` where the token is either a portal
/// JWT or a legacy UUID token. On success a `PortalContext` is injected into
/// the request extensions; otherwise the request is rejected with HTTP 401.
pub async fn portal_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)
        .ok_or(AppError::InvalidPortalToken)?
        .to_string();

    let context = portal_service::verify(&state.pool, &state.portal_keys, &token).await?;

    tracing::debug!(
        token_id = %context.token_id,
        role = %context.role,
        "portal request authenticated"
    );

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

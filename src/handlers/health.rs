//! Liveness endpoint for load balancers and uptime checks.

use crate::{db::DbPool, error::AppError};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub database: &'static str,

    /// Open pool connections and how many of them are idle
    pub pool_size: u32,
    pub pool_idle: usize,

    pub timestamp: DateTime<Utc>,
}

/// `GET /health` (public)
///
/// ```json
/// {
///   "success": true,
///   "status": "healthy",
///   "database": "connected",
///   "pool_size": 3,
///   "pool_idle": 2,
///   "timestamp": "2025-03-01T08:00:00Z"
/// }
/// ```
///
/// An unreachable database yields the standard 500 error body.
pub async fn health_check(State(pool): State<DbPool>) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&pool).await?;

    Ok(Json(HealthResponse {
        success: true,
        status: "healthy",
        database: "connected",
        pool_size: pool.size(),
        pool_idle: pool.num_idle(),
        timestamp: Utc::now(),
    }))
}

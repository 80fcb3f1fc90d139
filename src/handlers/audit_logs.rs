//! Audit log HTTP handlers.
//!
//! This module implements the audit endpoints:
//! - GET /api/v1/audit-logs - List the center's audit records
//! - GET /api/v1/audit-logs/{id} - One record with its field-level changes
//! - POST /api/v1/audit-logs/diff - Diff two snapshots without storing anything

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::CenterContext,
    models::audit_log::{AuditLogDetail, AuditLogFilter, DiffRequest},
    services::audit_service,
};

/// List audit records, newest first.
///
/// # Endpoint
///
/// `GET /api/v1/audit-logs?entity_type=student_fee&entity_id=...&action=update&limit=20`
///
/// All filters are optional. `limit` defaults to 50 and is capped at 500.
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "logs": [
///     {
///       "id": "...",
///       "action": "update",
///       "entity_type": "student_fee",
///       "entity_id": "...",
///       "old_values": { "status": "unpaid", ... },
///       "new_values": { "status": "paid", ... },
///       "created_at": "2025-03-02T08:00:00Z"
///     }
///   ]
/// }
/// ```
pub async fn list_audit_logs(
    State(pool): State<DbPool>,
    Extension(center): Extension<CenterContext>,
    Query(filter): Query<AuditLogFilter>,
) -> Result<Json<Value>, AppError> {
    let logs = audit_service::list_audit_logs(&pool, center.center_id, &filter).await?;

    Ok(Json(json!({
        "success": true,
        "logs": logs,
    })))
}

/// Get one audit record and the fields it changed.
///
/// # Endpoint
///
/// `GET /api/v1/audit-logs/{id}`
///
/// # Response
///
/// - **Success (200 OK)**: `{ "success": true, "log": {...}, "changes": [...] }`
/// - **Error (404)**: Record not found in this center
pub async fn get_audit_log(
    State(pool): State<DbPool>,
    Extension(center): Extension<CenterContext>,
    Path(audit_log_id): Path<Uuid>,
) -> Result<Json<AuditLogDetail>, AppError> {
    let detail = audit_service::audit_log_changes(&pool, center.center_id, audit_log_id).await?;

    Ok(Json(detail))
}

/// Diff two arbitrary snapshots.
///
/// # Endpoint
///
/// `POST /api/v1/audit-logs/diff`
///
/// # Request Body
///
/// ```json
/// {
///   "old_values": { "a": 1, "b": 2, "id": "x" },
///   "new_values": { "a": 1, "b": 3, "id": "y" }
/// }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "changes": [ { "field": "b", "old_value": 2, "new_value": 3 } ]
/// }
/// ```
pub async fn diff_snapshots(Json(request): Json<DiffRequest>) -> Json<Value> {
    let changes = audit_service::diff(request.old_values.as_ref(), request.new_values.as_ref());

    Json(json!({
        "success": true,
        "changes": changes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn diff_endpoint_reports_changed_fields() {
        let request = DiffRequest {
            old_values: Some(json!({"a": 1, "b": 2, "id": "x"})),
            new_values: Some(json!({"a": 1, "b": 3, "id": "y"})),
        };

        let Json(body) = diff_snapshots(Json(request)).await;

        assert_eq!(body["success"], true);
        assert_eq!(
            body["changes"],
            json!([{"field": "b", "old_value": 2, "new_value": 3}])
        );
    }
}

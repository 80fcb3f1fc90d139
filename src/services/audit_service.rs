//! Audit service - immutable change records and field-level diffs.
//!
//! Billing operations call [`record`] inside their own database transaction,
//! so an audit row exists exactly when the change it describes was committed.

use std::collections::HashSet;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::audit_log::{AuditAction, AuditLogDetail, AuditLogFilter, AuditLogRecord, FieldChange},
};

/// Bookkeeping keys that change on every write and are never shown as changes.
pub const EXCLUDED_FIELDS: [&str; 4] = ["id", "created_at", "updated_at", "center_id"];

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// Compute the fields that differ between two snapshots.
///
/// Keys are taken from both snapshots, each reported at most once, in the order
/// they are first seen (old snapshot first). Excluded bookkeeping keys are skipped.
/// A key missing from one side is reported with `None` on that side, so a field
/// going from absent to `null` still counts as a change.
///
/// Snapshots that are missing or not JSON objects are treated as empty.
///
/// Values are compared as parsed `serde_json::Value`s, not as serialized
/// text: `1` and `1.0` differ, while two objects holding the same keys in a
/// different order are equal.
pub fn diff(old_values: Option<&Value>, new_values: Option<&Value>) -> Vec<FieldChange> {
    let empty = Map::new();
    let old = old_values.and_then(Value::as_object).unwrap_or(&empty);
    let new = new_values.and_then(Value::as_object).unwrap_or(&empty);

    let mut seen = HashSet::new();
    old.keys()
        .chain(new.keys())
        .filter(|key| !EXCLUDED_FIELDS.contains(&key.as_str()))
        .filter(|key| seen.insert(key.as_str()))
        .filter_map(|key| {
            let old_value = old.get(key);
            let new_value = new.get(key);
            (old_value != new_value).then(|| FieldChange {
                field: key.clone(),
                old_value: old_value.cloned(),
                new_value: new_value.cloned(),
            })
        })
        .collect()
}

/// Insert an audit record.
///
/// Takes any executor so callers can pass their open transaction (`&mut *tx`).
pub async fn record<'e, E>(
    executor: E,
    center_id: Uuid,
    action: AuditAction,
    entity_type: &str,
    entity_id: Option<Uuid>,
    old_values: Option<Value>,
    new_values: Option<Value>,
) -> Result<(), AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_logs (center_id, action, entity_type, entity_id, old_values, new_values)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(center_id)
    .bind(action.as_str())
    .bind(entity_type)
    .bind(entity_id)
    .bind(old_values)
    .bind(new_values)
    .execute(executor)
    .await?;

    Ok(())
}

/// Serialize an entity into an audit snapshot.
pub fn snapshot<T: serde::Serialize>(entity: &T) -> Result<Value, AppError> {
    serde_json::to_value(entity)
        .map_err(|e| AppError::InvalidRequest(format!("Failed to serialize audit snapshot: {e}")))
}

/// List a center's audit records, newest first.
///
/// `limit` defaults to 50 and is clamped to 1..=500.
pub async fn list_audit_logs(
    pool: &DbPool,
    center_id: Uuid,
    filter: &AuditLogFilter,
) -> Result<Vec<AuditLogRecord>, AppError> {
    let limit = filter
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let logs = sqlx::query_as::<_, AuditLogRecord>(
        r#"
        SELECT id, center_id, action, entity_type, entity_id, old_values, new_values, created_at
        FROM audit_logs
        WHERE center_id = $1
          AND ($2::text IS NULL OR entity_type = $2)
          AND ($3::uuid IS NULL OR entity_id = $3)
          AND ($4::text IS NULL OR action = $4)
        ORDER BY created_at DESC
        LIMIT $5
        "#,
    )
    .bind(center_id)
    .bind(filter.entity_type.as_deref())
    .bind(filter.entity_id)
    .bind(filter.action.map(|a| a.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(logs)
}

/// Fetch one audit record and the changes it describes.
pub async fn audit_log_changes(
    pool: &DbPool,
    center_id: Uuid,
    audit_log_id: Uuid,
) -> Result<AuditLogDetail, AppError> {
    let log = sqlx::query_as::<_, AuditLogRecord>(
        r#"
        SELECT id, center_id, action, entity_type, entity_id, old_values, new_values, created_at
        FROM audit_logs
        WHERE id = $1 AND center_id = $2
        "#,
    )
    .bind(audit_log_id)
    .bind(center_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::AuditLogNotFound)?;

    let changes = diff(log.old_values.as_ref(), log.new_values.as_ref());

    Ok(AuditLogDetail {
        success: true,
        log,
        changes,
    })
}

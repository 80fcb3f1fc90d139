//! Audit log models.
//!
//! Audit records are immutable: one row per create, update or delete of a
//! billing entity, carrying the before/after snapshots as opaque JSON objects.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What happened to the audited entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a row of the `audit_logs` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AuditLogRecord {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub center_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,

    /// Snapshot before the change; absent for creates
    pub old_values: Option<Value>,

    /// Snapshot after the change; absent for deletes
    pub new_values: Option<Value>,

    pub created_at: DateTime<Utc>,
}

/// One field that differs between two snapshots.
///
/// `None` means the key was absent from that snapshot and is left out of the
/// JSON, which keeps it distinct from an explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

/// Query parameters for listing audit records.
///
/// `GET /api/v1/audit-logs?entity_type=student_fee&action=update&limit=20`
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub limit: Option<i64>,
}

/// An audit record together with its computed field changes.
#[derive(Debug, Serialize)]
pub struct AuditLogDetail {
    pub success: bool,
    pub log: AuditLogRecord,
    pub changes: Vec<FieldChange>,
}

/// Request body for diffing two arbitrary snapshots.
#[derive(Debug, Deserialize)]
pub struct DiffRequest {
    #[serde(default)]
    pub old_values: Option<Value>,
    #[serde(default)]
    pub new_values: Option<Value>,
}

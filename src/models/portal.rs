//! Portal token models.
//!
//! Portal tokens give students, teachers and parents read-only access to their
//! own views without a full account. Two forms exist:
//!
//! - **JWT**: HS256-signed claims; the `jti` is stored so a token can be revoked
//! - **Legacy**: a random UUID handed out as-is; only its SHA-256 hash is stored

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a portal token was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalRole {
    Student,
    Teacher,
    Parent,
}

impl PortalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortalRole::Student => "student",
            PortalRole::Teacher => "teacher",
            PortalRole::Parent => "parent",
        }
    }
}

impl fmt::Display for PortalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortalRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(PortalRole::Student),
            "teacher" => Ok(PortalRole::Teacher),
            "parent" => Ok(PortalRole::Parent),
            other => Err(format!("unknown portal role: {other}")),
        }
    }
}

/// Claims carried by a JWT portal token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalClaims {
    /// Student, teacher or parent-of-student the token is scoped to
    pub sub: Uuid,
    pub center_id: Uuid,
    pub role: PortalRole,
    /// Id of the `portal_tokens` row, used for revocation
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// The parts of a `portal_tokens` row a verified request needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PortalTokenRecord {
    pub id: Uuid,
    pub center_id: Uuid,
    pub role: String,
    pub subject_id: Uuid,
}

/// Verified identity of a portal request, injected by the portal middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalContext {
    pub token_id: Uuid,
    pub center_id: Uuid,
    pub role: PortalRole,
    pub subject_id: Uuid,
}

/// Request body for issuing a portal token.
///
/// ```json
/// { "role": "parent", "subject_id": "550e8400-...", "ttl_hours": 48 }
/// ```
///
/// For `parent` tokens the subject is the child's student id.
#[derive(Debug, Deserialize)]
pub struct IssuePortalTokenRequest {
    pub role: PortalRole,
    pub subject_id: Uuid,
    pub ttl_hours: Option<i64>,

    /// Issue an opaque UUID token instead of a JWT
    #[serde(default)]
    pub legacy: bool,
}

/// Response returned once when a token is issued. The token is not retrievable later.
#[derive(Debug, Serialize)]
pub struct IssuedPortalToken {
    pub success: bool,
    pub id: Uuid,
    pub token: String,
    pub token_kind: String,
    pub role: PortalRole,
    pub subject_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

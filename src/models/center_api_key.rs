//! Center API key model for authentication.
//!
//! Each center (tenant) authenticates with one or more API keys. Keys are stored
//! as SHA-256 hashes; the plaintext is never persisted.

use uuid::Uuid;

/// An active `center_api_keys` row joined with its center's name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CenterApiKey {
    pub id: Uuid,

    /// Tenant this key grants access to. Every query a request makes is filtered by it.
    pub center_id: Uuid,

    pub center_name: String,
}

//! Shared application state injected into handlers.
//!
//! Handlers that only touch the database keep extracting `State<DbPool>`;
//! the `FromRef` impls below hand them the pool out of [`AppState`].

use std::sync::Arc;

use axum::extract::FromRef;
use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::{config::BillingSettings, db::DbPool};

/// Keys and lifetime used to sign and verify portal tokens.
#[derive(Clone)]
pub struct PortalKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub default_ttl_hours: i64,
}

impl PortalKeys {
    pub fn from_secret(secret: &str, default_ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            default_ttl_hours,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub settings: Arc<BillingSettings>,
    pub portal_keys: Arc<PortalKeys>,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<BillingSettings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}

//! HTTP middleware components.
//!
//! Both middlewares authenticate a bearer token and inject the caller's
//! identity into request extensions, or short-circuit with HTTP 401.

/// Center API key authentication for `/api/v1`
pub mod auth;

/// Portal token authentication for `/portal/v1`
pub mod portal;

//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, CSV body, URL params)
//! 2. Calls the matching service with the caller's center or portal identity
//! 3. Returns a JSON response with `"success": true`, or an `AppError`

use serde::Serialize;

/// Audit log endpoints
pub mod audit_logs;

/// Fee generation and listing endpoints
pub mod fees;

/// Health check endpoint
pub mod health;

/// Student CSV import endpoints
pub mod imports;

/// Payment allocation endpoint
pub mod payments;

/// Portal token management and portal views
pub mod portal;

/// Success envelope for response types that don't carry their own `success` flag.
///
/// ```json
/// { "success": true, "student_id": "...", "fees_created": 3 }
/// ```
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,

    #[serde(flatten)]
    pub data: T,
}

impl<T> Success<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Counts {
        fees_created: usize,
    }

    #[test]
    fn success_envelope_flattens_payload() {
        let value = serde_json::to_value(Success::new(Counts { fees_created: 3 })).unwrap();
        assert_eq!(value, json!({"success": true, "fees_created": 3}));
    }
}

//! Business logic services.
//!
//! Services contain the billing logic separated from HTTP handlers. Pure
//! planning functions (fee plans, payment allocation, diffs, CSV parsing) sit
//! next to the async functions that apply them inside database transactions.

pub mod audit_service;
pub mod fee_service;
pub mod import_service;
pub mod payment_service;
pub mod portal_service;

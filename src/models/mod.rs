//! Data models representing database entities and API payloads.

/// Audit log records and field changes
pub mod audit_log;
/// Center API key authentication model
pub mod center_api_key;
/// Student fees, enrollments and generation reports
pub mod fee;
/// Bulk student import rows and reports
pub mod import;
/// Payment allocation requests and results
pub mod payment;
/// Portal tokens and claims
pub mod portal;
/// Student records
pub mod student;

//! Payment allocation request/response types.
//!
//! Payments themselves are recorded elsewhere (the payment processor or the
//! center's cashbook). This service only receives a payment's id and amount and
//! spreads it across the student's outstanding fees.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to allocate a payment to a student's outstanding fees.
///
/// # JSON Example
///
/// ```json
/// {
///   "payment_id": "550e8400-e29b-41d4-a716-446655440000",
///   "amount": "1250.00",
///   "paid_on": "2025-03-02"
/// }
/// ```
///
/// `payment_id` doubles as the idempotency key: allocating the same payment
/// twice returns the first allocation unchanged.
#[derive(Debug, Deserialize)]
pub struct AllocatePaymentRequest {
    pub payment_id: Uuid,

    /// Amount received, must be positive
    pub amount: Decimal,

    /// Date stamped on the student when a registration fee is settled (defaults to today)
    pub paid_on: Option<NaiveDate>,
}

/// Part of a payment applied to one fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FeeAllocation {
    pub fee_id: Uuid,
    pub fee_month: NaiveDate,
    pub amount: Decimal,
}

/// Response returned after allocating a payment.
///
/// # JSON Example
///
/// ```json
/// {
///   "success": true,
///   "payment_id": "550e8400-...",
///   "student_id": "660e8400-...",
///   "allocations": [
///     { "fee_id": "770e8400-...", "fee_month": "2025-01-01", "amount": "800.00" },
///     { "fee_id": "880e8400-...", "fee_month": "2025-02-01", "amount": "450.00" }
///   ],
///   "total_allocated": "1250.00",
///   "remaining_credit": "0.00",
///   "currency": "ZAR",
///   "already_applied": false
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AllocationResult {
    pub success: bool,
    pub payment_id: Uuid,
    pub student_id: Uuid,
    pub allocations: Vec<FeeAllocation>,
    pub total_allocated: Decimal,

    /// Part of the payment left over once every outstanding fee was covered
    pub remaining_credit: Decimal,

    pub currency: String,

    /// True when this payment had been allocated by an earlier request
    pub already_applied: bool,
}

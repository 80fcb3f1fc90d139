//! Payment allocation HTTP handler.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::{
    config::BillingSettings,
    db::DbPool,
    error::AppError,
    middleware::auth::CenterContext,
    models::payment::{AllocatePaymentRequest, AllocationResult},
    services::payment_service,
};

/// Allocate a received payment to a student's outstanding fees, oldest month first.
///
/// # Endpoint
///
/// `POST /api/v1/students/{id}/payments`
///
/// # Request Body
///
/// ```json
/// {
///   "payment_id": "550e8400-e29b-41d4-a716-446655440000",
///   "amount": "1250.00",
///   "paid_on": "2025-03-02"
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: The allocations made, plus any unallocated credit
/// - **Error (400)**: Amount not positive, more than two decimals, or payment
///   already applied to another student
/// - **Error (404)**: Student not found in this center
///
/// Repeating a request with the same `payment_id` returns the original
/// allocations with `already_applied: true` and changes nothing.
pub async fn allocate_payment(
    State(pool): State<DbPool>,
    State(settings): State<Arc<BillingSettings>>,
    Extension(center): Extension<CenterContext>,
    Path(student_id): Path<Uuid>,
    Json(request): Json<AllocatePaymentRequest>,
) -> Result<Json<AllocationResult>, AppError> {
    let result =
        payment_service::allocate_payment(&pool, &settings, center.center_id, student_id, request)
            .await?;

    Ok(Json(result))
}

//! Fee HTTP handlers.
//!
//! This module implements the fee endpoints:
//! - POST /api/v1/students/{id}/fees/generate - Generate tuition fees for one student
//! - POST /api/v1/fees/generate - Generate tuition fees for every active student
//! - GET /api/v1/students/{id}/fees - List a student's fees

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    config::BillingSettings,
    db::DbPool,
    error::AppError,
    handlers::Success,
    middleware::auth::CenterContext,
    models::fee::{CenterGenerationReport, GenerateFeesRequest, GenerationOutcome},
    services::fee_service,
};

/// Generate monthly tuition fees for one student.
///
/// # Endpoint
///
/// `POST /api/v1/students/{id}/fees/generate`
///
/// # Request Body
///
/// ```json
/// {
///   "start_month": "2025-01-01",
///   "end_month": "2025-03-01"
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: Fees created and months skipped because they were already billed
/// - **Error (400)**: Dates not first-of-month, start after end, or range too long
/// - **Error (404)**: Student not found in this center
///
/// ```json
/// {
///   "success": true,
///   "student_id": "660e8400-...",
///   "monthly_total": "1250.00",
///   "fees_created": 2,
///   "skipped_months": ["2025-01-01"],
///   "fees": [ ... ]
/// }
/// ```
///
/// A student with no active enrollments gets `fees_created: 0`, not an error.
pub async fn generate_student_fees(
    State(pool): State<DbPool>,
    State(settings): State<Arc<BillingSettings>>,
    Extension(center): Extension<CenterContext>,
    Path(student_id): Path<Uuid>,
    Json(request): Json<GenerateFeesRequest>,
) -> Result<Json<Success<GenerationOutcome>>, AppError> {
    let outcome = fee_service::generate_student_fees(
        &pool,
        &settings,
        center.center_id,
        student_id,
        request.start_month,
        request.end_month,
    )
    .await?;

    Ok(Json(Success::new(outcome)))
}

/// Generate monthly tuition fees for every active student of the center.
///
/// # Endpoint
///
/// `POST /api/v1/fees/generate`
///
/// # Response
///
/// Per-student failures do not fail the request; they are listed in `errors`.
///
/// ```json
/// {
///   "success": true,
///   "students_processed": 41,
///   "fees_created": 120,
///   "errors": [ { "student_id": "...", "error": "An internal error occurred" } ]
/// }
/// ```
pub async fn generate_center_fees(
    State(pool): State<DbPool>,
    State(settings): State<Arc<BillingSettings>>,
    Extension(center): Extension<CenterContext>,
    Json(request): Json<GenerateFeesRequest>,
) -> Result<Json<Success<CenterGenerationReport>>, AppError> {
    tracing::info!(
        center = %center.center_name,
        start_month = %request.start_month,
        end_month = %request.end_month,
        "center-wide fee generation requested"
    );

    let report = fee_service::generate_center_fees(
        &pool,
        &settings,
        center.center_id,
        request.start_month,
        request.end_month,
    )
    .await?;

    Ok(Json(Success::new(report)))
}

/// List a student's fees, oldest month first.
///
/// # Endpoint
///
/// `GET /api/v1/students/{id}/fees`
///
/// # Response
///
/// - **Success (200 OK)**: `{ "success": true, "fees": [ ... ] }`
/// - **Error (404)**: Student not found in this center
pub async fn list_student_fees(
    State(pool): State<DbPool>,
    Extension(center): Extension<CenterContext>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let fees = fee_service::list_student_fees(&pool, center.center_id, student_id).await?;

    Ok(Json(json!({
        "success": true,
        "fees": fees,
    })))
}

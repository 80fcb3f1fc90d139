//! Student import HTTP handlers.
//!
//! - POST /api/v1/imports/students?dry_run=true - Import students from a CSV body
//! - GET /api/v1/imports/students/template - Download a sample CSV

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};

use crate::{
    config::BillingSettings,
    db::DbPool,
    error::AppError,
    middleware::auth::CenterContext,
    models::import::{ImportQuery, ImportReport},
    services::import_service,
};

/// Import students from an uploaded CSV.
///
/// # Endpoint
///
/// `POST /api/v1/imports/students?dry_run=true`
///
/// The request body is the CSV text itself (`Content-Type: text/csv`). Headers
/// are matched loosely ("Surname", "DOB", "Cell" are understood).
///
/// # Response
///
/// - **Success (200 OK)**: Valid rows imported (or only validated on a dry run),
///   invalid rows listed with their line number
/// - **Error (422)**: Empty file, or no first/last name column
///
/// ```json
/// {
///   "success": true,
///   "dry_run": false,
///   "imported": 2,
///   "valid_rows": 2,
///   "errors": [ { "row": 3, "message": "First name is required" } ],
///   "unmapped_headers": ["Favourite Colour"]
/// }
/// ```
pub async fn import_students(
    State(pool): State<DbPool>,
    State(settings): State<Arc<BillingSettings>>,
    Extension(center): Extension<CenterContext>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> Result<Json<ImportReport>, AppError> {
    tracing::info!(
        center = %center.center_name,
        bytes = body.len(),
        dry_run = query.dry_run,
        "student import received"
    );

    let report = import_service::import_students(
        &pool,
        &settings,
        center.center_id,
        &body,
        query.dry_run,
    )
    .await?;

    Ok(Json(report))
}

/// Download the import template.
///
/// # Endpoint
///
/// `GET /api/v1/imports/students/template`
///
/// Returns `text/csv` with every supported column and one example row.
pub async fn import_template() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"student_import_template.csv\"",
            ),
        ],
        import_service::template_csv(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn template_downloads_as_csv() {
        let response = import_template().await.into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        assert!(
            response.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .starts_with("attachment")
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.starts_with("first_name,last_name,"));
    }
}

//! Student records, as far as billing and import need them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a row of the `students` table.
///
/// Serialized in full as the audit snapshot whenever billing changes a student.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub center_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub grade: Option<String>,
    pub school_name: Option<String>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_email: Option<String>,
    pub parent_phone: Option<String>,

    /// `active` or `inactive`; only active students are billed center-wide
    pub status: String,

    pub registration_fee_paid: bool,
    pub registration_fee_paid_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column list matching [`Student`], for `SELECT` and `RETURNING` clauses.
pub const STUDENT_COLUMNS: &str = "id, center_id, first_name, last_name, email, phone, \
     date_of_birth, gender, grade, school_name, address, parent_name, parent_email, \
     parent_phone, status, registration_fee_paid, registration_fee_paid_date, \
     created_at, updated_at";

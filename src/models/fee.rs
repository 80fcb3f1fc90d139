//! Student fee models and fee generation request/response types.
//!
//! This module defines:
//! - `StudentFee`: one billed month of one fee type for one student
//! - `FeeStatus`: unpaid / partial / paid, derived from amounts
//! - `NewStudentFee`: a fee planned by the generator, not yet inserted
//! - Request and report types for per-student and center-wide generation

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fee type written by the monthly generator.
pub const TUITION_FEE: &str = "tuition";

/// Fee type whose full payment stamps the student's registration flag.
pub const REGISTRATION_FEE: &str = "registration";

/// Represents a row of the `student_fees` table.
///
/// # Amounts
///
/// `amount_due` and `amount_paid` are fixed-point decimals (NUMERIC(12, 2)).
/// `amount_paid <= amount_due` is expected; the allocator never pays past the
/// balance, but the row itself does not enforce it.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct StudentFee {
    pub id: Uuid,
    pub center_id: Uuid,
    pub student_id: Uuid,

    /// `tuition`, `registration`, or any other center-defined type
    pub fee_type: String,

    /// First day of the billed month
    pub fee_month: NaiveDate,

    pub amount_due: Decimal,
    pub amount_paid: Decimal,

    /// One of `unpaid`, `partial`, `paid`
    pub status: String,

    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentFee {
    /// What is still owed on this fee, never negative.
    pub fn balance(&self) -> Decimal {
        (self.amount_due - self.amount_paid).max(Decimal::ZERO)
    }
}

/// Payment status of a fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    Unpaid,
    Partial,
    Paid,
}

impl FeeStatus {
    /// Status implied by what has been paid against what is due.
    ///
    /// `paid` once the amount due is covered, `partial` for anything in between,
    /// `unpaid` while nothing has been paid.
    pub fn for_amounts(amount_due: Decimal, amount_paid: Decimal) -> Self {
        if amount_paid >= amount_due {
            FeeStatus::Paid
        } else if amount_paid > Decimal::ZERO {
            FeeStatus::Partial
        } else {
            FeeStatus::Unpaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Unpaid => "unpaid",
            FeeStatus::Partial => "partial",
            FeeStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(FeeStatus::Unpaid),
            "partial" => Ok(FeeStatus::Partial),
            "paid" => Ok(FeeStatus::Paid),
            other => Err(format!("unknown fee status: {other}")),
        }
    }
}

/// An active subject enrollment, as far as billing cares.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct StudentSubjectEnrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub monthly_fee: Decimal,
    pub is_active: bool,
}

/// A fee planned by the generator, ready for bulk insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudentFee {
    pub student_id: Uuid,
    pub fee_type: &'static str,
    pub fee_month: NaiveDate,
    pub amount_due: Decimal,
    pub due_date: NaiveDate,
}


/// Request body for generating tuition fees.
///
/// # JSON Example
///
/// ```json
/// {
///   "start_month": "2025-01-01",
///   "end_month": "2025-06-01"
/// }
/// ```
///
/// Both dates must be the first of a month; the range is inclusive.
#[derive(Debug, Deserialize)]
pub struct GenerateFeesRequest {
    pub start_month: NaiveDate,
    pub end_month: NaiveDate,
}

/// Result of generating fees for one student.
#[derive(Debug, Serialize)]
pub struct GenerationOutcome {
    pub student_id: Uuid,

    /// Sum of the monthly fees of the student's active enrollments
    pub monthly_total: Decimal,

    pub fees_created: usize,

    /// Months in range that were already billed and left alone
    pub skipped_months: Vec<NaiveDate>,

    pub fees: Vec<StudentFeeResponse>,
}

/// One student that failed during a center-wide run.
#[derive(Debug, Serialize)]
pub struct StudentGenerationError {
    pub student_id: Uuid,
    pub error: String,
}

/// Result of generating fees for every active student of a center.
#[derive(Debug, Default, Serialize)]
pub struct CenterGenerationReport {
    pub students_processed: usize,
    pub fees_created: usize,
    pub errors: Vec<StudentGenerationError>,
}

/// Fee as returned to API clients (no tenant id).
#[derive(Debug, Serialize)]
pub struct StudentFeeResponse {
    pub id: Uuid,
    pub student_id: Uuid,
    pub fee_type: String,
    pub fee_month: NaiveDate,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub status: String,
    pub due_date: NaiveDate,
}

impl From<StudentFee> for StudentFeeResponse {
    fn from(fee: StudentFee) -> Self {
        Self {
            balance: fee.balance(),
            id: fee.id,
            student_id: fee.student_id,
            fee_type: fee.fee_type,
            fee_month: fee.fee_month,
            amount_due: fee.amount_due,
            amount_paid: fee.amount_paid,
            status: fee.status,
            due_date: fee.due_date,
        }
    }
}

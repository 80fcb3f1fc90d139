//! Fee service - monthly tuition generation.
//!
//! A student's monthly tuition is the sum of the `monthly_fee` of their active
//! subject enrollments. Generation creates one `tuition` fee per month of the
//! requested range that is not billed yet.
//!
//! # Idempotence
//!
//! Existing fee months are read before inserting, and the insert itself uses
//! `ON CONFLICT (student_id, fee_month, fee_type) DO NOTHING`. Running the same
//! range twice, even concurrently, never duplicates a fee.
//!
//! # Atomicity
//!
//! The student lock, the reads, the bulk insert and the audit records for one
//! student share a single database transaction.

use std::collections::HashSet;

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    config::BillingSettings,
    db::DbPool,
    error::AppError,
    models::{
        audit_log::AuditAction,
        fee::{
            CenterGenerationReport, FeeStatus, GenerationOutcome, NewStudentFee, StudentFee,
            StudentFeeResponse, StudentGenerationError, StudentSubjectEnrollment, TUITION_FEE,
        },
    },
    services::audit_service,
};

/// Longest range one request may generate, in months.
pub const MAX_MONTHS_PER_RUN: usize = 36;

/// Fees planned for one student before touching the database.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FeePlan {
    pub monthly_total: Decimal,
    pub fees: Vec<NewStudentFee>,
    pub skipped_months: Vec<NaiveDate>,
}

/// Every first-of-month date from `start` to `end`, inclusive.
///
/// # Errors
///
/// - `InvalidRequest`: a bound is not the first of a month, `start` is after
///   `end`, or the range spans more than [`MAX_MONTHS_PER_RUN`] months
pub fn months_in_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, AppError> {
    if start.day() != 1 || end.day() != 1 {
        return Err(AppError::InvalidRequest(
            "start_month and end_month must be the first day of a month".to_string(),
        ));
    }
    if start > end {
        return Err(AppError::InvalidRequest(
            "start_month must not be after end_month".to_string(),
        ));
    }

    let mut months = Vec::new();
    let mut month = start;
    while month <= end {
        if months.len() == MAX_MONTHS_PER_RUN {
            return Err(AppError::InvalidRequest(format!(
                "Cannot generate more than {MAX_MONTHS_PER_RUN} months at once"
            )));
        }
        months.push(month);
        month = month
            .checked_add_months(Months::new(1))
            .ok_or_else(|| AppError::InvalidRequest("end_month is out of range".to_string()))?;
    }

    Ok(months)
}

/// Due date of a fee for `month`: the configured day of that month.
pub fn due_date_for(month: NaiveDate, due_day: u32) -> NaiveDate {
    // Days 1..=28 exist in every month
    month.with_day(due_day.clamp(1, 28)).unwrap_or(month)
}

/// Plan the tuition fees for one student.
///
/// Sums the monthly fee of the active enrollments and plans one unpaid fee per
/// month not in `existing_months`. A student with no active enrollments, or whose
/// enrollments are all free, gets nothing: zero means nothing to bill.
pub fn plan_tuition_fees(
    student_id: Uuid,
    enrollments: &[StudentSubjectEnrollment],
    months: &[NaiveDate],
    existing_months: &HashSet<NaiveDate>,
    due_day: u32,
) -> FeePlan {
    let monthly_total: Decimal = enrollments
        .iter()
        .filter(|e| e.is_active)
        .map(|e| e.monthly_fee)
        .sum();

    if monthly_total <= Decimal::ZERO {
        return FeePlan {
            monthly_total,
            ..FeePlan::default()
        };
    }

    let (skipped_months, to_bill): (Vec<NaiveDate>, Vec<NaiveDate>) = months
        .iter()
        .copied()
        .partition(|month| existing_months.contains(month));

    let fees = to_bill
        .into_iter()
        .map(|fee_month| NewStudentFee {
            student_id,
            fee_type: TUITION_FEE,
            fee_month,
            amount_due: monthly_total,
            due_date: due_date_for(fee_month, due_day),
        })
        .collect();

    FeePlan {
        monthly_total,
        fees,
        skipped_months,
    }
}

/// Generate monthly tuition fees for one student.
///
/// # Process
///
/// 1. Validate the month range
/// 2. Start database transaction and lock the student row
/// 3. Read active enrollments and already billed months
/// 4. Bulk insert the planned fees, one audit record per fee
/// 5. Commit (or rollback on error)
///
/// # Errors
///
/// - `InvalidRequest`: bad month range
/// - `StudentNotFound`: student doesn't exist in this center
/// - `Database`: Database error occurred
pub async fn generate_student_fees(
    pool: &DbPool,
    settings: &BillingSettings,
    center_id: Uuid,
    student_id: Uuid,
    start_month: NaiveDate,
    end_month: NaiveDate,
) -> Result<GenerationOutcome, AppError> {
    let months = months_in_range(start_month, end_month)?;

    let mut tx = pool.begin().await?;

    // Serializes concurrent generation for the same student
    sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM students WHERE id = $1 AND center_id = $2 FOR UPDATE",
    )
    .bind(student_id)
    .bind(center_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::StudentNotFound)?;

    let enrollments = sqlx::query_as::<_, StudentSubjectEnrollment>(
        r#"
        SELECT id, student_id, subject_id, monthly_fee, is_active
        FROM student_subject_enrollments
        WHERE student_id = $1 AND center_id = $2 AND is_active = TRUE
        "#,
    )
    .bind(student_id)
    .bind(center_id)
    .fetch_all(&mut *tx)
    .await?;

    let existing_months: HashSet<NaiveDate> = sqlx::query_scalar::<_, NaiveDate>(
        r#"
        SELECT fee_month FROM student_fees
        WHERE student_id = $1 AND fee_type = $2 AND fee_month = ANY($3)
        "#,
    )
    .bind(student_id)
    .bind(TUITION_FEE)
    .bind(&months)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .collect();

    let plan = plan_tuition_fees(
        student_id,
        &enrollments,
        &months,
        &existing_months,
        settings.fee_due_day,
    );

    if plan.fees.is_empty() {
        tx.commit().await?;
        tracing::debug!(%student_id, monthly_total = %plan.monthly_total, "nothing to bill");
        return Ok(GenerationOutcome {
            student_id,
            monthly_total: plan.monthly_total,
            fees_created: 0,
            skipped_months: plan.skipped_months,
            fees: Vec::new(),
        });
    }

    let fee_months: Vec<NaiveDate> = plan.fees.iter().map(|f| f.fee_month).collect();
    let amounts: Vec<Decimal> = plan.fees.iter().map(|f| f.amount_due).collect();
    let due_dates: Vec<NaiveDate> = plan.fees.iter().map(|f| f.due_date).collect();

    let created = sqlx::query_as::<_, StudentFee>(
        r#"
        INSERT INTO student_fees (
            center_id,
            student_id,
            fee_type,
            fee_month,
            amount_due,
            amount_paid,
            status,
            due_date
        )
        SELECT $1, $2, $3, t.fee_month, t.amount_due, 0, $4, t.due_date
        FROM UNNEST($5::date[], $6::numeric[], $7::date[]) AS t(fee_month, amount_due, due_date)
        ON CONFLICT (student_id, fee_month, fee_type) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(center_id)
    .bind(student_id)
    .bind(TUITION_FEE)
    .bind(FeeStatus::Unpaid.as_str())
    .bind(&fee_months)
    .bind(&amounts)
    .bind(&due_dates)
    .fetch_all(&mut *tx)
    .await?;

    for fee in &created {
        audit_service::record(
            &mut *tx,
            center_id,
            AuditAction::Create,
            "student_fee",
            Some(fee.id),
            None,
            Some(audit_service::snapshot(fee)?),
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        %student_id,
        fees_created = created.len(),
        monthly_total = %plan.monthly_total,
        "generated tuition fees"
    );

    let mut fees = created;
    fees.sort_by_key(|f| f.fee_month);

    Ok(GenerationOutcome {
        student_id,
        monthly_total: plan.monthly_total,
        fees_created: fees.len(),
        skipped_months: plan.skipped_months,
        fees: fees.into_iter().map(Into::into).collect(),
    })
}

/// Generate monthly tuition fees for every active student of a center.
///
/// Each student runs in its own transaction. A failing student is logged and
/// recorded in the report; the batch carries on with the next one.
pub async fn generate_center_fees(
    pool: &DbPool,
    settings: &BillingSettings,
    center_id: Uuid,
    start_month: NaiveDate,
    end_month: NaiveDate,
) -> Result<CenterGenerationReport, AppError> {
    // Reject a bad range once instead of once per student
    months_in_range(start_month, end_month)?;

    let student_ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM students
        WHERE center_id = $1 AND status = 'active'
        ORDER BY last_name, first_name, id
        "#,
    )
    .bind(center_id)
    .fetch_all(pool)
    .await?;

    let report = run_student_batch(center_id, student_ids, |student_id| {
        generate_student_fees(pool, settings, center_id, student_id, start_month, end_month)
    })
    .await;

    tracing::info!(
        %center_id,
        students = report.students_processed,
        fees_created = report.fees_created,
        failures = report.errors.len(),
        "center fee generation finished"
    );

    Ok(report)
}

/// Run `generate` for each student in turn and fold the results into a report.
///
/// An error is logged and recorded against its student; the remaining students
/// are still processed.
pub async fn run_student_batch<F, Fut>(
    center_id: Uuid,
    student_ids: Vec<Uuid>,
    mut generate: F,
) -> CenterGenerationReport
where
    F: FnMut(Uuid) -> Fut,
    Fut: Future<Output = Result<GenerationOutcome, AppError>>,
{
    let mut report = CenterGenerationReport::default();

    for student_id in student_ids {
        report.students_processed += 1;
        match generate(student_id).await {
            Ok(outcome) => report.fees_created += outcome.fees_created,
            Err(e) => {
                tracing::warn!(%center_id, %student_id, error = %e, "fee generation failed for student");
                report.errors.push(StudentGenerationError {
                    student_id,
                    error: e.client_message(),
                });
            }
        }
    }

    report
}

/// List a student's fees, oldest month first.
pub async fn list_student_fees(
    pool: &DbPool,
    center_id: Uuid,
    student_id: Uuid,
) -> Result<Vec<StudentFeeResponse>, AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM students WHERE id = $1 AND center_id = $2)",
    )
    .bind(student_id)
    .bind(center_id)
    .fetch_one(pool)
    .await?;

    if !exists {
        return Err(AppError::StudentNotFound);
    }

    let fees = sqlx::query_as::<_, StudentFee>(
        r#"
        SELECT * FROM student_fees
        WHERE student_id = $1 AND center_id = $2
        ORDER BY fee_month ASC, fee_type ASC
        "#,
    )
    .bind(student_id)
    .bind(center_id)
    .fetch_all(pool)
    .await?;

    Ok(fees.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn enrollment(student_id: Uuid, monthly_fee: Decimal, is_active: bool) -> StudentSubjectEnrollment {
        StudentSubjectEnrollment {
            id: Uuid::new_v4(),
            student_id,
            subject_id: Uuid::new_v4(),
            monthly_fee,
            is_active,
        }
    }

    #[test]
    fn months_in_range_is_inclusive_and_crosses_years() {
        let months = months_in_range(date(2024, 11, 1), date(2025, 2, 1)).unwrap();
        assert_eq!(
            months,
            vec![
                date(2024, 11, 1),
                date(2024, 12, 1),
                date(2025, 1, 1),
                date(2025, 2, 1)
            ]
        );
    }

    #[test]
    fn single_month_range() {
        let months = months_in_range(date(2025, 3, 1), date(2025, 3, 1)).unwrap();
        assert_eq!(months, vec![date(2025, 3, 1)]);
    }

    #[test]
    fn rejects_mid_month_and_reversed_ranges() {
        assert!(matches!(
            months_in_range(date(2025, 1, 15), date(2025, 3, 1)),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            months_in_range(date(2025, 3, 1), date(2025, 1, 1)),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn rejects_oversized_range() {
        assert!(months_in_range(date(2020, 1, 1), date(2030, 1, 1)).is_err());
        assert!(months_in_range(date(2025, 1, 1), date(2027, 12, 1)).is_ok());
    }

    #[test]
    fn plans_one_unpaid_fee_per_month_at_summed_amount() {
        let student_id = Uuid::new_v4();
        let enrollments = vec![
            enrollment(student_id, Decimal::new(35000, 2), true),
            enrollment(student_id, Decimal::new(15050, 2), true),
        ];
        let months = months_in_range(date(2025, 1, 1), date(2025, 3, 1)).unwrap();

        let plan = plan_tuition_fees(student_id, &enrollments, &months, &HashSet::new(), 7);

        assert_eq!(plan.monthly_total, Decimal::new(50050, 2));
        assert_eq!(plan.fees.len(), 3);
        for (fee, month) in plan.fees.iter().zip(&months) {
            assert_eq!(fee.fee_month, *month);
            assert_eq!(fee.amount_due, Decimal::new(50050, 2));
            assert_eq!(fee.fee_type, TUITION_FEE);
            assert_eq!(fee.due_date, date(month.year(), month.month(), 7));
        }
    }

    #[test]
    fn already_billed_months_are_skipped() {
        let student_id = Uuid::new_v4();
        let enrollments = vec![enrollment(student_id, Decimal::new(400, 0), true)];
        let months = months_in_range(date(2025, 1, 1), date(2025, 4, 1)).unwrap();
        let existing: HashSet<NaiveDate> = [date(2025, 1, 1), date(2025, 3, 1)].into();

        let plan = plan_tuition_fees(student_id, &enrollments, &months, &existing, 7);

        let billed: Vec<NaiveDate> = plan.fees.iter().map(|f| f.fee_month).collect();
        assert_eq!(billed, vec![date(2025, 2, 1), date(2025, 4, 1)]);
        assert_eq!(plan.skipped_months, vec![date(2025, 1, 1), date(2025, 3, 1)]);
    }

    #[test]
    fn second_run_over_same_range_plans_nothing() {
        let student_id = Uuid::new_v4();
        let enrollments = vec![enrollment(student_id, Decimal::new(400, 0), true)];
        let months = months_in_range(date(2025, 1, 1), date(2025, 6, 1)).unwrap();

        let first = plan_tuition_fees(student_id, &enrollments, &months, &HashSet::new(), 7);
        let billed: HashSet<NaiveDate> = first.fees.iter().map(|f| f.fee_month).collect();
        let second = plan_tuition_fees(student_id, &enrollments, &months, &billed, 7);

        assert_eq!(first.fees.len(), 6);
        assert!(second.fees.is_empty());
        assert_eq!(second.skipped_months.len(), 6);
    }

    #[test]
    fn no_active_enrollments_means_nothing_to_bill() {
        let student_id = Uuid::new_v4();
        let months = months_in_range(date(2025, 1, 1), date(2025, 2, 1)).unwrap();

        let none = plan_tuition_fees(student_id, &[], &months, &HashSet::new(), 7);
        assert!(none.fees.is_empty());
        assert_eq!(none.monthly_total, Decimal::ZERO);

        let inactive = vec![enrollment(student_id, Decimal::new(300, 0), false)];
        let plan = plan_tuition_fees(student_id, &inactive, &months, &HashSet::new(), 7);
        assert!(plan.fees.is_empty());
    }

    #[test]
    fn free_enrollments_bill_nothing() {
        let student_id = Uuid::new_v4();
        let enrollments = vec![enrollment(student_id, Decimal::ZERO, true)];
        let months = months_in_range(date(2025, 1, 1), date(2025, 2, 1)).unwrap();

        let plan = plan_tuition_fees(student_id, &enrollments, &months, &HashSet::new(), 7);
        assert!(plan.fees.is_empty());
    }

    #[test]
    fn due_date_uses_configured_day() {
        assert_eq!(due_date_for(date(2025, 2, 1), 7), date(2025, 2, 7));
        assert_eq!(due_date_for(date(2025, 2, 1), 28), date(2025, 2, 28));
        assert_eq!(due_date_for(date(2025, 2, 1), 31), date(2025, 2, 28));
    }

    fn outcome(student_id: Uuid, fees_created: usize) -> GenerationOutcome {
        GenerationOutcome {
            student_id,
            monthly_total: Decimal::new(400, 0),
            fees_created,
            skipped_months: Vec::new(),
            fees: Vec::new(),
        }
    }

    #[tokio::test]
    async fn failing_student_is_recorded_and_batch_continues() {
        let first = Uuid::new_v4();
        let failing = Uuid::new_v4();
        let last = Uuid::new_v4();
        let mut attempted = Vec::new();

        let report = run_student_batch(Uuid::new_v4(), vec![first, failing, last], |id| {
            attempted.push(id);
            async move {
                if id == failing {
                    Err(AppError::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(outcome(id, 3))
                }
            }
        })
        .await;

        assert_eq!(attempted, vec![first, failing, last]);
        assert_eq!(report.students_processed, 3);
        assert_eq!(report.fees_created, 6);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].student_id, failing);
        assert_eq!(report.errors[0].error, "An internal error occurred");
    }
}

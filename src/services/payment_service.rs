//! Payment service - FIFO allocation of payments to outstanding fees.
//!
//! A payment is applied to the student's unpaid and partially paid fees,
//! oldest `fee_month` first, until the money runs out. Whatever is left once
//! every fee is covered comes back as remaining credit.
//!
//! # Atomicity Guarantees
//!
//! The student row and every outstanding fee are locked (`FOR UPDATE`) and all
//! updates, allocation rows and audit records are written in one PostgreSQL
//! transaction. Two payments for the same student are applied one after the
//! other, and a failure half way leaves nothing behind.
//!
//! # Idempotency
//!
//! `applied_payments` has one row per `payment_id`. Re-submitting a payment
//! returns the original allocation instead of applying it twice.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    config::BillingSettings,
    db::DbPool,
    error::AppError,
    models::{
        audit_log::AuditAction,
        fee::{FeeStatus, REGISTRATION_FEE, StudentFee},
        payment::{AllocatePaymentRequest, AllocationResult, FeeAllocation},
        student::{STUDENT_COLUMNS, Student},
    },
    services::audit_service,
};

/// New amounts for one fee touched by a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeUpdate {
    pub fee_id: Uuid,
    pub fee_type: String,
    pub fee_month: NaiveDate,

    /// Zero for a status-only correction of a fee with nothing left to pay
    pub allocated: Decimal,
    pub new_amount_paid: Decimal,
    pub new_status: FeeStatus,
}

/// How a payment will be spread, computed before any write.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AllocationPlan {
    pub updates: Vec<FeeUpdate>,
    pub remaining_credit: Decimal,
}

impl AllocationPlan {
    /// Non-zero allocations, in the order they were applied.
    pub fn allocations(&self) -> Vec<FeeAllocation> {
        self.updates
            .iter()
            .filter(|u| u.allocated > Decimal::ZERO)
            .map(|u| FeeAllocation {
                fee_id: u.fee_id,
                fee_month: u.fee_month,
                amount: u.allocated,
            })
            .collect()
    }

    pub fn total_allocated(&self) -> Decimal {
        self.updates.iter().map(|u| u.allocated).sum()
    }

    /// Whether applying this plan settles a registration fee.
    pub fn settles_registration(&self) -> bool {
        self.updates
            .iter()
            .any(|u| u.fee_type == REGISTRATION_FEE && u.new_status == FeeStatus::Paid)
    }

    /// Whether the student's registration flag must be stamped.
    ///
    /// Only the first settlement stamps; a student already flagged keeps the
    /// original date.
    pub fn registration_stamp_due(&self, already_flagged: bool) -> bool {
        !already_flagged && self.settles_registration()
    }
}

/// Spread `amount` over `fees`, oldest `fee_month` first.
///
/// Fees already marked paid are skipped. The input order does not matter; fees
/// of the same month keep their relative order. Each fee receives
/// `min(remaining, amount_due - amount_paid)` and its status is recomputed.
/// A fee whose recomputed status differs from its stored one is updated even
/// when it receives nothing, so a zero-amount or already covered fee still
/// ends up `paid`.
///
/// The allocations plus the remaining credit always add up to `amount`, and
/// the allocations never exceed the total outstanding balance.
pub fn plan_allocation(fees: &[StudentFee], amount: Decimal) -> AllocationPlan {
    let mut outstanding: Vec<&StudentFee> = fees
        .iter()
        .filter(|f| f.status.parse::<FeeStatus>() != Ok(FeeStatus::Paid))
        .collect();
    outstanding.sort_by_key(|f| f.fee_month);

    let mut remaining = amount.max(Decimal::ZERO);
    let mut updates = Vec::new();

    for fee in outstanding {
        let allocated = remaining.min(fee.balance());
        let new_amount_paid = fee.amount_paid + allocated;
        let new_status = FeeStatus::for_amounts(fee.amount_due, new_amount_paid);

        if allocated <= Decimal::ZERO && fee.status.parse::<FeeStatus>() == Ok(new_status) {
            continue;
        }
        remaining -= allocated;

        updates.push(FeeUpdate {
            fee_id: fee.id,
            fee_type: fee.fee_type.clone(),
            fee_month: fee.fee_month,
            allocated,
            new_amount_paid,
            new_status,
        });
    }

    AllocationPlan {
        updates,
        remaining_credit: remaining,
    }
}

/// Check a payment amount before touching the database.
pub fn validate_amount(amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidRequest(
            "Amount must be positive".to_string(),
        ));
    }
    if amount.normalize().scale() > 2 {
        return Err(AppError::InvalidRequest(
            "Amount must not have more than 2 decimal places".to_string(),
        ));
    }
    Ok(())
}

/// Apply a payment to a student's outstanding fees.
///
/// # Process
///
/// 1. Validate the amount
/// 2. Start database transaction and lock the student
/// 3. Return the earlier result if this payment was already applied
/// 4. Lock outstanding fees oldest month first and plan the allocation
/// 5. Update each fee, record the allocation and an audit entry
/// 6. Stamp the student when a registration fee becomes fully paid
/// 7. Commit (or rollback on error)
///
/// # Errors
///
/// - `InvalidRequest`: Amount is zero, negative or has sub-cent precision, or the
///   payment was already applied to a different student
/// - `StudentNotFound`: Student doesn't exist in this center
/// - `Database`: Database error occurred
pub async fn allocate_payment(
    pool: &DbPool,
    settings: &BillingSettings,
    center_id: Uuid,
    student_id: Uuid,
    request: AllocatePaymentRequest,
) -> Result<AllocationResult, AppError> {
    validate_amount(request.amount)?;

    let mut tx = pool.begin().await?;

    // Locking the student serializes payments for the same student
    let student_sql =
        format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1 AND center_id = $2 FOR UPDATE");
    let student = sqlx::query_as::<_, Student>(&student_sql)
        .bind(student_id)
        .bind(center_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::StudentNotFound)?;

    if let Some((applied_student, remaining_credit)) = sqlx::query_as::<_, (Uuid, Decimal)>(
        "SELECT student_id, remaining_credit FROM applied_payments WHERE payment_id = $1 AND center_id = $2",
    )
    .bind(request.payment_id)
    .bind(center_id)
    .fetch_optional(&mut *tx)
    .await?
    {
        tx.rollback().await?;

        if applied_student != student_id {
            return Err(AppError::InvalidRequest(
                "Payment was already applied to another student".to_string(),
            ));
        }

        let allocations = sqlx::query_as::<_, FeeAllocation>(
            r#"
            SELECT fee_id, fee_month, amount FROM payment_allocations
            WHERE payment_id = $1 AND center_id = $2
            ORDER BY fee_month ASC
            "#,
        )
        .bind(request.payment_id)
        .bind(center_id)
        .fetch_all(pool)
        .await?;

        tracing::info!(payment_id = %request.payment_id, %student_id, "payment already applied");

        return Ok(AllocationResult {
            success: true,
            payment_id: request.payment_id,
            student_id,
            total_allocated: allocations.iter().map(|a| a.amount).sum(),
            allocations,
            remaining_credit,
            currency: settings.currency.clone(),
            already_applied: true,
        });
    }

    let outstanding = sqlx::query_as::<_, StudentFee>(
        r#"
        SELECT * FROM student_fees
        WHERE student_id = $1 AND center_id = $2 AND status <> 'paid'
        ORDER BY fee_month ASC, created_at ASC
        FOR UPDATE
        "#,
    )
    .bind(student_id)
    .bind(center_id)
    .fetch_all(&mut *tx)
    .await?;

    let plan = plan_allocation(&outstanding, request.amount);

    for update in &plan.updates {
        let before = outstanding
            .iter()
            .find(|f| f.id == update.fee_id)
            .map(|f| audit_service::snapshot(f))
            .transpose()?;

        let fee = sqlx::query_as::<_, StudentFee>(
            r#"
            UPDATE student_fees
            SET amount_paid = $1,
                status = $2,
                updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(update.new_amount_paid)
        .bind(update.new_status.as_str())
        .bind(update.fee_id)
        .fetch_one(&mut *tx)
        .await?;

        if update.allocated > Decimal::ZERO {
            sqlx::query(
                r#"
                INSERT INTO payment_allocations (center_id, payment_id, student_id, fee_id, fee_month, amount)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(center_id)
            .bind(request.payment_id)
            .bind(student_id)
            .bind(update.fee_id)
            .bind(update.fee_month)
            .bind(update.allocated)
            .execute(&mut *tx)
            .await?;
        }

        audit_service::record(
            &mut *tx,
            center_id,
            AuditAction::Update,
            "student_fee",
            Some(fee.id),
            before,
            Some(audit_service::snapshot(&fee)?),
        )
        .await?;
    }

    if plan.registration_stamp_due(student.registration_fee_paid) {
        let paid_on = request.paid_on.unwrap_or_else(|| Utc::now().date_naive());
        let stamp_sql = format!(
            r#"
            UPDATE students
            SET registration_fee_paid = TRUE,
                registration_fee_paid_date = $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING {STUDENT_COLUMNS}
            "#
        );
        let stamped = sqlx::query_as::<_, Student>(&stamp_sql)
            .bind(paid_on)
            .bind(student_id)
            .fetch_one(&mut *tx)
            .await?;

        audit_service::record(
            &mut *tx,
            center_id,
            AuditAction::Update,
            "student",
            Some(student_id),
            Some(audit_service::snapshot(&student)?),
            Some(audit_service::snapshot(&stamped)?),
        )
        .await?;

        tracing::info!(%student_id, %paid_on, "registration fee settled");
    }

    sqlx::query(
        r#"
        INSERT INTO applied_payments (payment_id, center_id, student_id, amount, remaining_credit)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(request.payment_id)
    .bind(center_id)
    .bind(student_id)
    .bind(request.amount)
    .bind(plan.remaining_credit)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let total_allocated = plan.total_allocated();
    tracing::info!(
        payment_id = %request.payment_id,
        %student_id,
        fees = plan.updates.len(),
        %total_allocated,
        remaining_credit = %plan.remaining_credit,
        "payment allocated"
    );

    Ok(AllocationResult {
        success: true,
        payment_id: request.payment_id,
        student_id,
        allocations: plan.allocations(),
        total_allocated,
        remaining_credit: plan.remaining_credit,
        currency: settings.currency.clone(),
        already_applied: false,
    })
}

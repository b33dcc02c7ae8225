//! Daily income accrual
//!
//! Credits every active investor the daily income of their level, once per
//! calendar day. Each attempt first inserts a `daily_incomes` row keyed by
//! `(user_id, income_date)`; the unique index turns a re-run for the same date
//! into "already credited". The credit itself (ledger posting + CREDITED flip)
//! happens in one database transaction. When it fails the row is marked FAILED
//! and the balance is untouched; a later run for the same date claims the FAILED
//! row back and retries it. A PENDING row whose lease ran out (the process died
//! between claim and credit) is claimed back the same way.
//!
//! One user's failure never stops the batch. The date of the last complete run is
//! kept in the `job_runs` table so the scheduler knows whether today is done;
//! a run that leaves failed or in-flight users does not move it.

use crate::{
    core::ledger::{self, Posting},
    entities::{
        DailyIncome, JobRun, Level, User, daily_income, daily_income::DailyIncomeStatus,
        job_run, level, transaction::TransactionType, user,
    },
    errors::{Error, Result, is_unique_violation},
};
use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{ActiveEnum, Set, TransactionTrait, prelude::*, sea_query::Expr};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

const DAILY_ACCRUAL_JOB: &str = "daily_income_accrual";

/// Seconds a PENDING record stays reserved for the run that claimed it
pub const PENDING_LEASE_SECS: i64 = 600;

/// What happened to one user during a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccrualOutcome {
    /// Credited by this call, with the amount posted
    Credited(f64),
    AlreadyCredited,
    /// Another run holds a live PENDING claim on the record
    InFlight,
}

enum Claim {
    Claimed(daily_income::Model),
    Credited,
    InFlight,
}

/// A user whose accrual failed during a run
#[derive(Debug, Clone)]
pub struct AccrualFailure {
    pub user_id: i64,
    pub reason: String,
}

/// Summary of one accrual run
#[derive(Debug, Clone)]
pub struct AccrualReport {
    /// Day the income was accrued for
    pub date: NaiveDate,
    /// Users credited by this run
    pub credited: usize,
    /// Users whose income for `date` was already credited
    pub already_credited: usize,
    /// Users whose record is held by another run's unexpired claim
    pub in_flight: usize,
    /// Total amount credited by this run
    pub total_amount: f64,
    pub failed: Vec<AccrualFailure>,
}

impl AccrualReport {
    /// True when every eligible user ended the run credited.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.in_flight == 0
    }
}

/// Retrieves the last day the accrual finished completely.
pub async fn last_accrual_date(db: &DatabaseConnection) -> Result<Option<NaiveDate>> {
    Ok(JobRun::find()
        .filter(job_run::Column::Job.eq(DAILY_ACCRUAL_JOB))
        .one(db)
        .await?
        .map(|run| run.last_completed_date))
}

/// True when no run has been recorded for `today` or any later day.
pub async fn is_accrual_needed(db: &DatabaseConnection, today: NaiveDate) -> Result<bool> {
    Ok(last_accrual_date(db)
        .await?
        .is_none_or(|last| last < today))
}

async fn set_last_accrual_date(db: &DatabaseConnection, date: NaiveDate) -> Result<()> {
    let existing = JobRun::find()
        .filter(job_run::Column::Job.eq(DAILY_ACCRUAL_JOB))
        .one(db)
        .await?;

    match existing {
        // Never move the marker backwards when an older date is replayed
        Some(run) if run.last_completed_date >= date => {}
        Some(run) => {
            let mut active: job_run::ActiveModel = run.into();
            active.last_completed_date = Set(date);
            active.updated_at = Set(Utc::now());
            active.update(db).await?;
        }
        None => {
            job_run::ActiveModel {
                job: Set(DAILY_ACCRUAL_JOB.to_string()),
                last_completed_date: Set(date),
                updated_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
    }

    Ok(())
}

/// Active users holding an active level with a positive daily income.
async fn eligible_investors(
    db: &DatabaseConnection,
) -> Result<Vec<(user::Model, level::Model)>> {
    let levels: HashMap<i64, level::Model> = Level::find()
        .filter(level::Column::IsActive.eq(true))
        .filter(level::Column::DailyIncome.gt(0.0))
        .all(db)
        .await?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();

    let users = User::find()
        .filter(user::Column::IsActive.eq(true))
        .filter(user::Column::LevelId.is_not_null())
        .all(db)
        .await?;

    Ok(users
        .into_iter()
        .filter_map(|u| {
            let level = levels.get(&u.level_id?)?.clone();
            Some((u, level))
        })
        .collect())
}

/// Inserts the PENDING record for this user and day, or claims back a FAILED
/// one or a PENDING one whose lease expired.
async fn claim_record(
    db: &DatabaseConnection,
    investor: &user::Model,
    level: &level::Model,
    date: NaiveDate,
) -> Result<Claim> {
    let now = Utc::now();
    let record = daily_income::ActiveModel {
        user_id: Set(investor.id),
        level_id: Set(level.id),
        income_date: Set(date),
        amount: Set(level.daily_income),
        status: Set(DailyIncomeStatus::Pending),
        transaction_id: Set(None),
        failure_reason: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match record.insert(db).await {
        Ok(created) => return Ok(Claim::Claimed(created)),
        Err(err) if is_unique_violation(&err) => {}
        Err(err) => return Err(err.into()),
    }

    let existing = DailyIncome::find()
        .filter(daily_income::Column::UserId.eq(investor.id))
        .filter(daily_income::Column::IncomeDate.eq(date))
        .one(db)
        .await?;
    let Some(existing) = existing else {
        return Ok(Claim::InFlight);
    };

    let lease_expired_before = now - Duration::seconds(PENDING_LEASE_SECS);
    let mut claim = DailyIncome::update_many()
        .col_expr(
            daily_income::Column::Status,
            Expr::value(DailyIncomeStatus::Pending.to_value()),
        )
        .col_expr(daily_income::Column::UpdatedAt, Expr::value(now))
        .filter(daily_income::Column::Id.eq(existing.id));
    match existing.status {
        DailyIncomeStatus::Credited => return Ok(Claim::Credited),
        DailyIncomeStatus::Failed => {
            claim = claim.filter(daily_income::Column::Status.eq(DailyIncomeStatus::Failed));
        }
        DailyIncomeStatus::Pending if existing.updated_at < lease_expired_before => {
            warn!(
                user_id = investor.id,
                %date,
                "Reclaiming daily income record with an expired lease"
            );
            claim = claim
                .filter(daily_income::Column::Status.eq(DailyIncomeStatus::Pending))
                .filter(daily_income::Column::UpdatedAt.lt(lease_expired_before));
        }
        DailyIncomeStatus::Pending => return Ok(Claim::InFlight),
    }

    // Only one concurrent run may take the row back
    if claim.exec(db).await?.rows_affected == 0 {
        return Ok(Claim::InFlight);
    }

    Ok(Claim::Claimed(daily_income::Model {
        status: DailyIncomeStatus::Pending,
        updated_at: now,
        ..existing
    }))
}

async fn credit_record(db: &DatabaseConnection, record: &daily_income::Model) -> Result<()> {
    let txn = db.begin().await?;

    let credit = ledger::post(
        &txn,
        Posting {
            user_id: record.user_id,
            amount: record.amount,
            transaction_type: TransactionType::DailyIncome,
            description: format!("Daily income for {}", record.income_date),
        },
    )
    .await?;

    // A run that reclaimed an expired lease may have credited the row meanwhile
    let flipped = DailyIncome::update_many()
        .col_expr(
            daily_income::Column::Status,
            Expr::value(DailyIncomeStatus::Credited.to_value()),
        )
        .col_expr(daily_income::Column::TransactionId, Expr::value(credit.id))
        .col_expr(daily_income::Column::FailureReason, Expr::value(Option::<String>::None))
        .col_expr(daily_income::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(daily_income::Column::Id.eq(record.id))
        .filter(daily_income::Column::Status.eq(DailyIncomeStatus::Pending))
        .exec(&txn)
        .await?;
    if flipped.rows_affected == 0 {
        txn.rollback().await?;
        return Err(Error::DuplicateRun {
            key: format!("daily:{}:{}", record.user_id, record.income_date),
        });
    }

    txn.commit().await?;
    Ok(())
}

async fn mark_failed(db: &DatabaseConnection, record: &daily_income::Model, reason: &str) -> Result<()> {
    DailyIncome::update_many()
        .col_expr(
            daily_income::Column::Status,
            Expr::value(DailyIncomeStatus::Failed.to_value()),
        )
        .col_expr(daily_income::Column::FailureReason, Expr::value(reason))
        .col_expr(daily_income::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(daily_income::Column::Id.eq(record.id))
        .filter(daily_income::Column::Status.eq(DailyIncomeStatus::Pending))
        .exec(db)
        .await?;
    Ok(())
}

/// Accrues one user's income for `date`.
pub async fn accrue_for_user(
    db: &DatabaseConnection,
    investor: &user::Model,
    level: &level::Model,
    date: NaiveDate,
) -> Result<AccrualOutcome> {
    let record = match claim_record(db, investor, level, date).await? {
        Claim::Claimed(record) => record,
        Claim::Credited => return Ok(AccrualOutcome::AlreadyCredited),
        Claim::InFlight => return Ok(AccrualOutcome::InFlight),
    };

    match credit_record(db, &record).await {
        Ok(()) => Ok(AccrualOutcome::Credited(record.amount)),
        Err(Error::DuplicateRun { key }) => {
            warn!(%key, "Daily income credited by another run");
            Ok(AccrualOutcome::AlreadyCredited)
        }
        Err(err) => {
            if let Err(mark_err) = mark_failed(db, &record, &err.to_string()).await {
                warn!(user_id = investor.id, %mark_err, "Could not record accrual failure");
            }
            Err(err)
        }
    }
}

/// Credits daily income for `as_of` to every eligible investor.
///
/// # Arguments
/// * `as_of` - Calendar day to accrue; normally today in UTC
///
/// Safe to run any number of times for the same date. Per-user failures are
/// logged and reported; only a failure to list the investors aborts the run.
/// The last-run marker only advances when the report is complete, so the
/// scheduler keeps retrying a date that left failed or in-flight users.
#[instrument(skip(db))]
pub async fn accrue_daily_income(db: &DatabaseConnection, as_of: NaiveDate) -> Result<AccrualReport> {
    let investors = eligible_investors(db).await?;

    let mut report = AccrualReport {
        date: as_of,
        credited: 0,
        already_credited: 0,
        in_flight: 0,
        total_amount: 0.0,
        failed: Vec::new(),
    };

    for (investor, level) in &investors {
        match accrue_for_user(db, investor, level, as_of).await {
            Ok(AccrualOutcome::Credited(amount)) => {
                report.credited += 1;
                report.total_amount += amount;
            }
            Ok(AccrualOutcome::AlreadyCredited) => report.already_credited += 1,
            Ok(AccrualOutcome::InFlight) => report.in_flight += 1,
            Err(err) => {
                warn!(user_id = investor.id, %err, "Daily income accrual failed");
                report.failed.push(AccrualFailure {
                    user_id: investor.id,
                    reason: err.to_string(),
                });
            }
        }
    }

    if report.is_complete() {
        set_last_accrual_date(db, as_of).await?;
    }

    info!(
        date = %as_of,
        credited = report.credited,
        already_credited = report.already_credited,
        in_flight = report.in_flight,
        failed = report.failed.len(),
        "Daily income accrual finished"
    );
    Ok(report)
}

/// Formats an accrual report into a human-readable summary string.
#[must_use]
pub fn format_accrual_summary(report: &AccrualReport) -> String {
    use std::fmt::Write;

    let mut summary = format!(
        "Daily Income - {} - Credited {} users (${:.2})\n",
        report.date.format("%Y-%m-%d"),
        report.credited,
        report.total_amount
    );
    let _ = writeln!(
        summary,
        "  Already credited: {} | In flight: {} | Failed: {}",
        report.already_credited,
        report.in_flight,
        report.failed.len()
    );
    for failure in &report.failed {
        let _ = writeln!(summary, "  user {} - {}", failure.user_id, failure.reason);
    }

    summary
}

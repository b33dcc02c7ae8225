//! Accrual scheduler - Periodically runs the daily income job.
//!
//! The loop wakes up every `check_interval_secs`, and runs the accrual for the
//! current UTC date when the persisted marker says today has not run yet. The
//! marker only moves after a run with no failed or in-flight users, so such a
//! day is retried on the next tick. The first tick fires immediately so a
//! restart catches up at once.

use crate::{
    config::settings::AccrualSettings,
    core::accrual::{self, AccrualReport},
    errors::Result,
};
use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use std::{future::Future, time::Duration};
use tracing::{error, info};

/// Runs the accrual for `today` unless it already ran.
pub async fn run_if_needed(
    db: &DatabaseConnection,
    today: NaiveDate,
) -> Result<Option<AccrualReport>> {
    if !accrual::is_accrual_needed(db, today).await? {
        return Ok(None);
    }
    accrual::accrue_daily_income(db, today).await.map(Some)
}

/// Drives the accrual job until `shutdown` resolves.
pub async fn run_accrual_scheduler<F>(db: &DatabaseConnection, settings: AccrualSettings, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(Duration::from_secs(settings.check_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(
        "Accrual scheduler started, checking every {}s",
        settings.check_interval_secs
    );
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Accrual scheduler stopping");
                break;
            }
            _ = interval.tick() => {
                let today = Utc::now().date_naive();
                match run_if_needed(db, today).await {
                    Ok(Some(report)) => info!("{}", accrual::format_accrual_summary(&report)),
                    Ok(None) => {}
                    Err(e) if e.is_retryable() => {
                        error!("Accrual run failed, retrying next tick: {}", e);
                    }
                    Err(e) => error!("Accrual run failed: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::entities::daily_income::{self, DailyIncomeStatus};
    use crate::test_utils::*;
    use sea_orm::{ActiveModelTrait, Set};

    #[tokio::test]
    async fn test_run_if_needed_runs_once_per_day() -> Result<()> {
        let db = setup_test_db().await?;
        let level = create_test_level(&db, 1, 1000.0, 25.0, (10.0, 5.0, 2.0)).await?;
        let investor = create_test_user(&db, "investor", None).await?;
        assign_level(&db, investor.id, level.id).await?;
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let first = run_if_needed(&db, today).await?;
        assert_eq!(first.unwrap().credited, 1);

        assert!(run_if_needed(&db, today).await?.is_none());

        let tomorrow = today.succ_opt().unwrap();
        assert!(run_if_needed(&db, tomorrow).await?.is_some());
        assert_eq!(get_user_balance(&db, investor.id).await?, 50.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_run_if_needed_retries_day_with_failures() -> Result<()> {
        let db = setup_test_db().await?;
        let level = create_test_level(&db, 1, 1000.0, 25.0, (10.0, 5.0, 2.0)).await?;
        let investor = create_test_user(&db, "investor", None).await?;
        assign_level(&db, investor.id, level.id).await?;
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        // An earlier attempt left a record the ledger rejects
        let broken = daily_income::ActiveModel {
            user_id: Set(investor.id),
            level_id: Set(level.id),
            income_date: Set(today),
            amount: Set(-1.0),
            status: Set(DailyIncomeStatus::Failed),
            transaction_id: Set(None),
            failure_reason: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let first = run_if_needed(&db, today).await?.unwrap();
        assert_eq!(first.failed.len(), 1);

        // The day is still open, so the next tick retries it
        let mut repaired: daily_income::ActiveModel = broken.into();
        repaired.amount = Set(25.0);
        repaired.update(&db).await?;

        let retry = run_if_needed(&db, today).await?.unwrap();
        assert_eq!(retry.credited, 1);
        assert!(retry.failed.is_empty());
        assert_eq!(get_user_balance(&db, investor.id).await?, 25.0);

        assert!(run_if_needed(&db, today).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = AccrualSettings {
            check_interval_secs: 3600,
        };

        // The first tick runs today's accrual, then shutdown ends the loop
        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        run_accrual_scheduler(&db, settings, shutdown).await;

        assert_eq!(
            accrual::last_accrual_date(&db).await?,
            Some(Utc::now().date_naive())
        );

        Ok(())
    }
}

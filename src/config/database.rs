//! Database configuration module for the referral ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`;
//! the composite uniqueness constraints that keep accrual, reward and commission runs
//! idempotent are added as explicit indexes afterwards.

use crate::entities::{
    DailyIncome, JobRun, Level, RewardHistory, TeamReferralHistory, Transaction, User,
    daily_income, reward_history, team_referral_history,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/referral_ledger.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or returns
/// the default local `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

fn unique_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("idx_daily_incomes_user_date")
            .table(DailyIncome)
            .col(daily_income::Column::UserId)
            .col(daily_income::Column::IncomeDate)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_reward_histories_user_run")
            .table(RewardHistory)
            .col(reward_history::Column::UserId)
            .col(reward_history::Column::RunKey)
            .unique()
            .if_not_exists()
            .to_owned(),
        // One payout per (investor, event type, run, upline level)
        Index::create()
            .name("idx_team_referral_histories_run")
            .table(TeamReferralHistory)
            .col(team_referral_history::Column::ReferredUserId)
            .col(team_referral_history::Column::TransactionType)
            .col(team_referral_history::Column::RunKey)
            .col(team_referral_history::Column::Level)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}

/// Creates all ledger tables and their unique indexes if they do not exist yet.
///
/// Users are created before the tables holding foreign keys to them.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, User).await?;
    create_table(db, Level).await?;
    create_table(db, Transaction).await?;
    create_table(db, DailyIncome).await?;
    create_table(db, TeamReferralHistory).await?;
    create_table(db, RewardHistory).await?;
    create_table(db, JobRun).await?;

    let builder = db.get_database_backend();
    for index in unique_indexes() {
        db.execute(builder.build(&index)).await?;
    }

    info!("Ledger tables and unique indexes ensured");
    Ok(())
}

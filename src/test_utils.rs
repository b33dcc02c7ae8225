//! Shared test utilities for the ledger core.
//!
//! This module provides common helper functions for setting up test databases
//! and creating users, levels and referral lines with sensible defaults.

use crate::{
    config::settings::LevelConfig,
    core::{
        level,
        settlement::{self, SettlementDecision},
        user::{self, NewUser},
    },
    entities::{self, User},
    errors::{Error, Result},
};
use sea_orm::{ConnectOptions, DatabaseConnection, prelude::*, sea_query::Expr};
use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database in the temp directory with a pool of
/// `max_connections`, for tests that need writers on separate connections.
pub async fn setup_file_test_db(
    name: &str,
    max_connections: u32,
) -> Result<(DatabaseConnection, PathBuf)> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let path = std::env::temp_dir().join(format!(
        "referral-ledger-{name}-{}-{nanos}.sqlite",
        std::process::id()
    ));

    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options.max_connections(max_connections).sqlx_logging(false);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok((db, path))
}

/// Removes a database created by [`setup_file_test_db`] and its journal files.
pub fn remove_test_db_files(path: &Path) {
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

/// Builds a level definition; rates are `(a, b, c)` in percent.
pub fn level_config(
    level_number: i32,
    investment_amount: f64,
    daily_income: f64,
    rates: (f64, f64, f64),
) -> LevelConfig {
    LevelConfig {
        level_number,
        investment_amount,
        daily_income,
        a_level_commission_rate: rates.0,
        b_level_commission_rate: rates.1,
        c_level_commission_rate: rates.2,
        is_active: true,
        order: level_number,
    }
}

/// Creates an active level.
pub async fn create_test_level(
    db: &DatabaseConnection,
    level_number: i32,
    investment_amount: f64,
    daily_income: f64,
    rates: (f64, f64, f64),
) -> Result<entities::level::Model> {
    level::create_level(
        db,
        &level_config(level_number, investment_amount, daily_income, rates),
    )
    .await
}

/// Registers a user with a zero balance, optionally referred by `referrer`.
pub async fn create_test_user(
    db: &DatabaseConnection,
    username: &str,
    referrer: Option<&entities::user::Model>,
) -> Result<entities::user::Model> {
    user::register_user(
        db,
        NewUser {
            username: username.to_string(),
            referral_code: None,
            referrer_code: referrer.map(|r| r.referral_code.clone()),
            initial_balance: 0.0,
        },
        None,
    )
    .await
}

/// Registers a user and funds it through an approved recharge.
pub async fn create_funded_user(
    db: &DatabaseConnection,
    username: &str,
    referrer: Option<&entities::user::Model>,
    amount: f64,
) -> Result<entities::user::Model> {
    let created = create_test_user(db, username, referrer).await?;
    let request = settlement::request_recharge(db, created.id, amount, None, None).await?;
    settlement::settle(db, request.id, SettlementDecision::Success).await?;
    user::get_user_by_id(db, created.id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: created.id.to_string(),
        })
}

/// Creates `count` users where each one was referred by the previous one.
/// The first user is the root; the last one is the deepest.
pub async fn create_referral_line(
    db: &DatabaseConnection,
    count: usize,
) -> Result<Vec<entities::user::Model>> {
    let mut users: Vec<entities::user::Model> = Vec::with_capacity(count);
    for i in 0..count {
        let created = create_test_user(db, &format!("member{i}"), users.last()).await?;
        users.push(created);
    }
    Ok(users)
}

/// Gives a user a level directly, without paying for it.
pub async fn assign_level(db: &DatabaseConnection, user_id: i64, level_id: i64) -> Result<()> {
    User::update_many()
        .col_expr(entities::user::Column::LevelId, Expr::value(level_id))
        .filter(entities::user::Column::Id.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Reads a user's current balance.
pub async fn get_user_balance(db: &DatabaseConnection, user_id: i64) -> Result<f64> {
    user::get_user_by_id(db, user_id)
        .await?
        .map(|u| u.balance)
        .ok_or_else(|| Error::UserNotFound {
            user_id: user_id.to_string(),
        })
}

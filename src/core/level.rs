//! Level business logic - Investment tier configuration.
//!
//! Levels are written by admins (or seeded from the config file) and are
//! read-only to the commission engine and the accrual job.

use crate::{
    config::settings::LevelConfig,
    entities::{Level, level},
    errors::{Error, Result, is_unique_violation},
};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::info;

fn validate_level(config: &LevelConfig) -> Result<()> {
    if config.level_number <= 0 {
        return Err(Error::Validation {
            message: format!("Level number must be positive, got {}", config.level_number),
        });
    }
    if !config.investment_amount.is_finite() || config.investment_amount <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: config.investment_amount,
        });
    }
    if !config.daily_income.is_finite() || config.daily_income < 0.0 {
        return Err(Error::InvalidAmount {
            amount: config.daily_income,
        });
    }
    for rate in [
        config.a_level_commission_rate,
        config.b_level_commission_rate,
        config.c_level_commission_rate,
    ] {
        if !(0.0..=100.0).contains(&rate) {
            return Err(Error::Validation {
                message: format!("Commission rate {rate} is outside 0-100%"),
            });
        }
    }
    Ok(())
}

/// Creates a level after validating amounts and rates.
pub async fn create_level(db: &DatabaseConnection, config: &LevelConfig) -> Result<level::Model> {
    validate_level(config)?;

    let record = level::ActiveModel {
        level_number: Set(config.level_number),
        investment_amount: Set(config.investment_amount),
        daily_income: Set(config.daily_income),
        a_level_commission_rate: Set(config.a_level_commission_rate),
        b_level_commission_rate: Set(config.b_level_commission_rate),
        c_level_commission_rate: Set(config.c_level_commission_rate),
        is_active: Set(config.is_active),
        order: Set(config.order),
        ..Default::default()
    };

    match record.insert(db).await {
        Ok(created) => Ok(created),
        Err(err) if is_unique_violation(&err) => Err(Error::Validation {
            message: format!("Level {} already exists", config.level_number),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Finds a level by its public number.
pub async fn get_level_by_number<C>(db: &C, level_number: i32) -> Result<Option<level::Model>>
where
    C: ConnectionTrait,
{
    Level::find()
        .filter(level::Column::LevelNumber.eq(level_number))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a level by its unique ID.
pub async fn get_level_by_id<C>(db: &C, level_id: i64) -> Result<Option<level::Model>>
where
    C: ConnectionTrait,
{
    Level::find_by_id(level_id).one(db).await.map_err(Into::into)
}

/// Lists purchasable levels in display order.
pub async fn list_active_levels(db: &DatabaseConnection) -> Result<Vec<level::Model>> {
    Level::find()
        .filter(level::Column::IsActive.eq(true))
        .order_by_asc(level::Column::Order)
        .order_by_asc(level::Column::LevelNumber)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Activates or retires a level.
pub async fn set_level_active(
    db: &DatabaseConnection,
    level_number: i32,
    is_active: bool,
) -> Result<level::Model> {
    let existing = get_level_by_number(db, level_number)
        .await?
        .ok_or_else(|| Error::LevelNotFound {
            level: level_number.to_string(),
        })?;

    let mut active: level::ActiveModel = existing.into();
    active.is_active = Set(is_active);
    active.update(db).await.map_err(Into::into)
}

/// Creates the configured levels that do not exist yet. Returns how many were added.
pub async fn seed_levels(db: &DatabaseConnection, levels: &[LevelConfig]) -> Result<usize> {
    let mut created = 0;
    for config in levels {
        if get_level_by_number(db, config.level_number).await?.is_some() {
            continue;
        }
        create_level(db, config).await?;
        created += 1;
    }

    if created > 0 {
        info!("Seeded {} investment levels", created);
    }
    Ok(created)
}

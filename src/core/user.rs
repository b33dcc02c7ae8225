//! User business logic - Signup, lookups and referral chain resolution.
//!
//! Users point at their direct referrer only; the upline used for commissions is
//! resolved on demand with a bounded walk of at most [`MAX_REFERRAL_DEPTH`] hops.

use crate::{
    config::settings::SignupBonusConfig,
    core::{
        commission::{self, CommissionEvent},
        ledger, level,
    },
    entities::{User, team_referral_history::ReferralTransactionType, user},
    errors::{Error, Result, is_unique_violation},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*};
use tracing::{info, instrument, warn};

/// Commission is paid to at most three upline levels (A, B, C)
pub const MAX_REFERRAL_DEPTH: usize = 3;

const MAX_USERNAME_LEN: usize = 32;

/// Signup request
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    /// Code to hand out to others; generated when absent
    pub referral_code: Option<String>,
    /// Referral code of the user who invited this one
    pub referrer_code: Option<String>,
    /// Balance the account opens with
    pub initial_balance: f64,
}

fn validate_referral_code(code: &str) -> Result<()> {
    if !(4..=16).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Validation {
            message: format!("Referral code '{code}' must be 4-16 letters or digits"),
        });
    }
    Ok(())
}

/// Generated codes contain a dash, which user-chosen codes never do.
fn generated_referral_code(user_id: i64) -> String {
    format!("REF-{user_id}")
}

/// Finds a user by its unique ID.
pub async fn get_user_by_id<C>(db: &C, user_id: i64) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Finds the user owning a referral code.
pub async fn get_user_by_referral_code<C>(db: &C, code: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(user::Column::ReferralCode.eq(code))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Registers a new user, linking it under the owner of `referrer_code`.
///
/// When a signup bonus is configured and the user was referred, the bonus is
/// distributed up the new user's chain in the same database transaction.
/// A bonus pointing at a level that does not exist is logged and skipped; see
/// [`check_signup_bonus`] for catching that at startup.
#[instrument(skip(db, new_user), fields(username = %new_user.username))]
pub async fn register_user(
    db: &DatabaseConnection,
    new_user: NewUser,
    signup_bonus: Option<SignupBonusConfig>,
) -> Result<user::Model> {
    let username = new_user.username.trim().to_string();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(Error::Validation {
            message: format!("Username must be 1-{MAX_USERNAME_LEN} characters"),
        });
    }
    if !new_user.initial_balance.is_finite() || new_user.initial_balance < 0.0 {
        return Err(Error::InvalidAmount {
            amount: new_user.initial_balance,
        });
    }
    if let Some(code) = &new_user.referral_code {
        validate_referral_code(code)?;
    }

    let txn = db.begin().await?;

    let referrer = match &new_user.referrer_code {
        Some(code) => Some(get_user_by_referral_code(&txn, code).await?.ok_or_else(|| {
            Error::UserNotFound {
                user_id: format!("referral code {code}"),
            }
        })?),
        None => None,
    };

    let generate_code = new_user.referral_code.is_none();
    let record = user::ActiveModel {
        referral_code: Set(new_user
            .referral_code
            .unwrap_or_else(|| format!("~{username}"))),
        username: Set(username),
        referrer_user_id: Set(referrer.as_ref().map(|r| r.id)),
        level_id: Set(None),
        balance: Set(new_user.initial_balance),
        initial_balance: Set(new_user.initial_balance),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    let mut created = match record.insert(&txn).await {
        Ok(created) => created,
        Err(err) if is_unique_violation(&err) => {
            return Err(Error::Validation {
                message: "Username or referral code already taken".to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    if generate_code {
        let user_id = created.id;
        let mut active: user::ActiveModel = created.into();
        active.referral_code = Set(generated_referral_code(user_id));
        created = active.update(&txn).await?;
    }

    if let (Some(referrer), Some(bonus)) = (&referrer, signup_bonus) {
        let Some(rates) = level::get_level_by_number(&txn, bonus.level_number).await? else {
            warn!(
                level_number = bonus.level_number,
                user_id = created.id,
                "Signup bonus level missing, skipping bonus"
            );
            txn.commit().await?;
            return Ok(created);
        };
        let event = CommissionEvent {
            investor_id: created.id,
            base_amount: bonus.base_amount,
            transaction_type: ReferralTransactionType::SignupBonus,
            run_key: format!("signup:{}", created.id),
        };
        let outcome = commission::distribute_with_level(&txn, &event, &rates).await?;
        info!(referrer_id = referrer.id, ?outcome, "Signup bonus distributed");
    }

    txn.commit().await?;

    info!(user_id = created.id, referrer = ?created.referrer_user_id, "User registered");
    Ok(created)
}

/// Fails when the configured signup bonus points at a level that does not exist.
pub async fn check_signup_bonus(db: &DatabaseConnection, bonus: &SignupBonusConfig) -> Result<()> {
    ledger::validate_amount(bonus.base_amount)?;
    if level::get_level_by_number(db, bonus.level_number).await?.is_none() {
        return Err(Error::Config {
            message: format!(
                "Signup bonus refers to unknown level {}",
                bonus.level_number
            ),
        });
    }
    Ok(())
}

/// Enables or disables an account. Disabled accounts accrue no daily income.
pub async fn set_user_active(
    db: &DatabaseConnection,
    user_id: i64,
    is_active: bool,
) -> Result<user::Model> {
    let existing = get_user_by_id(db, user_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: user_id.to_string(),
        })?;

    let mut active: user::ActiveModel = existing.into();
    active.is_active = Set(is_active);
    active.update(db).await.map_err(Into::into)
}

/// Resolves the upline of a user, direct referrer first, at most
/// [`MAX_REFERRAL_DEPTH`] entries.
///
/// Missing ancestors truncate the chain. A pointer back into the chain also
/// truncates it, so a corrupted tree never loops.
pub async fn referral_chain<C>(db: &C, user_id: i64) -> Result<Vec<user::Model>>
where
    C: ConnectionTrait,
{
    let investor = get_user_by_id(db, user_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: user_id.to_string(),
        })?;

    let mut chain: Vec<user::Model> = Vec::with_capacity(MAX_REFERRAL_DEPTH);
    let mut visited = vec![investor.id];
    let mut next = investor.referrer_user_id;

    while let Some(ancestor_id) = next {
        if chain.len() == MAX_REFERRAL_DEPTH {
            break;
        }
        if visited.contains(&ancestor_id) {
            warn!(user_id, ancestor_id, "Referral cycle detected, truncating chain");
            break;
        }
        let Some(ancestor) = get_user_by_id(db, ancestor_id).await? else {
            warn!(user_id, ancestor_id, "Referrer missing, truncating chain");
            break;
        };
        visited.push(ancestor.id);
        next = ancestor.referrer_user_id;
        chain.push(ancestor);
    }

    Ok(chain)
}

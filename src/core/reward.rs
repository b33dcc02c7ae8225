//! Reward runs - One-off credits keyed by a run identifier.
//!
//! A scheduled reward run (weekly team bonus, promotion payout, ...) credits each
//! recipient at most once: `reward_histories` is unique on `(user_id, run_key)`
//! and the history row is written in the same database transaction as the credit.

use crate::{
    core::ledger::{self, Posting},
    entities::{RewardHistory, reward_history, transaction::TransactionType},
    errors::{Error, Result, is_unique_violation},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, warn};

/// A reward to credit
#[derive(Debug, Clone)]
pub struct RewardGrant {
    pub user_id: i64,
    pub run_key: String,
    pub amount: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewardOutcome {
    Granted(reward_history::Model),
    /// This user was already rewarded in this run
    AlreadyGranted,
}

/// Credits `grant` unless the user already received this run's reward.
///
/// The reward row and its ledger credit commit together, so a run key pays a
/// user at most once even when the job is replayed.
///
/// # Errors
/// - `InvalidAmount` for a non-positive amount, `Validation` for an empty run key
/// - `UserNotFound` if the user does not exist
pub async fn grant_reward(db: &DatabaseConnection, grant: RewardGrant) -> Result<RewardOutcome> {
    ledger::validate_amount(grant.amount)?;
    if grant.run_key.trim().is_empty() {
        return Err(Error::Validation {
            message: "Reward run key cannot be empty".to_string(),
        });
    }

    let txn = db.begin().await?;

    let credit = ledger::post(
        &txn,
        Posting {
            user_id: grant.user_id,
            amount: grant.amount,
            transaction_type: TransactionType::Reward,
            description: grant.description.clone(),
        },
    )
    .await?;

    let history = reward_history::ActiveModel {
        user_id: Set(grant.user_id),
        run_key: Set(grant.run_key.clone()),
        amount: Set(grant.amount),
        transaction_id: Set(credit.id),
        description: Set(grant.description),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match history.insert(&txn).await {
        Ok(created) => {
            txn.commit().await?;
            info!(user_id = grant.user_id, run_key = %grant.run_key, "Reward granted");
            Ok(RewardOutcome::Granted(created))
        }
        Err(err) if is_unique_violation(&err) => {
            txn.rollback().await?;
            warn!(user_id = grant.user_id, run_key = %grant.run_key, "Reward already granted");
            Ok(RewardOutcome::AlreadyGranted)
        }
        Err(err) => Err(err.into()),
    }
}

/// Lists a user's rewards, newest first.
pub async fn get_rewards_for_user(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<reward_history::Model>> {
    RewardHistory::find()
        .filter(reward_history::Column::UserId.eq(user_id))
        .order_by_desc(reward_history::Column::CreatedAt)
        .order_by_desc(reward_history::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn weekly(user_id: i64) -> RewardGrant {
        RewardGrant {
            user_id,
            run_key: "weekly-2024-23".to_string(),
            amount: 15.0,
            description: "Weekly team reward".to_string(),
        }
    }

    #[tokio::test]
    async fn test_grant_reward_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let mut grant = weekly(1);
        grant.amount = 0.0;
        assert!(matches!(
            grant_reward(&db, grant).await,
            Err(Error::InvalidAmount { .. })
        ));

        let mut grant = weekly(1);
        grant.run_key = String::new();
        assert!(matches!(
            grant_reward(&db, grant).await,
            Err(Error::Validation { .. })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_grant_reward_credits_once_per_run() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "alice", None).await?;

        let first = grant_reward(&db, weekly(user.id)).await?;
        let RewardOutcome::Granted(history) = first else {
            panic!("expected a grant");
        };
        assert_eq!(history.run_key, "weekly-2024-23");

        let second = grant_reward(&db, weekly(user.id)).await?;
        assert_eq!(second, RewardOutcome::AlreadyGranted);

        assert_eq!(get_user_balance(&db, user.id).await?, 15.0);
        assert_eq!(get_rewards_for_user(&db, user.id).await?.len(), 1);
        assert_eq!(ledger::ledger_discrepancy(&db, user.id).await?, 0.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_same_run_different_users() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = create_test_user(&db, "alice", None).await?;
        let bob = create_test_user(&db, "bob", None).await?;

        grant_reward(&db, weekly(alice.id)).await?;
        let outcome = grant_reward(&db, weekly(bob.id)).await?;

        assert!(matches!(outcome, RewardOutcome::Granted(_)));
        assert_eq!(get_user_balance(&db, bob.id).await?, 15.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_grant_reward_unknown_user() -> Result<()> {
        let db = setup_test_db().await?;
        let result = grant_reward(&db, weekly(404)).await;
        assert!(matches!(result, Err(Error::UserNotFound { .. })));
        Ok(())
    }
}

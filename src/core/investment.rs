//! Investment purchase - Buying a level and paying the upline.
//!
//! The buyer's balance is debited through the ledger, the level is assigned, and
//! the investment commission is distributed at the purchased level's rates. The
//! three steps share one database transaction.

use crate::{
    core::{
        commission::{self, CommissionEvent, CommissionOutcome},
        ledger::{self, Posting},
        level, user,
    },
    entities::{
        team_referral_history::ReferralTransactionType,
        transaction::{self, TransactionType},
        user as user_entity,
    },
    errors::{Error, Result},
};
use sea_orm::{Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// Result of a successful purchase
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    /// The LEVEL_PURCHASE debit
    pub transaction: transaction::Model,
    /// Buyer after the level was assigned
    pub user: user_entity::Model,
    pub commission: CommissionOutcome,
}

/// Buys `level_number` for `user_id` out of the user's balance.
///
/// # Errors
/// - `LevelNotFound` for an unknown level, `Validation` for a retired one
/// - `InsufficientFunds` when the balance does not cover the price
#[instrument(skip(db))]
pub async fn purchase_level(
    db: &DatabaseConnection,
    user_id: i64,
    level_number: i32,
) -> Result<PurchaseReceipt> {
    let txn = db.begin().await?;

    let target = level::get_level_by_number(&txn, level_number)
        .await?
        .ok_or_else(|| Error::LevelNotFound {
            level: level_number.to_string(),
        })?;
    if !target.is_active {
        return Err(Error::Validation {
            message: format!("Level {level_number} is not available for purchase"),
        });
    }

    let buyer = user::get_user_by_id(&txn, user_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: user_id.to_string(),
        })?;
    if !buyer.is_active {
        return Err(Error::Validation {
            message: format!("User {user_id} is disabled"),
        });
    }

    let debit = ledger::post(
        &txn,
        Posting {
            user_id,
            amount: target.investment_amount,
            transaction_type: TransactionType::LevelPurchase,
            description: format!("Purchase of level {level_number}"),
        },
    )
    .await?;

    // Re-read so the assignment does not overwrite the debited balance
    let debited = user::get_user_by_id(&txn, user_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: user_id.to_string(),
        })?;
    let mut active: user_entity::ActiveModel = debited.into();
    active.level_id = Set(Some(target.id));
    let updated = active.update(&txn).await?;

    let event = CommissionEvent {
        investor_id: user_id,
        base_amount: target.investment_amount,
        transaction_type: ReferralTransactionType::InvestmentCommission,
        run_key: format!("purchase:{}", debit.id),
    };
    let commission = commission::distribute_with_level(&txn, &event, &target).await?;

    txn.commit().await?;

    info!(
        user_id,
        level_number,
        commission_paid = commission.total_paid(),
        "Level purchased"
    );
    Ok(PurchaseReceipt {
        transaction: debit,
        user: updated,
        commission,
    })
}

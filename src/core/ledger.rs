//! Ledger business logic - The only code path that changes a user's balance.
//!
//! Every balance movement is an atomic `UPDATE users SET balance = balance + delta`
//! guarded against going negative, paired with the SUCCESS transaction row that
//! records the before/after snapshot. Callers pass the open database transaction
//! so both writes commit or roll back together.

use crate::{
    entities::{
        Transaction, User,
        transaction::{self, TransactionStatus, TransactionType},
        user,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::debug;

/// Balance snapshot around a single movement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceChange {
    pub before: f64,
    pub after: f64,
}

/// A balance movement to record as a settled transaction
#[derive(Debug, Clone)]
pub struct Posting {
    pub user_id: i64,
    /// Positive magnitude; the sign comes from `transaction_type`
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub description: String,
}

/// Rounds to whole cents.
#[must_use]
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Rejects amounts that are zero, negative, NaN or infinite.
pub fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Applies `delta` to the user's balance in one conditional update.
///
/// Debits only succeed when the balance covers them; otherwise the balance is
/// untouched and `InsufficientFunds` is returned. The update runs before any
/// read so the write lock is held when the snapshot is taken; concurrent
/// movements on the same user queue behind it instead of reading a stale balance.
pub(crate) async fn apply_balance_delta<C>(db: &C, user_id: i64, delta: f64) -> Result<BalanceChange>
where
    C: ConnectionTrait,
{
    let mut update = User::update_many()
        .col_expr(
            user::Column::Balance,
            Expr::col(user::Column::Balance).add(delta),
        )
        .filter(user::Column::Id.eq(user_id));
    if delta < 0.0 {
        update = update.filter(user::Column::Balance.gte(-delta));
    }
    let rows_affected = update.exec(db).await?.rows_affected;

    let current = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: user_id.to_string(),
        })?;

    if rows_affected == 0 {
        return Err(Error::InsufficientFunds {
            current: current.balance,
            required: -delta,
        });
    }

    debug!(user_id, delta, balance = current.balance, "Balance updated");
    Ok(BalanceChange {
        before: current.balance - delta,
        after: current.balance,
    })
}

/// Moves the balance and records the movement as a SUCCESS transaction.
///
/// Must be called inside a database transaction for the two writes to be atomic.
pub(crate) async fn post<C>(db: &C, posting: Posting) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    validate_amount(posting.amount)?;

    let delta = posting.transaction_type.signed(posting.amount);
    let change = apply_balance_delta(db, posting.user_id, delta).await?;

    let now = Utc::now();
    let record = transaction::ActiveModel {
        user_id: Set(posting.user_id),
        amount: Set(posting.amount),
        transaction_type: Set(posting.transaction_type),
        status: Set(TransactionStatus::Success),
        balance_before: Set(Some(change.before)),
        balance_after: Set(Some(change.after)),
        description: Set(posting.description),
        payment_method: Set(None),
        proof_url: Set(None),
        created_at: Set(now),
        settled_at: Set(Some(now)),
        ..Default::default()
    };

    record.insert(db).await.map_err(Into::into)
}

/// Retrieves a transaction by its ID.
pub async fn get_transaction_by_id(
    db: &DatabaseConnection,
    transaction_id: i64,
) -> Result<Option<transaction::Model>> {
    Transaction::find_by_id(transaction_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves all transactions of a user, newest first.
pub async fn get_transactions_for_user(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<transaction::Model>> {
    Transaction::find()
        .filter(transaction::Column::UserId.eq(user_id))
        .order_by_desc(transaction::Column::CreatedAt)
        .order_by_desc(transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Sum of the signed amounts of a user's SUCCESS transactions.
pub async fn settled_total(db: &DatabaseConnection, user_id: i64) -> Result<f64> {
    let settled = Transaction::find()
        .filter(transaction::Column::UserId.eq(user_id))
        .filter(transaction::Column::Status.eq(TransactionStatus::Success))
        .all(db)
        .await?;

    Ok(settled
        .iter()
        .map(|t| t.transaction_type.signed(t.amount))
        .sum())
}

/// Difference between the balance movement since signup and what the ledger
/// explains. Zero (up to rounding) for a consistent account.
pub async fn ledger_discrepancy(db: &DatabaseConnection, user_id: i64) -> Result<f64> {
    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: user_id.to_string(),
        })?;

    let explained = settled_total(db, user_id).await?;
    Ok(round_currency((user.balance - user.initial_balance) - explained))
}

//! Settlement business logic - Recharge and withdrawal requests and their approval.
//!
//! Users file PENDING requests; an admin settles each one exactly once as
//! SUCCESS or FAILED. A SUCCESS settlement moves the balance through the ledger
//! and stamps the before/after snapshot on the same row, in one database
//! transaction. FAILED settlements never touch the balance.

use crate::{
    core::{ledger, user},
    entities::{
        Transaction,
        transaction::{self, TransactionStatus, TransactionType},
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{ActiveEnum, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{info, instrument};

/// Admin decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementDecision {
    Success,
    Failed,
}

impl SettlementDecision {
    const fn status(self) -> TransactionStatus {
        match self {
            Self::Success => TransactionStatus::Success,
            Self::Failed => TransactionStatus::Failed,
        }
    }
}

async fn create_pending(
    db: &DatabaseConnection,
    user_id: i64,
    amount: f64,
    transaction_type: TransactionType,
    payment_method: Option<String>,
    proof_url: Option<String>,
) -> Result<transaction::Model> {
    ledger::validate_amount(amount)?;
    user::get_user_by_id(db, user_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: user_id.to_string(),
        })?;

    let description = match transaction_type {
        TransactionType::Recharge => "Wallet recharge request",
        _ => "Withdrawal request",
    };

    let record = transaction::ActiveModel {
        user_id: Set(user_id),
        amount: Set(amount),
        transaction_type: Set(transaction_type),
        status: Set(TransactionStatus::Pending),
        balance_before: Set(None),
        balance_after: Set(None),
        description: Set(description.to_string()),
        payment_method: Set(payment_method),
        proof_url: Set(proof_url),
        created_at: Set(Utc::now()),
        settled_at: Set(None),
        ..Default::default()
    };

    let created = record.insert(db).await?;
    info!(
        transaction_id = created.id,
        user_id,
        amount,
        kind = ?transaction_type,
        "Pending request created"
    );
    Ok(created)
}

/// Files a recharge request awaiting admin approval.
///
/// The balance is only credited once the request is settled as a success.
///
/// # Arguments
/// * `user_id` - The user topping up
/// * `amount` - Positive amount to credit on approval
/// * `payment_method` - Free-form channel name (bank, wallet, ...)
/// * `proof_url` - Uploaded payment proof; its content is never inspected
pub async fn request_recharge(
    db: &DatabaseConnection,
    user_id: i64,
    amount: f64,
    payment_method: Option<String>,
    proof_url: Option<String>,
) -> Result<transaction::Model> {
    create_pending(
        db,
        user_id,
        amount,
        TransactionType::Recharge,
        payment_method,
        proof_url,
    )
    .await
}

/// Files a withdrawal request. Funds are checked when the request is settled.
pub async fn request_withdrawal(
    db: &DatabaseConnection,
    user_id: i64,
    amount: f64,
    payment_method: Option<String>,
) -> Result<transaction::Model> {
    create_pending(
        db,
        user_id,
        amount,
        TransactionType::Withdrawal,
        payment_method,
        None,
    )
    .await
}

/// Lists requests waiting for a decision, oldest first.
pub async fn list_pending_transactions(db: &DatabaseConnection) -> Result<Vec<transaction::Model>> {
    Transaction::find()
        .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
        .order_by_asc(transaction::Column::CreatedAt)
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Moves a PENDING recharge or withdrawal to SUCCESS or FAILED.
///
/// # Errors
/// - `TransactionNotFound` if the id is unknown
/// - `InvalidStateTransition` if the transaction is no longer PENDING
/// - `InsufficientFunds` if a withdrawal exceeds the balance; the request stays PENDING
#[instrument(skip(db))]
pub async fn settle(
    db: &DatabaseConnection,
    transaction_id: i64,
    decision: SettlementDecision,
) -> Result<transaction::Model> {
    let txn = db.begin().await?;
    let target = decision.status();

    let pending = Transaction::find_by_id(transaction_id)
        .one(&txn)
        .await?
        .ok_or(Error::TransactionNotFound { transaction_id })?;

    if pending.status != TransactionStatus::Pending {
        return Err(Error::InvalidStateTransition {
            transaction_id,
            from: pending.status,
            to: target,
        });
    }
    if !matches!(
        pending.transaction_type,
        TransactionType::Recharge | TransactionType::Withdrawal
    ) {
        return Err(Error::Validation {
            message: format!(
                "{:?} transactions are not settled by an admin",
                pending.transaction_type
            ),
        });
    }

    let mut update = Transaction::update_many()
        .col_expr(transaction::Column::Status, Expr::value(target.to_value()))
        .col_expr(transaction::Column::SettledAt, Expr::value(Utc::now()))
        .filter(transaction::Column::Id.eq(transaction_id))
        .filter(transaction::Column::Status.eq(TransactionStatus::Pending));

    if decision == SettlementDecision::Success {
        let delta = pending.transaction_type.signed(pending.amount);
        let change = ledger::apply_balance_delta(&txn, pending.user_id, delta).await?;
        update = update
            .col_expr(transaction::Column::BalanceBefore, Expr::value(change.before))
            .col_expr(transaction::Column::BalanceAfter, Expr::value(change.after));
    }

    if update.exec(&txn).await?.rows_affected == 0 {
        let current = Transaction::find_by_id(transaction_id)
            .one(&txn)
            .await?
            .map_or(pending.status, |t| t.status);
        return Err(Error::InvalidStateTransition {
            transaction_id,
            from: current,
            to: target,
        });
    }

    let settled = Transaction::find_by_id(transaction_id)
        .one(&txn)
        .await?
        .ok_or(Error::TransactionNotFound { transaction_id })?;
    txn.commit().await?;

    info!(
        transaction_id,
        user_id = settled.user_id,
        status = ?settled.status,
        balance_after = ?settled.balance_after,
        "Transaction settled"
    );
    Ok(settled)
}

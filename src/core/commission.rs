//! Commission engine - Pays referral commissions up to three levels of upline.
//!
//! Given an investment or signup event, the investor's chain is resolved
//! (A = direct referrer, B = referrer's referrer, C = third level) and each
//! existing ancestor is credited `base_amount * rate / 100`, where the rates come
//! from the investor's level. Every payout writes a ledger credit and a
//! `team_referral_histories` row carrying a snapshot of the traversed chain.
//!
//! The history table is unique on (investor, event type, run key, level), and the
//! whole distribution runs inside one database transaction, so a repeated run is
//! rejected as a unit and never pays twice.

use crate::{
    core::{
        ledger::{self, Posting},
        level, user,
    },
    entities::{
        level as level_entity,
        team_referral_history::{
            self, CommissionLevel, ReferralStatus, ReferralTransactionType,
        },
        transaction::TransactionType,
    },
    errors::{Error, Result, is_unique_violation},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*};
use tracing::{debug, info, instrument, warn};

/// Event that triggers a commission distribution
#[derive(Debug, Clone)]
pub struct CommissionEvent {
    /// User whose signup or investment is being rewarded upstream
    pub investor_id: i64,
    /// Amount the rates are applied to
    pub base_amount: f64,
    pub transaction_type: ReferralTransactionType,
    /// Identifies the run; repeating a run key is a no-op
    pub run_key: String,
}

impl CommissionEvent {
    fn idempotency_key(&self) -> String {
        format!(
            "{}:{:?}:{}",
            self.investor_id, self.transaction_type, self.run_key
        )
    }
}

/// A single credit made to an upline member
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionPayout {
    pub beneficiary_id: i64,
    pub level: CommissionLevel,
    /// Rate applied, in percent
    pub rate: f64,
    pub amount: f64,
    pub transaction_id: i64,
}

/// Result of a distribution request
#[derive(Debug, Clone, PartialEq)]
pub enum CommissionOutcome {
    /// Payouts made, level A first (zero-rate levels are skipped)
    Distributed(Vec<CommissionPayout>),
    /// The investor has no referrer; nothing to pay
    NoReferralChain,
    /// This run was already paid out earlier
    AlreadyDistributed,
}

impl CommissionOutcome {
    /// Total credited by this distribution.
    #[must_use]
    pub fn total_paid(&self) -> f64 {
        match self {
            Self::Distributed(payouts) => payouts.iter().map(|p| p.amount).sum(),
            Self::NoReferralChain | Self::AlreadyDistributed => 0.0,
        }
    }
}

fn chain_snapshot(chain: &[crate::entities::user::Model]) -> String {
    chain
        .iter()
        .map(|u| u.id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses a stored chain snapshot back into user ids.
#[must_use]
pub fn parse_chain_snapshot(snapshot: &str) -> Vec<i64> {
    snapshot
        .split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

/// Distributes commission for `event` using the rates of the investor's level.
///
/// Walks at most three ancestors up from the investor and credits each one
/// `base_amount * rate / 100` at the rate of its tier. All payouts and their
/// history rows commit in one database transaction. A repeated run key returns
/// [`CommissionOutcome::AlreadyDistributed`] without touching any balance.
///
/// # Arguments
/// * `event.investor_id` - The user whose investment or signup triggered the run
/// * `event.base_amount` - Amount the rates apply to
/// * `event.run_key` - Identifies the triggering event; one payout set per key
///
/// # Errors
/// - `UserNotFound` for an unknown investor
/// - `Validation` when a referred investor holds no level
/// - `InvalidAmount` / `Validation` for a bad amount or empty run key
#[instrument(skip(db), fields(investor_id = event.investor_id, run_key = %event.run_key))]
pub async fn distribute_commission(
    db: &DatabaseConnection,
    event: &CommissionEvent,
) -> Result<CommissionOutcome> {
    let txn = db.begin().await?;

    let investor = user::get_user_by_id(&txn, event.investor_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: event.investor_id.to_string(),
        })?;

    // Without referrers there is nothing to pay, whatever level the investor holds
    if user::referral_chain(&txn, investor.id).await?.is_empty() {
        txn.rollback().await?;
        debug!(investor_id = investor.id, "No referral chain, nothing to pay");
        return Ok(CommissionOutcome::NoReferralChain);
    }

    let level_id = investor.level_id.ok_or_else(|| Error::Validation {
        message: format!("User {} holds no investment level", investor.id),
    })?;
    let rates = level::get_level_by_id(&txn, level_id)
        .await?
        .ok_or_else(|| Error::LevelNotFound {
            level: level_id.to_string(),
        })?;

    match distribute_with_level(&txn, event, &rates).await {
        Ok(outcome) => {
            txn.commit().await?;
            Ok(outcome)
        }
        Err(Error::DuplicateRun { key }) => {
            txn.rollback().await?;
            warn!(%key, "Commission run already distributed");
            Ok(CommissionOutcome::AlreadyDistributed)
        }
        Err(err) => Err(err),
    }
}

/// Pays the chain of `event.investor_id` at the rates of `rates`.
///
/// Runs on the caller's connection; callers wrap it in a database transaction.
/// A repeated run surfaces as [`Error::DuplicateRun`] so the caller can roll back.
pub(crate) async fn distribute_with_level<C>(
    db: &C,
    event: &CommissionEvent,
    rates: &level_entity::Model,
) -> Result<CommissionOutcome>
where
    C: ConnectionTrait,
{
    ledger::validate_amount(event.base_amount)?;
    if event.run_key.trim().is_empty() {
        return Err(Error::Validation {
            message: "Commission run key cannot be empty".to_string(),
        });
    }

    let chain = user::referral_chain(db, event.investor_id).await?;
    let Some(direct_referrer) = chain.first() else {
        debug!(investor_id = event.investor_id, "No referral chain, nothing to pay");
        return Ok(CommissionOutcome::NoReferralChain);
    };
    let direct_referrer_id = direct_referrer.id;
    let snapshot = chain_snapshot(&chain);

    let mut payouts = Vec::with_capacity(chain.len());
    for (depth, beneficiary) in chain.iter().enumerate() {
        let Some(tier) = CommissionLevel::from_depth(depth) else {
            break;
        };
        let rate = tier.rate(rates);
        let amount = ledger::round_currency(event.base_amount * rate / 100.0);
        if amount <= 0.0 {
            debug!(beneficiary_id = beneficiary.id, ?tier, "Zero commission, skipping");
            continue;
        }

        let credit = ledger::post(
            db,
            Posting {
                user_id: beneficiary.id,
                amount,
                transaction_type: TransactionType::ReferralCommission,
                description: format!(
                    "Level {tier:?} commission from user {}",
                    event.investor_id
                ),
            },
        )
        .await?;

        let history = team_referral_history::ActiveModel {
            user_id: Set(beneficiary.id),
            referred_user_id: Set(event.investor_id),
            referrer_user_id: Set(direct_referrer_id),
            level: Set(tier),
            amount: Set(amount),
            transaction_type: Set(event.transaction_type),
            status: Set(ReferralStatus::Completed),
            run_key: Set(event.run_key.clone()),
            transaction_id: Set(credit.id),
            referral_chain: Set(snapshot.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        match history.insert(db).await {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(Error::DuplicateRun {
                    key: event.idempotency_key(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        payouts.push(CommissionPayout {
            beneficiary_id: beneficiary.id,
            level: tier,
            rate,
            amount,
            transaction_id: credit.id,
        });
    }

    info!(
        investor_id = event.investor_id,
        payouts = payouts.len(),
        "Commission distributed"
    );
    Ok(CommissionOutcome::Distributed(payouts))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::entities::{TeamReferralHistory, Transaction, transaction};
    use crate::test_utils::*;

    fn investment_event(investor_id: i64, run_key: &str) -> CommissionEvent {
        CommissionEvent {
            investor_id,
            base_amount: 1000.0,
            transaction_type: ReferralTransactionType::InvestmentCommission,
            run_key: run_key.to_string(),
        }
    }

    #[test]
    fn test_parse_chain_snapshot() {
        assert_eq!(parse_chain_snapshot("4,3,2"), vec![4, 3, 2]);
        assert_eq!(parse_chain_snapshot("7"), vec![7]);
        assert!(parse_chain_snapshot("").is_empty());
    }

    #[tokio::test]
    async fn test_three_level_chain_pays_three_ancestors() -> Result<()> {
        let db = setup_test_db().await?;
        let level = create_test_level(&db, 1, 1000.0, 20.0, (10.0, 5.0, 2.0)).await?;
        // users[0] is above the third level and must not be paid
        let users = create_referral_line(&db, 5).await?;
        let investor = &users[4];
        assign_level(&db, investor.id, level.id).await?;

        let outcome = distribute_commission(&db, &investment_event(investor.id, "run-1")).await?;

        let CommissionOutcome::Distributed(payouts) = &outcome else {
            panic!("expected payouts, got {outcome:?}");
        };
        assert_eq!(payouts.len(), 3);
        assert_eq!(payouts[0].level, CommissionLevel::A);
        assert_eq!(payouts[0].beneficiary_id, users[3].id);
        assert_eq!(outcome.total_paid(), 170.0);

        assert_eq!(get_user_balance(&db, users[3].id).await?, 100.0);
        assert_eq!(get_user_balance(&db, users[2].id).await?, 50.0);
        assert_eq!(get_user_balance(&db, users[1].id).await?, 20.0);
        assert_eq!(get_user_balance(&db, users[0].id).await?, 0.0);

        let histories = TeamReferralHistory::find().all(&db).await?;
        assert_eq!(histories.len(), 3);
        let expected_chain = format!("{},{},{}", users[3].id, users[2].id, users[1].id);
        for history in &histories {
            assert_eq!(history.referred_user_id, investor.id);
            assert_eq!(history.referrer_user_id, users[3].id);
            assert_eq!(history.referral_chain, expected_chain);
            assert_eq!(
                history.transaction_type,
                ReferralTransactionType::InvestmentCommission
            );
        }

        let credits = Transaction::find()
            .filter(
                transaction::Column::TransactionType.eq(TransactionType::ReferralCommission),
            )
            .count(&db)
            .await?;
        assert_eq!(credits, 3);

        Ok(())
    }

    #[tokio::test]
    async fn test_single_ancestor_gets_single_payout() -> Result<()> {
        let db = setup_test_db().await?;
        let level = create_test_level(&db, 1, 1000.0, 20.0, (10.0, 5.0, 2.0)).await?;
        let users = create_referral_line(&db, 2).await?;
        assign_level(&db, users[1].id, level.id).await?;

        let outcome = distribute_commission(&db, &investment_event(users[1].id, "run-1")).await?;

        let CommissionOutcome::Distributed(payouts) = outcome else {
            panic!("expected payouts");
        };
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].beneficiary_id, users[0].id);
        assert_eq!(payouts[0].level, CommissionLevel::A);
        assert_eq!(payouts[0].rate, 10.0);
        assert_eq!(payouts[0].amount, 100.0);
        assert_eq!(TeamReferralHistory::find().count(&db).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_no_referrer_is_noop() -> Result<()> {
        let db = setup_test_db().await?;
        let level = create_test_level(&db, 1, 1000.0, 20.0, (10.0, 5.0, 2.0)).await?;
        let loner = create_test_user(&db, "loner", None).await?;
        assign_level(&db, loner.id, level.id).await?;

        let outcome = distribute_commission(&db, &investment_event(loner.id, "run-1")).await?;

        assert_eq!(outcome, CommissionOutcome::NoReferralChain);
        assert_eq!(TeamReferralHistory::find().count(&db).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_root_user_without_level_is_noop() -> Result<()> {
        let db = setup_test_db().await?;
        let root = create_test_user(&db, "root", None).await?;
        assert!(root.level_id.is_none());

        let outcome = distribute_commission(&db, &investment_event(root.id, "run-1")).await?;

        assert_eq!(outcome, CommissionOutcome::NoReferralChain);
        assert_eq!(outcome.total_paid(), 0.0);
        assert_eq!(TeamReferralHistory::find().count(&db).await?, 0);
        assert_eq!(get_user_balance(&db, root.id).await?, 0.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_run_does_not_pay_twice() -> Result<()> {
        let db = setup_test_db().await?;
        let level = create_test_level(&db, 1, 1000.0, 20.0, (10.0, 5.0, 2.0)).await?;
        let users = create_referral_line(&db, 3).await?;
        assign_level(&db, users[2].id, level.id).await?;
        let event = investment_event(users[2].id, "purchase:1");

        distribute_commission(&db, &event).await?;
        let second = distribute_commission(&db, &event).await?;

        assert_eq!(second, CommissionOutcome::AlreadyDistributed);
        assert_eq!(get_user_balance(&db, users[1].id).await?, 100.0);
        assert_eq!(get_user_balance(&db, users[0].id).await?, 50.0);
        assert_eq!(TeamReferralHistory::find().count(&db).await?, 2);
        assert_eq!(ledger::ledger_discrepancy(&db, users[1].id).await?, 0.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_new_run_key_pays_again() -> Result<()> {
        let db = setup_test_db().await?;
        let level = create_test_level(&db, 1, 1000.0, 20.0, (10.0, 5.0, 2.0)).await?;
        let users = create_referral_line(&db, 2).await?;
        assign_level(&db, users[1].id, level.id).await?;

        distribute_commission(&db, &investment_event(users[1].id, "run-1")).await?;
        distribute_commission(&db, &investment_event(users[1].id, "run-2")).await?;

        assert_eq!(get_user_balance(&db, users[0].id).await?, 200.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_rates_come_from_investor_level() -> Result<()> {
        let db = setup_test_db().await?;
        let investor_level = create_test_level(&db, 1, 1000.0, 20.0, (10.0, 5.0, 2.0)).await?;
        let rich_level = create_test_level(&db, 2, 9000.0, 90.0, (40.0, 30.0, 20.0)).await?;
        let users = create_referral_line(&db, 2).await?;
        assign_level(&db, users[0].id, rich_level.id).await?;
        assign_level(&db, users[1].id, investor_level.id).await?;

        distribute_commission(&db, &investment_event(users[1].id, "run-1")).await?;

        assert_eq!(get_user_balance(&db, users[0].id).await?, 100.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_zero_rate_level_is_skipped() -> Result<()> {
        let db = setup_test_db().await?;
        let level = create_test_level(&db, 1, 1000.0, 20.0, (10.0, 0.0, 2.0)).await?;
        let users = create_referral_line(&db, 4).await?;
        assign_level(&db, users[3].id, level.id).await?;

        let outcome = distribute_commission(&db, &investment_event(users[3].id, "run-1")).await?;

        let CommissionOutcome::Distributed(payouts) = outcome else {
            panic!("expected payouts");
        };
        let levels: Vec<CommissionLevel> = payouts.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![CommissionLevel::A, CommissionLevel::C]);
        assert_eq!(get_user_balance(&db, users[1].id).await?, 0.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_investor_without_level_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let users = create_referral_line(&db, 2).await?;

        let result = distribute_commission(&db, &investment_event(users[1].id, "run-1")).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_event_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let level = create_test_level(&db, 1, 1000.0, 20.0, (10.0, 5.0, 2.0)).await?;
        let users = create_referral_line(&db, 2).await?;
        assign_level(&db, users[1].id, level.id).await?;

        let mut event = investment_event(users[1].id, "run-1");
        event.base_amount = -5.0;
        assert!(matches!(
            distribute_commission(&db, &event).await,
            Err(Error::InvalidAmount { .. })
        ));

        let event = investment_event(users[1].id, "  ");
        assert!(matches!(
            distribute_commission(&db, &event).await,
            Err(Error::Validation { .. })
        ));

        let missing = investment_event(999, "run-1");
        assert!(matches!(
            distribute_commission(&db, &missing).await,
            Err(Error::UserNotFound { .. })
        ));

        Ok(())
    }
}

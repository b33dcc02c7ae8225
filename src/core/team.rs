//! Team report generation.
//!
//! Summarizes a user's downline (members at levels A, B and C below them) and the
//! commission they have earned from each level. Returns structured data for the
//! HTTP layer to render.

use crate::{
    core::user::MAX_REFERRAL_DEPTH,
    entities::{
        TeamReferralHistory, User,
        team_referral_history::{self, CommissionLevel},
        user,
    },
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, prelude::*};

/// Downline size and earnings for one commission level
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamLevelSummary {
    /// Members at this depth below the user
    pub members: usize,
    /// Commission earned from this level
    pub commission_earned: f64,
}

/// A user's team report
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSummary {
    pub user_id: i64,
    pub level_a: TeamLevelSummary,
    pub level_b: TeamLevelSummary,
    pub level_c: TeamLevelSummary,
}

impl TeamSummary {
    /// Members across all three levels.
    #[must_use]
    pub const fn total_members(&self) -> usize {
        self.level_a.members + self.level_b.members + self.level_c.members
    }

    /// Commission earned across all three levels.
    #[must_use]
    pub fn total_commission(&self) -> f64 {
        self.level_a.commission_earned
            + self.level_b.commission_earned
            + self.level_c.commission_earned
    }

    const fn level_mut(&mut self, level: CommissionLevel) -> &mut TeamLevelSummary {
        match level {
            CommissionLevel::A => &mut self.level_a,
            CommissionLevel::B => &mut self.level_b,
            CommissionLevel::C => &mut self.level_c,
        }
    }
}

/// Builds the team report for `user_id`.
///
/// Members are counted breadth-first through three levels of direct referrals;
/// earnings per level come from the commission history, so they include
/// payouts for members who were later disabled.
pub async fn team_summary(db: &DatabaseConnection, user_id: i64) -> Result<TeamSummary> {
    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            user_id: user_id.to_string(),
        })?;

    let mut summary = TeamSummary {
        user_id,
        level_a: TeamLevelSummary::default(),
        level_b: TeamLevelSummary::default(),
        level_c: TeamLevelSummary::default(),
    };

    // Breadth-first, one query per depth
    let mut frontier = vec![user_id];
    for depth in 0..MAX_REFERRAL_DEPTH {
        let Some(level) = CommissionLevel::from_depth(depth) else {
            break;
        };
        if frontier.is_empty() {
            break;
        }
        let members = User::find()
            .filter(user::Column::ReferrerUserId.is_in(frontier.clone()))
            .all(db)
            .await?;
        summary.level_mut(level).members = members.len();
        frontier = members.into_iter().map(|m| m.id).collect();
    }

    let earnings = TeamReferralHistory::find()
        .filter(team_referral_history::Column::UserId.eq(user_id))
        .all(db)
        .await?;
    for payout in earnings {
        summary.level_mut(payout.level).commission_earned += payout.amount;
    }

    Ok(summary)
}

/// Commission payouts received by `user_id`, newest first.
pub async fn get_commission_history(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<team_referral_history::Model>> {
    TeamReferralHistory::find()
        .filter(team_referral_history::Column::UserId.eq(user_id))
        .order_by_desc(team_referral_history::Column::CreatedAt)
        .order_by_desc(team_referral_history::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::investment::purchase_level;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_team_summary_counts_three_levels() -> Result<()> {
        let db = setup_test_db().await?;
        let root = create_test_user(&db, "root", None).await?;
        let a1 = create_test_user(&db, "a1", Some(&root)).await?;
        let a2 = create_test_user(&db, "a2", Some(&root)).await?;
        let b1 = create_test_user(&db, "b1", Some(&a1)).await?;
        create_test_user(&db, "b2", Some(&a2)).await?;
        let c1 = create_test_user(&db, "c1", Some(&b1)).await?;
        // Fourth level is outside the team
        create_test_user(&db, "d1", Some(&c1)).await?;

        let summary = team_summary(&db, root.id).await?;

        assert_eq!(summary.level_a.members, 2);
        assert_eq!(summary.level_b.members, 2);
        assert_eq!(summary.level_c.members, 1);
        assert_eq!(summary.total_members(), 5);
        assert_eq!(summary.total_commission(), 0.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_team_summary_commission_per_level() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_level(&db, 1, 1000.0, 25.0, (10.0, 5.0, 2.0)).await?;
        let root = create_test_user(&db, "root", None).await?;
        let child = create_funded_user(&db, "child", Some(&root), 1000.0).await?;
        let grandchild = create_funded_user(&db, "grandchild", Some(&child), 1000.0).await?;

        purchase_level(&db, child.id, 1).await?;
        purchase_level(&db, grandchild.id, 1).await?;

        let summary = team_summary(&db, root.id).await?;
        assert_eq!(summary.level_a.commission_earned, 100.0);
        assert_eq!(summary.level_b.commission_earned, 50.0);
        assert_eq!(summary.level_c.commission_earned, 0.0);
        assert_eq!(summary.total_commission(), 150.0);

        let history = get_commission_history(&db, root.id).await?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].referred_user_id, grandchild.id);

        Ok(())
    }

    #[tokio::test]
    async fn test_team_summary_unknown_user() -> Result<()> {
        let db = setup_test_db().await?;
        let result = team_summary(&db, 404).await;
        assert!(matches!(result, Err(Error::UserNotFound { .. })));
        Ok(())
    }
}

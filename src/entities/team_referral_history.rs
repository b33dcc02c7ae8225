//! Team referral history entity - One row per commission payout.
//!
//! Rows are append-only. `referral_chain` is a snapshot of the upline that was
//! traversed when the payout was made, stored as comma-separated user ids
//! (level A first).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Position of the beneficiary in the investor's upline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum CommissionLevel {
    /// Direct referrer
    #[sea_orm(string_value = "A")]
    A,
    /// Referrer's referrer
    #[sea_orm(string_value = "B")]
    B,
    /// Third upline level
    #[sea_orm(string_value = "C")]
    C,
}

impl CommissionLevel {
    /// Maps a zero-based distance from the investor's direct referrer to a level.
    #[must_use]
    pub const fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::C),
            _ => None,
        }
    }

    /// Commission rate (percent) this level earns under `level`.
    #[must_use]
    pub fn rate(self, level: &super::level::Model) -> f64 {
        match self {
            Self::A => level.a_level_commission_rate,
            Self::B => level.b_level_commission_rate,
            Self::C => level.c_level_commission_rate,
        }
    }
}

/// Event that caused a commission payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ReferralTransactionType {
    #[sea_orm(string_value = "signup_bonus")]
    SignupBonus,
    #[sea_orm(string_value = "investment_commission")]
    InvestmentCommission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ReferralStatus {
    #[sea_orm(string_value = "completed")]
    Completed,
}

/// Team referral history database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "team_referral_histories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Upline member receiving the commission
    pub user_id: i64,
    /// Investor whose event triggered the payout
    pub referred_user_id: i64,
    /// Investor's direct referrer
    pub referrer_user_id: i64,
    pub level: CommissionLevel,
    pub amount: f64,
    pub transaction_type: ReferralTransactionType,
    pub status: ReferralStatus,
    /// Idempotency key of the distribution run
    pub run_key: String,
    /// Ledger transaction that credited the beneficiary
    pub transaction_id: i64,
    /// Comma-separated upline ids at payout time, level A first
    pub referral_chain: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

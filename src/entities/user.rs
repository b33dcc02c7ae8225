//! User entity - Platform members with a wallet balance and a referrer pointer.
//!
//! The referral tree is stored as a single `referrer_user_id` pointer per user;
//! the A/B/C chain is resolved by walking those pointers upward. `balance` is
//! only ever changed by the ledger (see `core::ledger`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login name, unique across the platform
    #[sea_orm(unique)]
    pub username: String,
    /// Code other users enter at signup to name this user as their referrer
    #[sea_orm(unique)]
    pub referral_code: String,
    /// Direct referrer (chain level A), None for root users
    pub referrer_user_id: Option<i64>,
    /// Investment level currently held, None until the first purchase
    pub level_id: Option<i64>,
    /// Current wallet balance
    pub balance: f64,
    /// Balance the account was opened with; the ledger explains everything above it
    pub initial_balance: f64,
    /// Disabled accounts are skipped by the accrual job
    pub is_active: bool,
    /// When the user signed up
    pub created_at: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One user has many ledger transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
    /// One user has many daily income records
    #[sea_orm(has_many = "super::daily_income::Entity")]
    DailyIncomes,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::daily_income::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DailyIncomes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

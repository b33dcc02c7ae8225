//! Reward history entity - One row per user per scheduled reward run.
//!
//! `(user_id, run_key)` is unique, so a retried run cannot credit twice.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Reward history database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reward_histories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    /// Identifies the reward run (e.g. `"weekly-2024-06"`)
    pub run_key: String,
    pub amount: f64,
    /// Ledger transaction that carried the credit
    pub transaction_id: i64,
    pub description: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

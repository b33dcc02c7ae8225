//! Daily income entity - One accrual attempt per user per calendar day.
//!
//! The `(user_id, income_date)` pair is unique, which is what makes the accrual
//! job safe to re-run. A FAILED row is kept as an audit trail of the attempt.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Accrual state of a daily income record
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum DailyIncomeStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "CREDITED")]
    Credited,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

/// Daily income database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "daily_incomes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User being credited
    pub user_id: i64,
    /// Level the income was computed from
    pub level_id: i64,
    /// Calendar day the income belongs to
    pub income_date: Date,
    /// Amount credited (the level's daily income at accrual time)
    pub amount: f64,
    pub status: DailyIncomeStatus,
    /// Ledger transaction that carried the credit, once CREDITED
    pub transaction_id: Option<i64>,
    /// Last failure message, kept for FAILED rows
    pub failure_reason: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

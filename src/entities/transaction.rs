//! Transaction entity - The balance-affecting ledger of the platform.
//!
//! `amount` is always the positive magnitude; the sign comes from
//! [`TransactionType::direction`]. Once a row is `SUCCESS` it carries the
//! balance snapshot taken in the same database transaction that moved the
//! balance, so `balance_after = balance_before + direction * amount`.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of balance movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TransactionType {
    /// Wallet top-up, approved by an admin
    #[sea_orm(string_value = "RECHARGE")]
    Recharge,
    /// Payout to the user, approved by an admin
    #[sea_orm(string_value = "WITHDRAWAL")]
    Withdrawal,
    /// Purchase of an investment level
    #[sea_orm(string_value = "LEVEL_PURCHASE")]
    LevelPurchase,
    /// Daily income accrued from the held level
    #[sea_orm(string_value = "DAILY_INCOME")]
    DailyIncome,
    /// Commission credited to an upline member
    #[sea_orm(string_value = "REFERRAL_COMMISSION")]
    ReferralCommission,
    /// Scheduled reward run credit
    #[sea_orm(string_value = "REWARD")]
    Reward,
}

impl TransactionType {
    /// Sign applied to `amount` when the transaction succeeds.
    #[must_use]
    pub const fn direction(self) -> f64 {
        match self {
            Self::Withdrawal | Self::LevelPurchase => -1.0,
            Self::Recharge | Self::DailyIncome | Self::ReferralCommission | Self::Reward => 1.0,
        }
    }

    /// Signed balance delta for `amount`.
    #[must_use]
    pub fn signed(self, amount: f64) -> f64 {
        self.direction() * amount
    }
}

/// Settlement state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "SUCCESS")]
    Success,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the balance this transaction moves
    pub user_id: i64,
    /// Positive magnitude of the movement
    pub amount: f64,
    /// Kind of movement, which also fixes its sign
    pub transaction_type: TransactionType,
    /// PENDING until settled; SUCCESS rows are immutable
    pub status: TransactionStatus,
    /// Balance right before the movement was applied
    pub balance_before: Option<f64>,
    /// Balance right after the movement was applied
    pub balance_after: Option<f64>,
    /// Human-readable description
    pub description: String,
    /// Payment channel named by the user (opaque to the ledger)
    pub payment_method: Option<String>,
    /// Path or URL of an uploaded payment proof (opaque to the ledger)
    pub proof_url: Option<String>,
    /// When the transaction was created
    pub created_at: DateTimeUtc,
    /// When the transaction left PENDING
    pub settled_at: Option<DateTimeUtc>,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one user
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

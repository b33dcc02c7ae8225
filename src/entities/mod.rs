//! Entity module - Contains all SeaORM entity definitions for the ledger store.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod daily_income;
pub mod job_run;
pub mod level;
pub mod reward_history;
pub mod team_referral_history;
pub mod transaction;
pub mod user;

// Re-export specific types to avoid conflicts
pub use daily_income::{
    Column as DailyIncomeColumn, Entity as DailyIncome, Model as DailyIncomeModel,
};
pub use job_run::{Column as JobRunColumn, Entity as JobRun, Model as JobRunModel};
pub use level::{Column as LevelColumn, Entity as Level, Model as LevelModel};
pub use reward_history::{
    Column as RewardHistoryColumn, Entity as RewardHistory, Model as RewardHistoryModel,
};
pub use team_referral_history::{
    Column as TeamReferralHistoryColumn, Entity as TeamReferralHistory,
    Model as TeamReferralHistoryModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};

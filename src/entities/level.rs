//! Level entity - Investment tiers configured by an admin.
//!
//! A level fixes the purchase price, the daily income paid to holders, and the
//! commission rates (in percent) paid up the buyer's referral chain.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Level database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "levels")]
pub struct Model {
    /// Unique identifier for the level
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Public level number (1, 2, 3, ...)
    #[sea_orm(unique)]
    pub level_number: i32,
    /// Price paid to hold this level
    pub investment_amount: f64,
    /// Amount credited to holders once per calendar day
    pub daily_income: f64,
    /// Percent of the investment paid to the direct referrer
    pub a_level_commission_rate: f64,
    /// Percent paid to the referrer's referrer
    pub b_level_commission_rate: f64,
    /// Percent paid to the third upline level
    pub c_level_commission_rate: f64,
    /// Inactive levels cannot be bought and accrue nothing
    pub is_active: bool,
    /// Display order in listings
    pub order: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

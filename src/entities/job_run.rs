//! Job run entity - Last completed day of each scheduled job.
//!
//! One row per job name. The daily income accrual reads it to decide whether
//! today still has to run, and only writes it after a complete run.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Job name, e.g. `"daily_income_accrual"`
    #[sea_orm(unique)]
    pub job: String,
    /// Latest calendar day the job finished with nothing left to retry
    pub last_completed_date: Date,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

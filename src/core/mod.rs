//! Core business logic - framework-agnostic ledger, commission, accrual and
//! settlement operations. The HTTP layer calls into these functions.

/// Daily income accrual job
pub mod accrual;
/// Referral commission engine
pub mod commission;
/// Level purchase
pub mod investment;
/// Balance postings and ledger queries
pub mod ledger;
/// Investment level configuration
pub mod level;
/// Keyed reward runs
pub mod reward;
/// Recharge and withdrawal requests and settlement
pub mod settlement;
/// Team (downline) reports
pub mod team;
/// Signup and referral chain resolution
pub mod user;

//! Database access layer for bib-server
//!
//! Schema creation lives in `bib_common::db`; these modules hold the queries.
//! Operations that must act atomically (invite responses, budget debits) run
//! as a conditional write inside a single transaction, so SQLite's write lock
//! serializes concurrent callers on the same row.

pub mod budget;
pub mod groups;
pub mod invites;
pub mod sessions;
pub mod users;

pub use budget::{budget_status, consume_budget, BudgetGuard, BudgetStatus};
pub use groups::{Group, Member, MemberRole};
pub use invites::{Invite, InviteDecision, InviteStatus};
pub use sessions::IssuedSession;
pub use users::User;

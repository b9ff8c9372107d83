//! HTTP API handlers for bib-server

pub mod analytics;
pub mod auth;
pub mod budget;
pub mod buildinfo;
pub mod catalog;
pub mod extract;
pub mod groups;
pub mod health;
pub mod invites;
pub mod sessions;

pub use analytics::record_event;
pub use auth::{service_auth_middleware, session_middleware, Caller};
pub use budget::{budget_status, consume_budget};
pub use buildinfo::get_build_info;
pub use catalog::proxy_catalog;
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use groups::{create_group, leave_group, list_groups, list_members};
pub use health::health_routes;
pub use invites::{cancel_invite, create_invite, list_invites, respond_to_invite};
pub use sessions::{issue_session, revoke_session};

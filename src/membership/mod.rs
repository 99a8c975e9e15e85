//! Registration, invite codes and account lookups.

mod account_endpoints;
mod core;
mod register_endpoint;

pub use account_endpoints::{get_current_account, get_membership_status};
pub use core::resolve_family_member;
pub use register_endpoint::{join_endpoint, register_endpoint};

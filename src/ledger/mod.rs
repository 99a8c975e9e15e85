//! The family ledger: balances computed from transactions and savings goals.

mod aggregation;
mod summary_endpoint;

pub use aggregation::{FamilySummary, summarize};
pub use summary_endpoint::get_family_summary;

//! Savings goals: named per-family targets and the progress made towards them.

mod core;
mod endpoints;

pub use core::{
    GoalSort, GoalStatus, SavingsGoal, create_savings_goal_table, get_savings_goals,
};
pub use endpoints::{create_savings_goal_endpoint, get_savings_goals_endpoint};

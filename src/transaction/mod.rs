//! Transactions: the incomes, expenses and non-financial contributions that
//! make up a family's ledger.
//!
//! This module contains:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - Database functions for storing and listing transactions
//! - Route handlers for recording and listing transactions

mod core;
mod create_endpoint;

pub use core::{
    FundSource, Transaction, TransactionType, create_transaction_table,
    get_transactions_for_family,
};
pub use create_endpoint::{create_transaction_endpoint, get_transactions_endpoint};

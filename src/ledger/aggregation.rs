//! Aggregates a family's transactions and savings goals into running balances.

use serde::Serialize;

use crate::{
    Error,
    database_id::AccountId,
    money::{Money, as_number},
    savings_goal::SavingsGoal,
    transaction::{FundSource, Transaction, TransactionType},
};

/// The three balances shown to a family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilySummary {
    /// The family's shared balance, including non-financial contributions.
    #[serde(serialize_with = "as_number::serialize")]
    pub family_balance: Money,
    /// The caller's own balance from their private transactions.
    #[serde(serialize_with = "as_number::serialize")]
    pub my_private_balance: Money,
    /// The sum of the current amounts of the family's savings goals.
    #[serde(serialize_with = "as_number::serialize")]
    pub total_savings: Money,
}

/// Computes the balances for `caller` from the family's `transactions` and `goals`.
///
/// Each transaction is classified by the first matching rule:
/// 1. Non-financial contributions credit the shared balance, whatever the fund source.
/// 2. Family funds: income credits and expenses debit the shared balance.
/// 3. Private funds recorded by `caller`: income credits and expenses debit the
///    private balance. Other members' private transactions are ignored.
/// 4. Savings funds are not accumulated here.
///
/// Total savings is taken from the goals, not from savings transactions.
///
/// # Errors
/// Returns [Error::AmountOverflow] if a total does not fit in [Money].
pub fn summarize(
    transactions: &[Transaction],
    goals: &[SavingsGoal],
    caller: AccountId,
) -> Result<FamilySummary, Error> {
    let mut summary = FamilySummary::default();

    for transaction in transactions {
        match (transaction.transaction_type, transaction.fund_source) {
            (TransactionType::NonFinancial, _) => {
                summary.family_balance = add(summary.family_balance, transaction.amount)?
            }
            (_, FundSource::Family) => {
                summary.family_balance = add(summary.family_balance, transaction.signed_amount())?
            }
            (_, FundSource::Private) if transaction.user_id == caller => {
                summary.my_private_balance =
                    add(summary.my_private_balance, transaction.signed_amount())?
            }
            (_, FundSource::Private) | (_, FundSource::Savings) => {}
        }
    }

    summary.total_savings = goals
        .iter()
        .try_fold(Money::ZERO, |total, goal| add(total, goal.current_amount))?;

    Ok(summary)
}

fn add(total: Money, amount: Money) -> Result<Money, Error> {
    total.checked_add(amount).ok_or(Error::AmountOverflow)
}

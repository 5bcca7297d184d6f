//! Expense ledger (append-only, event-sourced) and the balance calculator
//! that reads it.
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod balance;
pub mod expense;

pub use balance::{balance_sheet, net_balance};
pub use expense::{
    AGGREGATE_TYPE, AddExpense, Amount, Expense, ExpenseAdded, ExpenseId, ExpenseInfo,
    ExpenseLedger, LedgerCommand, LedgerEvent,
};

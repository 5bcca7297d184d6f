//! Settlement notarization.
//!
//! Records that an off-ledger payment happened between two identities. It
//! never touches the expense ledger or the directory, so balances are
//! unaffected by settlements.

pub mod notary;

pub use notary::{AGGREGATE_TYPE, DebtSettled, Notary, NotaryCommand, NotaryEvent, Settle};

//! `--share IDENTITY:PAID:OWED` arguments of `add-expense`.

use core::str::FromStr;

use splitledger_core::Identity;
use splitledger_infra::NewExpense;
use splitledger_ledger::Amount;

/// One participant's line in an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    pub identity: Identity,
    pub paid: Amount,
    pub owed: Amount,
}

impl FromStr for Share {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(identity), Some(paid), Some(owed), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected IDENTITY:PAID:OWED, got '{s}'"));
        };

        let identity = identity.trim().parse::<Identity>().map_err(|e| e.to_string())?;
        let paid = paid
            .trim()
            .parse::<Amount>()
            .map_err(|e| format!("paid amount '{paid}': {e}"))?;
        let owed = owed
            .trim()
            .parse::<Amount>()
            .map_err(|e| format!("owed amount '{owed}': {e}"))?;

        Ok(Self {
            identity,
            paid,
            owed,
        })
    }
}

/// Unzip shares into the parallel lists the book expects.
pub fn into_new_expense(label: String, shares: &[Share]) -> NewExpense {
    NewExpense {
        label,
        participants: shares.iter().map(|s| s.identity).collect(),
        paid: shares.iter().map(|s| s.paid).collect(),
        owed: shares.iter().map(|s| s.owed).collect(),
    }
}

//! Net balances derived from the ledger.
//!
//! Balances are never stored. Every call scans the full ledger, so a balance
//! can't drift from the expenses it is computed from.

use splitledger_core::Identity;

use crate::expense::ExpenseLedger;

/// Sum over every expense of `paid[who] - owed[who]`.
///
/// Positive: `who` is owed money. Negative: `who` owes money. Zero for an
/// identity that never took part in an expense, registered or not.
pub fn net_balance(ledger: &ExpenseLedger, who: &Identity) -> i128 {
    ledger
        .expenses()
        .iter()
        .map(|e| i128::from(e.paid_by(who)) - i128::from(e.owed_by(who)))
        .sum()
}

/// Net balance of each identity in `people`, in the order given.
pub fn balance_sheet<'a>(
    ledger: &ExpenseLedger,
    people: impl IntoIterator<Item = &'a Identity>,
) -> Vec<(Identity, i128)> {
    people
        .into_iter()
        .map(|who| (*who, net_balance(ledger, who)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::{AddExpense, Amount, LedgerCommand};
    use chrono::Utc;
    use proptest::prelude::*;
    use splitledger_core::BookId;
    use splitledger_events::execute;

    fn record(ledger: &mut ExpenseLedger, participants: Vec<Identity>, paid: Vec<Amount>, owed: Vec<Amount>) {
        let cmd = LedgerCommand::AddExpense(AddExpense {
            label: "shared".to_string(),
            participants,
            paid,
            owed,
            occurred_at: Utc::now(),
        });
        execute(ledger, &cmd).unwrap();
    }

    #[test]
    fn lunch_example_balances() {
        let mut ledger = ExpenseLedger::empty(BookId::new());
        let (a, b, c) = (Identity::new(), Identity::new(), Identity::new());
        record(&mut ledger, vec![a, b], vec![100, 0], vec![0, 100]);

        assert_eq!(net_balance(&ledger, &a), 100);
        assert_eq!(net_balance(&ledger, &b), -100);
        assert_eq!(net_balance(&ledger, &c), 0);
    }

    #[test]
    fn balances_accumulate_across_expenses() {
        let mut ledger = ExpenseLedger::empty(BookId::new());
        let (a, b) = (Identity::new(), Identity::new());
        record(&mut ledger, vec![a, b], vec![90, 0], vec![45, 45]);
        record(&mut ledger, vec![a, b], vec![0, 30], vec![15, 15]);

        assert_eq!(balance_sheet(&ledger, [&a, &b]), vec![(a, 30), (b, -30)]);
    }

    #[test]
    fn empty_ledger_is_all_zero() {
        let ledger = ExpenseLedger::empty(BookId::new());
        assert_eq!(net_balance(&ledger, &Identity::new()), 0);
    }

    proptest! {
        /// Property: when every expense is fully split (paid total equals owed
        /// total), the net balances of all participants sum to zero.
        #[test]
        fn fully_split_expenses_net_to_zero(
            splits in prop::collection::vec((1u64..10_000, 0usize..4, 1usize..5), 1..15)
        ) {
            let people: Vec<Identity> = (0..4).map(|_| Identity::new()).collect();
            let mut ledger = ExpenseLedger::empty(BookId::new());

            for (per_head, payer, heads) in splits {
                let participants: Vec<Identity> = people.iter().copied().take(heads).collect();
                let payer = payer % heads;
                let paid: Vec<Amount> = (0..heads)
                    .map(|i| if i == payer { per_head * heads as u64 } else { 0 })
                    .collect();
                let owed = vec![per_head; heads];
                record(&mut ledger, participants, paid, owed);
            }

            let total: i128 = balance_sheet(&ledger, &people).iter().map(|(_, b)| b).sum();
            prop_assert_eq!(total, 0);
        }
    }
}

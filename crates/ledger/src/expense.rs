use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitledger_core::{Aggregate, AggregateRoot, BookId, DomainError, DomainResult, Entity, Identity};
use splitledger_events::Event;

/// Stream name of the ledger within a book.
pub const AGGREGATE_TYPE: &str = "ledger.expenses";

/// Amount in the smallest currency unit (e.g. cents).
pub type Amount = u64;

/// Sequential expense identifier: 0, 1, 2, ... in creation order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(pub u64);

impl core::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One shared cost, frozen at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    id: ExpenseId,
    label: String,
    created_at: DateTime<Utc>,
    /// As supplied, duplicates included.
    participants: Vec<Identity>,
    paid: HashMap<Identity, Amount>,
    owed: HashMap<Identity, Amount>,
}

impl Expense {
    pub fn expense_id(&self) -> ExpenseId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn participants(&self) -> &[Identity] {
        &self.participants
    }

    /// Zero when `who` did not take part.
    pub fn paid_by(&self, who: &Identity) -> Amount {
        self.paid.get(who).copied().unwrap_or(0)
    }

    /// Zero when `who` did not take part.
    pub fn owed_by(&self, who: &Identity) -> Amount {
        self.owed.get(who).copied().unwrap_or(0)
    }

    pub fn info(&self) -> ExpenseInfo {
        ExpenseInfo {
            id: self.id,
            label: self.label.clone(),
            created_at: self.created_at,
        }
    }
}

impl Entity for Expense {
    type Id = ExpenseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Header of an expense: `(id, label, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseInfo {
    pub id: ExpenseId,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate root: ExpenseLedger (append-only list of expenses).
///
/// Note: the ledger holds no balances; see [`crate::balance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseLedger {
    id: BookId,
    expenses: Vec<Expense>,
    version: u64,
}

impl ExpenseLedger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: BookId) -> Self {
        Self {
            id,
            expenses: Vec::new(),
            version: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.expenses.len() as u64
    }

    /// Id the next accepted expense will receive.
    pub fn next_id(&self) -> ExpenseId {
        ExpenseId(self.count())
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    /// Full record of an expense.
    pub fn record(&self, id: ExpenseId) -> DomainResult<&Expense> {
        usize::try_from(id.0)
            .ok()
            .and_then(|idx| self.expenses.get(idx))
            .ok_or_else(|| DomainError::out_of_range(id.0, self.count()))
    }

    pub fn expense(&self, id: ExpenseId) -> DomainResult<ExpenseInfo> {
        self.record(id).map(Expense::info)
    }

    pub fn participants(&self, id: ExpenseId) -> DomainResult<&[Identity]> {
        self.record(id).map(Expense::participants)
    }

    pub fn amount_paid(&self, id: ExpenseId, who: &Identity) -> DomainResult<Amount> {
        Ok(self.record(id)?.paid_by(who))
    }

    pub fn amount_owed(&self, id: ExpenseId, who: &Identity) -> DomainResult<Amount> {
        Ok(self.record(id)?.owed_by(who))
    }

    pub fn last_label(&self) -> DomainResult<&str> {
        self.expenses
            .last()
            .map(Expense::label)
            .ok_or_else(|| DomainError::not_found("no expenses recorded"))
    }
}

impl AggregateRoot for ExpenseLedger {
    type Id = BookId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddExpense.
///
/// `participants`, `paid` and `owed` are parallel lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddExpense {
    pub label: String,
    pub participants: Vec<Identity>,
    pub paid: Vec<Amount>,
    pub owed: Vec<Amount>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    AddExpense(AddExpense),
}

/// Event: ExpenseAdded.
///
/// Carries the complete record so the ledger can be rebuilt from its stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseAdded {
    pub expense_id: ExpenseId,
    pub label: String,
    pub participants: Vec<Identity>,
    pub paid: Vec<Amount>,
    pub owed: Vec<Amount>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    ExpenseAdded(ExpenseAdded),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::ExpenseAdded(_) => "ledger.expense.added",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::ExpenseAdded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ExpenseLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::ExpenseAdded(e) => {
                // Later entries for a repeated identity overwrite earlier ones.
                let paid = e.participants.iter().copied().zip(e.paid.iter().copied()).collect();
                let owed = e.participants.iter().copied().zip(e.owed.iter().copied()).collect();

                self.expenses.push(Expense {
                    id: e.expense_id,
                    label: e.label.clone(),
                    created_at: e.occurred_at,
                    participants: e.participants.clone(),
                    paid,
                    owed,
                });
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::AddExpense(cmd) => self.handle_add(cmd),
        }
    }

    fn check_replay(&self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            LedgerEvent::ExpenseAdded(e) => {
                if e.expense_id != self.next_id() {
                    return Err(DomainError::invariant(format!(
                        "expense id {} out of order (expected {})",
                        e.expense_id,
                        self.next_id()
                    )));
                }
                if e.paid.len() != e.participants.len() || e.owed.len() != e.participants.len() {
                    return Err(DomainError::invariant(format!(
                        "expense {} length mismatch (participants: {}, paid: {}, owed: {})",
                        e.expense_id,
                        e.participants.len(),
                        e.paid.len(),
                        e.owed.len()
                    )));
                }
                Ok(())
            }
        }
    }
}

impl ExpenseLedger {
    fn handle_add(&self, cmd: &AddExpense) -> Result<Vec<LedgerEvent>, DomainError> {
        if cmd.label.trim().is_empty() {
            return Err(DomainError::validation("label cannot be empty"));
        }
        if cmd.participants.is_empty() {
            return Err(DomainError::validation("expense must have participants"));
        }
        if cmd.paid.len() != cmd.participants.len() || cmd.owed.len() != cmd.participants.len() {
            return Err(DomainError::validation(format!(
                "length mismatch (participants: {}, paid: {}, owed: {})",
                cmd.participants.len(),
                cmd.paid.len(),
                cmd.owed.len()
            )));
        }
        if let Some(pos) = cmd.participants.iter().position(Identity::is_null) {
            return Err(DomainError::validation(format!(
                "participant at index {pos} is the null identity"
            )));
        }

        Ok(vec![LedgerEvent::ExpenseAdded(ExpenseAdded {
            expense_id: self.next_id(),
            label: cmd.label.clone(),
            participants: cmd.participants.clone(),
            paid: cmd.paid.clone(),
            owed: cmd.owed.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use splitledger_events::execute;

    fn test_ledger() -> ExpenseLedger {
        ExpenseLedger::empty(BookId::new())
    }

    fn add(label: &str, participants: Vec<Identity>, paid: Vec<Amount>, owed: Vec<Amount>) -> LedgerCommand {
        LedgerCommand::AddExpense(AddExpense {
            label: label.to_string(),
            participants,
            paid,
            owed,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn add_expense_emits_event_with_next_id() {
        let ledger = test_ledger();
        let (a, b) = (Identity::new(), Identity::new());

        let events = ledger.handle(&add("lunch", vec![a, b], vec![100, 0], vec![0, 100])).unwrap();
        assert_eq!(events.len(), 1);
        let LedgerEvent::ExpenseAdded(e) = &events[0];
        assert_eq!(e.expense_id, ExpenseId(0));
        assert_eq!(e.label, "lunch");
        assert_eq!(e.participants, vec![a, b]);
    }

    #[test]
    fn amounts_are_recorded_per_participant() {
        let mut ledger = test_ledger();
        let (a, b) = (Identity::new(), Identity::new());

        execute(&mut ledger, &add("lunch", vec![a, b], vec![100, 0], vec![0, 100])).unwrap();

        let id = ExpenseId(0);
        assert_eq!(ledger.count(), 1);
        assert_eq!(ledger.amount_paid(id, &a).unwrap(), 100);
        assert_eq!(ledger.amount_owed(id, &b).unwrap(), 100);
        assert_eq!(ledger.amount_paid(id, &b).unwrap(), 0);
        assert_eq!(ledger.amount_owed(id, &Identity::new()).unwrap(), 0);
        assert_eq!(ledger.last_label().unwrap(), "lunch");
    }

    #[test]
    fn length_mismatch_is_rejected_without_effect() {
        let mut ledger = test_ledger();
        let (a, b) = (Identity::new(), Identity::new());

        let err = execute(&mut ledger, &add("taxi", vec![a, b], vec![100], vec![0, 100])).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("length mismatch") => {}
            other => panic!("Expected length mismatch, got {other:?}"),
        }
        assert_eq!(ledger.count(), 0);
        assert_eq!(ledger.version(), 0);
    }

    #[test]
    fn empty_label_and_empty_participants_are_rejected() {
        let ledger = test_ledger();
        let a = Identity::new();

        assert!(matches!(
            ledger.handle(&add("", vec![a], vec![1], vec![1])),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            ledger.handle(&add("dinner", vec![], vec![], vec![])),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn null_participant_is_rejected() {
        let ledger = test_ledger();
        let err = ledger
            .handle(&add("dinner", vec![Identity::new(), Identity::NULL], vec![5, 0], vec![0, 5]))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("index 1")),
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_participant_keeps_last_amounts() {
        let mut ledger = test_ledger();
        let (a, b) = (Identity::new(), Identity::new());

        execute(&mut ledger, &add("snacks", vec![a, b, a], vec![10, 0, 30], vec![1, 5, 2])).unwrap();

        let id = ExpenseId(0);
        assert_eq!(ledger.participants(id).unwrap(), &[a, b, a]);
        assert_eq!(ledger.amount_paid(id, &a).unwrap(), 30);
        assert_eq!(ledger.amount_owed(id, &a).unwrap(), 2);
    }

    #[test]
    fn queries_past_the_end_are_out_of_range() {
        let mut ledger = test_ledger();
        let a = Identity::new();
        execute(&mut ledger, &add("coffee", vec![a], vec![3], vec![3])).unwrap();

        let missing = ExpenseId(1);
        assert_eq!(ledger.expense(missing).unwrap_err(), DomainError::out_of_range(1, 1));
        assert!(ledger.participants(missing).is_err());
        assert!(ledger.amount_paid(missing, &a).is_err());
        assert!(ledger.amount_owed(missing, &a).is_err());
    }

    #[test]
    fn last_label_requires_an_expense() {
        assert!(matches!(test_ledger().last_label(), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn participants_keep_supplied_order() {
        let mut ledger = test_ledger();
        let people: Vec<Identity> = (0..5).map(|_| Identity::new()).collect();
        let zeros = vec![0; people.len()];

        execute(&mut ledger, &add("rent", people.clone(), zeros.clone(), zeros)).unwrap();
        assert_eq!(ledger.participants(ExpenseId(0)).unwrap(), people.as_slice());
    }

    #[test]
    fn expense_added_round_trips_through_json() {
        let a = Identity::new();
        let event = LedgerEvent::ExpenseAdded(ExpenseAdded {
            expense_id: ExpenseId(4),
            label: "train".to_string(),
            participants: vec![a],
            paid: vec![12],
            owed: vec![12],
            occurred_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn expense_record_reads_back_from_json() {
        let mut ledger = test_ledger();
        let (a, b) = (Identity::new(), Identity::new());
        execute(&mut ledger, &add("rent", vec![a, b], vec![800, 0], vec![400, 400])).unwrap();

        let record = ledger.record(ExpenseId(0)).unwrap();
        let json = serde_json::to_string(record).unwrap();
        let back: Expense = serde_json::from_str(&json).unwrap();

        assert_eq!(&back, record);
        assert_eq!(back.expense_id(), ExpenseId(0));
        assert_eq!(back.owed_by(&b), 400);
    }

    #[test]
    fn replay_rejects_out_of_order_or_ragged_records() {
        let mut ledger = test_ledger();
        let a = Identity::new();
        let stored = |id: u64, paid: Vec<Amount>| {
            LedgerEvent::ExpenseAdded(ExpenseAdded {
                expense_id: ExpenseId(id),
                label: "tea".to_string(),
                participants: vec![a],
                paid,
                owed: vec![2],
                occurred_at: Utc::now(),
            })
        };

        match ledger.check_replay(&stored(9, vec![2])) {
            Err(DomainError::InvariantViolation(msg)) => assert!(msg.contains("out of order")),
            other => panic!("expected invariant violation, got {other:?}"),
        }
        match ledger.check_replay(&stored(0, vec![])) {
            Err(DomainError::InvariantViolation(msg)) => assert!(msg.contains("length mismatch")),
            other => panic!("expected invariant violation, got {other:?}"),
        }

        let good = stored(0, vec![2]);
        ledger.check_replay(&good).unwrap();
        ledger.apply(&good);
        assert!(ledger.check_replay(&stored(0, vec![2])).is_err());
        ledger.check_replay(&stored(1, vec![2])).unwrap();
    }

    proptest! {
        /// Property: every accepted expense gets the next dense id, and
        /// committed records never change afterwards.
        #[test]
        fn ids_are_dense_and_records_frozen(
            sizes in prop::collection::vec(1usize..5, 1..20)
        ) {
            let mut ledger = test_ledger();
            let mut snapshots: Vec<(ExpenseInfo, Vec<Identity>)> = Vec::new();

            for (n, size) in sizes.into_iter().enumerate() {
                let people: Vec<Identity> = (0..size).map(|_| Identity::new()).collect();
                let amounts: Vec<Amount> = (0..size as u64).collect();
                let events = execute(
                    &mut ledger,
                    &add(&format!("expense {n}"), people.clone(), amounts.clone(), amounts),
                ).unwrap();
                let LedgerEvent::ExpenseAdded(e) = &events[0];
                prop_assert_eq!(e.expense_id, ExpenseId(n as u64));

                snapshots.push((ledger.expense(e.expense_id).unwrap(), people));
            }

            prop_assert_eq!(ledger.count(), snapshots.len() as u64);
            for (info, people) in &snapshots {
                prop_assert_eq!(&ledger.expense(info.id).unwrap(), info);
                prop_assert_eq!(ledger.participants(info.id).unwrap(), people.as_slice());
            }
        }
    }
}

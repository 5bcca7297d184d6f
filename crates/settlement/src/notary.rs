use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitledger_core::{Aggregate, AggregateRoot, BookId, DomainError, Identity};
use splitledger_events::Event;

/// Stream name of the notary within a book.
pub const AGGREGATE_TYPE: &str = "settlement.notary";

/// Aggregate root: Notary.
///
/// Holds no balances and moves no value; its only state is how many
/// settlements it has notarized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notary {
    id: BookId,
    version: u64,
}

impl Notary {
    pub fn empty(id: BookId) -> Self {
        Self { id, version: 0 }
    }

    pub fn settlements_recorded(&self) -> u64 {
        self.version
    }
}

impl AggregateRoot for Notary {
    type Id = BookId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: Settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settle {
    pub from: Identity,
    pub to: Identity,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotaryCommand {
    Settle(Settle),
}

/// Event: DebtSettled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSettled {
    pub from: Identity,
    pub to: Identity,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotaryEvent {
    DebtSettled(DebtSettled),
}

impl Event for NotaryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            NotaryEvent::DebtSettled(_) => "settlement.debt.settled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            NotaryEvent::DebtSettled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Notary {
    type Command = NotaryCommand;
    type Event = NotaryEvent;
    type Error = DomainError;

    fn apply(&mut self, _event: &Self::Event) {
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            NotaryCommand::Settle(cmd) => {
                if cmd.to.is_null() {
                    return Err(DomainError::validation("recipient cannot be the null identity"));
                }
                if cmd.to == cmd.from {
                    return Err(DomainError::validation("cannot settle with yourself"));
                }

                Ok(vec![NotaryEvent::DebtSettled(DebtSettled {
                    from: cmd.from,
                    to: cmd.to,
                    amount: cmd.amount,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(from: Identity, to: Identity, amount: u64) -> NotaryCommand {
        NotaryCommand::Settle(Settle {
            from,
            to,
            amount,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn settle_emits_debt_settled() {
        let notary = Notary::empty(BookId::new());
        let (a, b) = (Identity::new(), Identity::new());

        let events = notary.handle(&settle(a, b, 250)).unwrap();
        match &events[..] {
            [NotaryEvent::DebtSettled(e)] => {
                assert_eq!((e.from, e.to, e.amount), (a, b, 250));
            }
            _ => panic!("Expected a single DebtSettled event"),
        }
    }

    #[test]
    fn settle_rejects_null_recipient() {
        let notary = Notary::empty(BookId::new());
        let err = notary.handle(&settle(Identity::new(), Identity::NULL, 1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn settle_rejects_self_recipient() {
        let notary = Notary::empty(BookId::new());
        let a = Identity::new();
        let err = notary.handle(&settle(a, a, 1)).unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("yourself")),
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn applied_settlements_are_counted() {
        let mut notary = Notary::empty(BookId::new());
        let (a, b) = (Identity::new(), Identity::new());
        for ev in notary.handle(&settle(a, b, 10)).unwrap() {
            notary.apply(&ev);
        }
        assert_eq!(notary.settlements_recorded(), 1);
    }
}

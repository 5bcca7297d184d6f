//! Book service: the single-writer façade over the directory, the expense
//! ledger and the settlement notary.
//!
//! Every write runs under one `RwLock` write guard:
//!
//! ```text
//! command
//!   ↓ handle (validate, decide events; nothing mutated yet)
//!   ↓ append to the event store (expected version = aggregate version)
//!   ↓ apply to the in-memory aggregate
//!   ↓ publish envelopes on the bus (failures are logged, never rolled back)
//! ```
//!
//! A rejected command or a failed append leaves state untouched. Readers take
//! the read guard and only ever see fully committed state.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use splitledger_core::{Aggregate, BookId, DomainError, ExpectedVersion, Identity};
use splitledger_events::{Event, EventBus, EventEnvelope, ProjectionError, ProjectionRunner, Subscription};
use splitledger_ledger::{
    AddExpense, Amount, Expense, ExpenseId, ExpenseInfo, ExpenseLedger, LedgerCommand, LedgerEvent,
};
use splitledger_registry::{Directory, DirectoryCommand, Profile, RegisterPerson, UpdateName};
use splitledger_settlement::{Notary, NotaryCommand, Settle};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::projections::AuditTrail;

#[derive(Debug, Error)]
pub enum BookError {
    /// The operation was rejected by domain validation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persisting or loading events failed.
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// A stored stream could not be replayed into its aggregate.
    #[error("failed to replay stream '{stream}': {reason}")]
    Replay { stream: String, reason: String },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("book state lock poisoned")]
    Poisoned,
}

pub type BookResult<T> = Result<T, BookError>;

/// Input of [`Book::add_expense`]: parallel participant / paid / owed lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub label: String,
    pub participants: Vec<Identity>,
    pub paid: Vec<Amount>,
    pub owed: Vec<Amount>,
}

#[derive(Debug, Clone)]
struct BookState {
    directory: Directory,
    ledger: ExpenseLedger,
    notary: Notary,
}

/// One shared-expense group.
#[derive(Debug)]
pub struct Book<S, B> {
    book_id: BookId,
    store: S,
    bus: B,
    state: RwLock<BookState>,
}

impl<S, B> Book<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Open a book, rebuilding every aggregate from its stream in `store`.
    pub fn open(book_id: BookId, store: S, bus: B) -> BookResult<Self> {
        let mut directory = Directory::empty(book_id);
        let mut ledger = ExpenseLedger::empty(book_id);
        let mut notary = Notary::empty(book_id);

        catch_up(&store, book_id, splitledger_registry::AGGREGATE_TYPE, &mut directory)?;
        catch_up(&store, book_id, splitledger_ledger::AGGREGATE_TYPE, &mut ledger)?;
        catch_up(&store, book_id, splitledger_settlement::AGGREGATE_TYPE, &mut notary)?;

        tracing::info!(
            book = %book_id,
            people = directory.count(),
            expenses = ledger.count(),
            settlements = notary.settlements_recorded(),
            "book opened"
        );

        Ok(Self {
            book_id,
            store,
            bus,
            state: RwLock::new(BookState {
                directory,
                ledger,
                notary,
            }),
        })
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    /// Subscribe to envelopes of events committed from now on.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.bus.subscribe()
    }

    // ---- identity registry -------------------------------------------------

    /// Register `caller` under `name`. Emits `PersonRegistered`.
    pub fn register(&self, caller: Identity, name: impl Into<String>) -> BookResult<()> {
        let mut state = self.write()?;
        let cmd = DirectoryCommand::RegisterPerson(RegisterPerson {
            identity: caller,
            name: name.into(),
            occurred_at: Utc::now(),
        });
        self.commit(&mut state.directory, splitledger_registry::AGGREGATE_TYPE, &cmd)?;
        Ok(())
    }

    /// Change the display name of `caller`. Emits `PersonUpdated`.
    pub fn update_name(&self, caller: Identity, name: impl Into<String>) -> BookResult<()> {
        let mut state = self.write()?;
        let cmd = DirectoryCommand::UpdateName(UpdateName {
            identity: caller,
            name: name.into(),
            occurred_at: Utc::now(),
        });
        self.commit(&mut state.directory, splitledger_registry::AGGREGATE_TYPE, &cmd)?;
        Ok(())
    }

    pub fn is_registered(&self, identity: &Identity) -> BookResult<bool> {
        Ok(self.read()?.directory.is_registered(identity))
    }

    /// Name of the caller's own identity; fails when not registered.
    pub fn who_am_i(&self, caller: &Identity) -> BookResult<String> {
        Ok(self.read()?.directory.name(caller)?.to_string())
    }

    /// Profile of any identity; the zero-valued profile when unknown.
    pub fn profile(&self, identity: &Identity) -> BookResult<Profile> {
        Ok(self.read()?.directory.profile(identity))
    }

    pub fn total_registered(&self) -> BookResult<usize> {
        Ok(self.read()?.directory.count())
    }

    /// Everyone registered, in registration order.
    pub fn list_all_people(&self) -> BookResult<Vec<Identity>> {
        Ok(self.read()?.directory.list_all().to_vec())
    }

    // ---- expense ledger ----------------------------------------------------

    /// Record an expense. Emits `ExpenseAdded` and returns the new id.
    pub fn add_expense(&self, expense: NewExpense) -> BookResult<ExpenseId> {
        let mut state = self.write()?;
        let cmd = LedgerCommand::AddExpense(AddExpense {
            label: expense.label,
            participants: expense.participants,
            paid: expense.paid,
            owed: expense.owed,
            occurred_at: Utc::now(),
        });
        let events = self.commit(&mut state.ledger, splitledger_ledger::AGGREGATE_TYPE, &cmd)?;

        let [LedgerEvent::ExpenseAdded(added)] = events.as_slice() else {
            return Err(DomainError::invariant("add expense must emit exactly one event").into());
        };
        Ok(added.expense_id)
    }

    pub fn expense_count(&self) -> BookResult<u64> {
        Ok(self.read()?.ledger.count())
    }

    pub fn last_expense_label(&self) -> BookResult<String> {
        Ok(self.read()?.ledger.last_label()?.to_string())
    }

    pub fn expense_info(&self, id: ExpenseId) -> BookResult<ExpenseInfo> {
        Ok(self.read()?.ledger.expense(id)?)
    }

    /// Complete immutable record of an expense.
    pub fn expense_record(&self, id: ExpenseId) -> BookResult<Expense> {
        Ok(self.read()?.ledger.record(id)?.clone())
    }

    pub fn participants(&self, id: ExpenseId) -> BookResult<Vec<Identity>> {
        Ok(self.read()?.ledger.participants(id)?.to_vec())
    }

    pub fn amount_paid(&self, id: ExpenseId, who: &Identity) -> BookResult<Amount> {
        Ok(self.read()?.ledger.amount_paid(id, who)?)
    }

    pub fn amount_owed(&self, id: ExpenseId, who: &Identity) -> BookResult<Amount> {
        Ok(self.read()?.ledger.amount_owed(id, who)?)
    }

    // ---- balances ----------------------------------------------------------

    /// Net balance of `who`, recomputed from the whole ledger.
    pub fn net_balance(&self, who: &Identity) -> BookResult<i128> {
        Ok(splitledger_ledger::net_balance(&self.read()?.ledger, who))
    }

    /// Net balance of every registered person, in registration order.
    pub fn balances(&self) -> BookResult<Vec<(Identity, i128)>> {
        let state = self.read()?;
        Ok(splitledger_ledger::balance_sheet(
            &state.ledger,
            state.directory.list_all(),
        ))
    }

    // ---- settlement --------------------------------------------------------

    /// Notarize that `caller` paid `amount` to `to` outside the ledger.
    /// Emits `DebtSettled`; balances are not affected.
    pub fn settle(&self, caller: Identity, to: Identity, amount: Amount) -> BookResult<()> {
        let mut state = self.write()?;
        let cmd = NotaryCommand::Settle(Settle {
            from: caller,
            to,
            amount,
            occurred_at: Utc::now(),
        });
        self.commit(&mut state.notary, splitledger_settlement::AGGREGATE_TYPE, &cmd)?;
        Ok(())
    }

    pub fn settlements_recorded(&self) -> BookResult<u64> {
        Ok(self.read()?.notary.settlements_recorded())
    }

    // ---- audit -------------------------------------------------------------

    /// Rebuild the audit trail of this book from the event store.
    pub fn audit_trail(&self) -> BookResult<AuditTrail> {
        // Hold the read guard so no write lands between stream loads.
        let _state = self.read()?;
        let streams = [
            splitledger_registry::AGGREGATE_TYPE,
            splitledger_ledger::AGGREGATE_TYPE,
            splitledger_settlement::AGGREGATE_TYPE,
        ]
        .into_iter()
        .map(|stream| self.store.load_stream(self.book_id, stream))
        .collect::<Result<Vec<_>, _>>()?;

        let envelopes: Vec<_> = interleave(streams).iter().map(StoredEvent::to_envelope).collect();
        Ok(ProjectionRunner::rebuild_from_scratch(
            self.book_id,
            AuditTrail::new,
            &envelopes,
        )?)
    }

    // ---- internals ---------------------------------------------------------

    fn read(&self) -> BookResult<RwLockReadGuard<'_, BookState>> {
        self.state.read().map_err(|_| BookError::Poisoned)
    }

    fn write(&self) -> BookResult<RwLockWriteGuard<'_, BookState>> {
        self.state.write().map_err(|_| BookError::Poisoned)
    }

    /// Decide, persist, apply, publish. Caller must hold the write guard.
    ///
    /// When the store reports that the stream moved on (another process
    /// appended to the same book), the aggregate catches up from the store
    /// and the command is decided again.
    fn commit<A>(
        &self,
        aggregate: &mut A,
        aggregate_type: &str,
        command: &A::Command,
    ) -> BookResult<Vec<A::Event>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 1;
        loop {
            let decided = aggregate.handle(command).inspect_err(|err| {
                tracing::debug!(book = %self.book_id, stream = aggregate_type, error = %err, "command rejected");
            })?;
            if decided.is_empty() {
                return Ok(decided);
            }

            let uncommitted = decided
                .iter()
                .map(|ev| UncommittedEvent::from_typed(self.book_id, aggregate_type, Uuid::now_v7(), ev))
                .collect::<Result<Vec<_>, _>>()?;

            let committed = match self
                .store
                .append(uncommitted, ExpectedVersion::Exact(aggregate.version()))
            {
                Ok(committed) => committed,
                Err(EventStoreError::Concurrency(reason)) if attempt < MAX_APPEND_ATTEMPTS => {
                    let caught_up = catch_up(&self.store, self.book_id, aggregate_type, aggregate)?;
                    tracing::debug!(
                        book = %self.book_id,
                        stream = aggregate_type,
                        attempt,
                        caught_up,
                        %reason,
                        "stream moved on; deciding again"
                    );
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            for ev in &decided {
                aggregate.apply(ev);
            }

            for stored in &committed {
                tracing::info!(
                    book = %self.book_id,
                    stream = aggregate_type,
                    sequence = stored.sequence_number,
                    event_type = %stored.event_type,
                    "event committed"
                );
                if let Err(err) = self.bus.publish(stored.to_envelope()) {
                    tracing::warn!(event_id = %stored.event_id, error = ?err, "failed to publish committed event");
                }
            }

            return Ok(decided);
        }
    }
}

const MAX_APPEND_ATTEMPTS: usize = 3;

/// Apply the part of a stream that `aggregate` has not seen yet.
///
/// The stream must be gapless, belong to `book_id`, and every event must pass
/// the aggregate's replay check. Returns the number of events applied.
fn catch_up<S, A>(
    store: &S,
    book_id: BookId,
    aggregate_type: &str,
    aggregate: &mut A,
) -> BookResult<usize>
where
    S: EventStore,
    A: Aggregate<Error = DomainError>,
    A::Event: DeserializeOwned,
{
    let history = store.load_stream(book_id, aggregate_type)?;
    let fail = |reason: String| BookError::Replay {
        stream: aggregate_type.to_string(),
        reason,
    };

    let seen = aggregate.version();
    if (history.len() as u64) < seen {
        return Err(fail(format!(
            "stream holds {} events but {seen} were already applied",
            history.len()
        )));
    }

    let mut applied = 0;
    for stored in history.into_iter().skip(seen as usize) {
        let expected_seq = aggregate.version() + 1;
        if stored.book_id != book_id {
            return Err(fail(format!(
                "sequence {expected_seq} belongs to book {}",
                stored.book_id
            )));
        }
        if stored.sequence_number != expected_seq {
            return Err(fail(format!(
                "expected sequence_number {expected_seq}, found {}",
                stored.sequence_number
            )));
        }
        let event: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| fail(format!("sequence {expected_seq}: {e}")))?;
        aggregate
            .check_replay(&event)
            .map_err(|e| fail(format!("sequence {expected_seq}: {e}")))?;
        aggregate.apply(&event);
        applied += 1;
    }

    Ok(applied)
}

/// Merge streams into one sequence in commit order, keeping each stream's
/// own order intact.
///
/// Event ids are UUIDv7, so they order by creation time with a monotonic
/// counter inside the same millisecond; `occurred_at` only breaks ties.
fn interleave(streams: Vec<Vec<StoredEvent>>) -> Vec<StoredEvent> {
    let total = streams.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = streams.into_iter().map(|s| s.into_iter().peekable()).collect();
    let mut merged = Vec::with_capacity(total);

    loop {
        let next = iters
            .iter_mut()
            .enumerate()
            .filter_map(|(i, it)| it.peek().map(|e| (i, (e.event_id, e.occurred_at))))
            .min_by_key(|(_, key)| *key)
            .map(|(i, _)| i);

        match next.and_then(|i| iters[i].next()) {
            Some(event) => merged.push(event),
            None => break,
        }
    }

    merged
}

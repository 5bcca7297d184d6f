//! Projection runner (read model builder).
//!
//! Read models are **disposable**; events are the source of truth.
//! The runner replays envelopes deterministically and tracks one cursor per
//! stream, since sequence numbers are only monotonic within a stream.

use std::collections::HashMap;

use thiserror::Error;

use splitledger_core::BookId;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress for a single stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCursor {
    aggregate_type: String,
    last_sequence_number: u64,
}

impl StreamCursor {
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("book mismatch (expected {expected}, found {found})")]
    BookMismatch { expected: BookId, found: BookId },

    #[error("non-monotonic sequence in stream '{stream}' (last={last}, found={found})")]
    NonMonotonicSequence { stream: String, last: u64, found: u64 },
}

/// Runs envelopes through a projection and tracks progress per stream.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    book_id: Option<BookId>,
    cursors: HashMap<String, u64>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            book_id: None,
            cursors: HashMap::new(),
        }
    }

    /// Create a runner pinned to a specific book.
    ///
    /// Envelopes from any other book are rejected, including the first one.
    pub fn new_for_book(book_id: BookId, projection: P) -> Self {
        Self {
            projection,
            book_id: Some(book_id),
            cursors: HashMap::new(),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    pub fn book_id(&self) -> Option<BookId> {
        self.book_id
    }

    /// Cursor for one stream, if any envelope of that stream was applied.
    pub fn cursor(&self, aggregate_type: &str) -> Option<StreamCursor> {
        self.cursors.get(aggregate_type).map(|&last| StreamCursor {
            aggregate_type: aggregate_type.to_string(),
            last_sequence_number: last,
        })
    }

    /// Apply a single envelope, enforcing book consistency and monotonic
    /// sequencing within its stream.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Payload>) -> Result<(), ProjectionError> {
        let found_book = envelope.book_id();
        match self.book_id {
            Some(expected) if expected != found_book => {
                return Err(ProjectionError::BookMismatch {
                    expected,
                    found: found_book,
                });
            }
            Some(_) => {}
            None => self.book_id = Some(found_book),
        }

        let stream = envelope.aggregate_type();
        let found = envelope.sequence_number();
        let last = self.cursors.get(stream).copied().unwrap_or(0);
        if found <= last {
            return Err(ProjectionError::NonMonotonicSequence {
                stream: stream.to_string(),
                last,
                found,
            });
        }

        self.projection.apply(envelope);
        self.cursors.insert(stream.to_string(), found);
        Ok(())
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Payload>>,
    ) -> Result<(), ProjectionError>
    where
        P::Payload: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection of one book from scratch by replaying its full
    /// event history.
    pub fn rebuild_from_scratch<'a>(
        book_id: BookId,
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Payload>>,
    ) -> Result<P, ProjectionError>
    where
        P::Payload: 'a,
    {
        let mut runner = ProjectionRunner::new_for_book(book_id, factory());
        runner.run(envelopes)?;
        Ok(runner.projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[derive(Debug, Default)]
    struct Seen(Vec<(String, u64)>);

    impl Projection for Seen {
        type Payload = ();

        fn apply(&mut self, envelope: &EventEnvelope<()>) {
            self.0
                .push((envelope.aggregate_type().to_string(), envelope.sequence_number()));
        }
    }

    fn env(book: BookId, stream: &str, seq: u64) -> EventEnvelope<()> {
        EventEnvelope::new(Uuid::now_v7(), book, stream, "test.event", seq, ())
    }

    #[test]
    fn streams_are_sequenced_independently() {
        let book = BookId::new();
        let mut runner = ProjectionRunner::new(Seen::default());

        runner.apply(&env(book, "a", 1)).unwrap();
        runner.apply(&env(book, "b", 1)).unwrap();
        runner.apply(&env(book, "a", 2)).unwrap();

        assert_eq!(runner.cursor("a").unwrap().last_sequence_number(), 2);
        assert_eq!(runner.cursor("b").unwrap().last_sequence_number(), 1);
        assert_eq!(runner.projection().0.len(), 3);
    }

    #[test]
    fn replayed_envelope_is_rejected() {
        let book = BookId::new();
        let mut runner = ProjectionRunner::new(Seen::default());
        runner.apply(&env(book, "a", 1)).unwrap();

        let err = runner.apply(&env(book, "a", 1)).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::NonMonotonicSequence {
                stream: "a".to_string(),
                last: 1,
                found: 1
            }
        );
        assert_eq!(runner.projection().0.len(), 1);
    }

    #[test]
    fn pinned_runner_rejects_foreign_book() {
        let mine = BookId::new();
        let other = BookId::new();
        let mut runner = ProjectionRunner::new_for_book(mine, Seen::default());

        let err = runner.apply(&env(other, "a", 1)).unwrap_err();
        assert!(matches!(err, ProjectionError::BookMismatch { .. }));
        assert!(runner.cursor("a").is_none());
    }

    #[test]
    fn rebuild_replays_history_of_one_book() {
        let book = BookId::new();
        let history = vec![env(book, "a", 1), env(book, "b", 1), env(book, "a", 2)];

        let rebuilt = ProjectionRunner::rebuild_from_scratch(book, Seen::default, &history).unwrap();
        assert_eq!(rebuilt.0.len(), 3);

        let mut foreign = history.clone();
        foreign.push(env(BookId::new(), "a", 3));
        assert!(matches!(
            ProjectionRunner::rebuild_from_scratch(book, Seen::default, &foreign),
            Err(ProjectionError::BookMismatch { .. })
        ));
    }
}

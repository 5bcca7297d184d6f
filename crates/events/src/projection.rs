use crate::EventEnvelope;

/// A projection builds a read model from an append-only event stream.
///
/// Read models are disposable: they can be dropped and rebuilt by replaying
/// the store. `apply` must be idempotent; the [`ProjectionRunner`] additionally
/// skips nothing silently and rejects out-of-order envelopes.
///
/// [`ProjectionRunner`]: crate::ProjectionRunner
pub trait Projection {
    type Payload;

    /// Apply a single envelope to the projection, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Payload>);
}

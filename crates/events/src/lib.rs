//! Domain events and the machinery that moves them around.
//!
//! - [`Event`]: the trait every domain event implements
//! - [`EventEnvelope`]: book + stream metadata wrapped around a payload
//! - [`EventBus`] / [`InMemoryEventBus`]: outward notification channel
//! - [`Projection`] / [`ProjectionRunner`]: read models built from envelopes

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionError, ProjectionRunner, StreamCursor};

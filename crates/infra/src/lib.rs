//! Infrastructure layer: event stores, configuration, projections and the
//! `Book` service that ties the domain crates together.

pub mod book;
pub mod config;
pub mod event_store;
pub mod projections;


pub use book::{Book, BookError, BookResult, NewExpense};
pub use config::{BookConfig, ConfigError};

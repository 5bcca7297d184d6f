//! Identity registry (event-sourced).
//!
//! Maps participant identities to display names and remembers the order in
//! which identities first registered. Pure domain logic: no IO, no storage.

pub mod directory;

pub use directory::{
    AGGREGATE_TYPE, Directory, DirectoryCommand, DirectoryEvent, Person, PersonRegistered,
    PersonUpdated, Profile, RegisterPerson, UpdateName,
};

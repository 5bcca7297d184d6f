use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitledger_core::{Aggregate, AggregateRoot, BookId, DomainError, DomainResult, Entity, Identity};
use splitledger_events::Event;

/// Stream name of the directory within a book.
pub const AGGREGATE_TYPE: &str = "registry.directory";

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    identity: Identity,
    name: String,
}

impl Person {
    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Entity for Person {
    type Id = Identity;

    fn id(&self) -> &Self::Id {
        &self.identity
    }
}

/// Public profile of an identity.
///
/// `Profile::default()` (empty name, null identity) is what lookups of an
/// unknown identity return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub identity: Identity,
}

/// Aggregate root: the directory of everyone registered in a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    id: BookId,
    people: HashMap<Identity, Person>,
    /// First-registration order; never reordered.
    order: Vec<Identity>,
    version: u64,
}

impl Directory {
    /// Empty aggregate for rehydration.
    pub fn empty(id: BookId) -> Self {
        Self {
            id,
            people: HashMap::new(),
            order: Vec::new(),
            version: 0,
        }
    }

    pub fn is_registered(&self, identity: &Identity) -> bool {
        self.people.contains_key(identity)
    }

    pub fn person(&self, identity: &Identity) -> Option<&Person> {
        self.people.get(identity)
    }

    /// Display name of a registered identity.
    pub fn name(&self, identity: &Identity) -> DomainResult<&str> {
        self.person(identity)
            .map(Person::name)
            .ok_or_else(|| DomainError::not_found(format!("identity {identity} is not registered")))
    }

    /// Profile of `identity`, or the zero-valued profile when unknown.
    pub fn profile(&self, identity: &Identity) -> Profile {
        self.people
            .get(identity)
            .map(|p| Profile {
                name: p.name.clone(),
                identity: p.identity,
            })
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }

    /// Registered identities in first-registration order.
    pub fn list_all(&self) -> &[Identity] {
        &self.order
    }
}

impl AggregateRoot for Directory {
    type Id = BookId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterPerson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPerson {
    pub identity: Identity,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateName.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateName {
    pub identity: Identity,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryCommand {
    RegisterPerson(RegisterPerson),
    UpdateName(UpdateName),
}

/// Event: PersonRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRegistered {
    pub identity: Identity,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PersonUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonUpdated {
    pub identity: Identity,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryEvent {
    PersonRegistered(PersonRegistered),
    PersonUpdated(PersonUpdated),
}

impl Event for DirectoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DirectoryEvent::PersonRegistered(_) => "registry.person.registered",
            DirectoryEvent::PersonUpdated(_) => "registry.person.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DirectoryEvent::PersonRegistered(e) => e.occurred_at,
            DirectoryEvent::PersonUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Directory {
    type Command = DirectoryCommand;
    type Event = DirectoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DirectoryEvent::PersonRegistered(e) => {
                let person = Person {
                    identity: e.identity,
                    name: e.name.clone(),
                };
                if self.people.insert(e.identity, person).is_none() {
                    self.order.push(e.identity);
                }
            }
            DirectoryEvent::PersonUpdated(e) => {
                if let Some(person) = self.people.get_mut(&e.identity) {
                    person.name = e.name.clone();
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DirectoryCommand::RegisterPerson(cmd) => self.handle_register(cmd),
            DirectoryCommand::UpdateName(cmd) => self.handle_update(cmd),
        }
    }

    fn check_replay(&self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            DirectoryEvent::PersonRegistered(e) if self.is_registered(&e.identity) => Err(
                DomainError::invariant(format!("identity {} registered twice", e.identity)),
            ),
            DirectoryEvent::PersonUpdated(e) if !self.is_registered(&e.identity) => Err(
                DomainError::invariant(format!("identity {} renamed before registering", e.identity)),
            ),
            _ => Ok(()),
        }
    }
}

impl Directory {
    fn handle_register(&self, cmd: &RegisterPerson) -> Result<Vec<DirectoryEvent>, DomainError> {
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.identity.is_null() {
            return Err(DomainError::validation("identity cannot be null"));
        }
        if self.is_registered(&cmd.identity) {
            return Err(DomainError::conflict(format!(
                "identity {} is already registered",
                cmd.identity
            )));
        }

        Ok(vec![DirectoryEvent::PersonRegistered(PersonRegistered {
            identity: cmd.identity,
            name: cmd.name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateName) -> Result<Vec<DirectoryEvent>, DomainError> {
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if !self.is_registered(&cmd.identity) {
            return Err(DomainError::not_found(format!(
                "identity {} is not registered",
                cmd.identity
            )));
        }

        Ok(vec![DirectoryEvent::PersonUpdated(PersonUpdated {
            identity: cmd.identity,
            name: cmd.name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

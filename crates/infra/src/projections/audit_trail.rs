//! Audit trail projection.
//!
//! Events are the only externally observable record of what happened in a
//! book. This read model turns envelopes into one human-readable line each.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use splitledger_events::{Event, EventEnvelope, Projection};
use splitledger_ledger::LedgerEvent;
use splitledger_registry::DirectoryEvent;
use splitledger_settlement::NotaryEvent;

/// One audited event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub event_id: Uuid,
    pub stream: String,
    pub sequence_number: u64,
    pub event_type: String,
    /// `None` when the payload could not be decoded.
    pub occurred_at: Option<DateTime<Utc>>,
    pub summary: String,
}

/// Read model: ordered list of audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Projection for AuditTrail {
    type Payload = JsonValue;

    fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) {
        let (occurred_at, summary) = match describe(envelope.aggregate_type(), envelope.payload()) {
            Some((at, summary)) => (Some(at), summary),
            None => {
                tracing::warn!(
                    stream = envelope.aggregate_type(),
                    event_type = envelope.event_type(),
                    "undecodable payload in audit trail"
                );
                (None, format!("undecodable {} payload", envelope.event_type()))
            }
        };

        self.entries.push(AuditEntry {
            event_id: envelope.event_id(),
            stream: envelope.aggregate_type().to_string(),
            sequence_number: envelope.sequence_number(),
            event_type: envelope.event_type().to_string(),
            occurred_at,
            summary,
        });
    }
}

fn describe(stream: &str, payload: &JsonValue) -> Option<(DateTime<Utc>, String)> {
    match stream {
        splitledger_registry::AGGREGATE_TYPE => {
            let event: DirectoryEvent = serde_json::from_value(payload.clone()).ok()?;
            let summary = match &event {
                DirectoryEvent::PersonRegistered(e) => {
                    format!("{} registered as \"{}\"", e.identity, e.name)
                }
                DirectoryEvent::PersonUpdated(e) => {
                    format!("{} renamed to \"{}\"", e.identity, e.name)
                }
            };
            Some((event.occurred_at(), summary))
        }
        splitledger_ledger::AGGREGATE_TYPE => {
            let event: LedgerEvent = serde_json::from_value(payload.clone()).ok()?;
            let LedgerEvent::ExpenseAdded(e) = &event;
            let total: u128 = e.paid.iter().map(|&v| u128::from(v)).sum();
            let summary = format!(
                "expense #{} \"{}\" among {} participant(s), {} paid",
                e.expense_id,
                e.label,
                e.participants.len(),
                total
            );
            Some((event.occurred_at(), summary))
        }
        splitledger_settlement::AGGREGATE_TYPE => {
            let event: NotaryEvent = serde_json::from_value(payload.clone()).ok()?;
            let NotaryEvent::DebtSettled(e) = &event;
            let summary = format!("{} settled {} with {}", e.from, e.amount, e.to);
            Some((event.occurred_at(), summary))
        }
        _ => None,
    }
}

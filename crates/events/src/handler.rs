use splitledger_core::Aggregate;

/// Execute an aggregate command in place (no IO, no persistence).
///
/// 1. **Decide**: `aggregate.handle(command)` validates and returns events.
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`.
///
/// A rejected command returns the error before anything is applied, so the
/// aggregate is left exactly as it was.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}

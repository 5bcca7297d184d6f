use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use serde_json::Value as JsonValue;
use splitledger_core::{BookId, Identity};
use splitledger_events::{EventEnvelope, InMemoryEventBus};
use splitledger_infra::event_store::InMemoryEventStore;
use splitledger_infra::{Book, NewExpense};

type BenchBook = Book<InMemoryEventStore, InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn book_with_expenses(people: &[Identity], expenses: usize) -> BenchBook {
    let book = Book::open(BookId::new(), InMemoryEventStore::new(), InMemoryEventBus::new())
        .expect("open book");
    for n in 0..expenses {
        let payer = n % people.len();
        let paid = (0..people.len()).map(|i| if i == payer { 400 } else { 0 }).collect();
        book.add_expense(NewExpense {
            label: format!("expense {n}"),
            participants: people.to_vec(),
            paid,
            owed: vec![100; people.len()],
        })
        .expect("add expense");
    }
    book
}

/// Net balance is recomputed from the full ledger on every call; this shows
/// how that read cost grows with ledger length.
fn bench_net_balance(c: &mut Criterion) {
    let people: Vec<Identity> = (0..4).map(|_| Identity::new()).collect();
    let mut group = c.benchmark_group("net_balance");

    for size in [10usize, 100, 1_000, 10_000] {
        let book = book_with_expenses(&people, size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(book.net_balance(&people[0]).expect("balance")))
        });
    }

    group.finish();
}

fn bench_add_expense(c: &mut Criterion) {
    let people: Vec<Identity> = (0..4).map(|_| Identity::new()).collect();
    let book = book_with_expenses(&people, 0);

    c.bench_function("add_expense", |b| {
        b.iter(|| {
            book.add_expense(NewExpense {
                label: "coffee".to_string(),
                participants: people.clone(),
                paid: vec![40, 0, 0, 0],
                owed: vec![10; 4],
            })
            .expect("add expense")
        })
    });
}

criterion_group!(benches, bench_net_balance, bench_add_expense);
criterion_main!(benches);

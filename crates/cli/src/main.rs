use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value as JsonValue;

use splitledger_core::{BookId, Identity};
use splitledger_events::{EventEnvelope, InMemoryEventBus};
use splitledger_infra::event_store::FileEventStore;
use splitledger_infra::{Book, BookConfig};
use splitledger_ledger::{Amount, ExpenseId};
use splitledger_observability::{LogConfig, LogFormat};

mod share;

use share::Share;

type FileBook = Book<FileEventStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

#[derive(Parser, Debug)]
#[command(name = "splitledger", about = "Shared-expense book")]
#[command(version)]
struct Cli {
    /// Event log directory (overrides SPLITLEDGER_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Book to open (overrides SPLITLEDGER_BOOK_ID)
    #[arg(long, global = true)]
    book: Option<BookId>,

    /// Log output format (overrides SPLITLEDGER_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register the caller under a display name
    Register {
        #[arg(long = "as")]
        caller: Identity,
        name: String,
    },

    /// Change the caller's display name
    Rename {
        #[arg(long = "as")]
        caller: Identity,
        name: String,
    },

    /// Print the caller's display name
    Whoami {
        #[arg(long = "as")]
        caller: Identity,
    },

    /// List registered people in registration order
    People,

    /// Record a new expense
    AddExpense {
        label: String,

        /// Participant line, repeatable: IDENTITY:PAID:OWED
        #[arg(long = "share", required = true)]
        shares: Vec<Share>,
    },

    /// Show one expense, or the latest label when no id is given
    Expense { id: Option<u64> },

    /// Net balance of one identity (positive: is owed money)
    Balance { identity: Identity },

    /// Net balance of every registered person
    Balances,

    /// Record an off-ledger repayment from the caller to someone else
    Settle {
        #[arg(long = "as")]
        caller: Identity,
        to: Identity,
        amount: Amount,
    },

    /// Print every committed event in commit order
    Audit {
        /// Emit the trail as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env()?;
    if let Some(format) = cli.log_format {
        log_config.format = format.into();
    }
    splitledger_observability::init(&log_config);

    let config = resolve_config(&cli, BookConfig::from_env()?);
    let book = open_book(&config)?;

    let stdout = io::stdout();
    run(&book, cli.command, &mut stdout.lock())
}

fn resolve_config(cli: &Cli, mut config: BookConfig) -> BookConfig {
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(book) = cli.book {
        config.book_id = book;
    }
    config
}

fn open_book(config: &BookConfig) -> Result<FileBook> {
    tracing::debug!(book = %config.book_id, dir = %config.data_dir.display(), "opening book");
    let store = FileEventStore::open(&config.data_dir)
        .with_context(|| format!("opening event log at {}", config.data_dir.display()))?;
    let book = Book::open(config.book_id, store, Arc::new(InMemoryEventBus::new()))
        .with_context(|| format!("replaying book {}", config.book_id))?;
    Ok(book)
}

fn run(book: &FileBook, command: Commands, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Register { caller, name } => {
            book.register(caller, name.as_str())?;
            writeln!(out, "registered {caller} as \"{name}\"")?;
        }
        Commands::Rename { caller, name } => {
            book.update_name(caller, name.as_str())?;
            writeln!(out, "{caller} is now \"{name}\"")?;
        }
        Commands::Whoami { caller } => {
            writeln!(out, "{}", book.who_am_i(&caller)?)?;
        }
        Commands::People => {
            let people = book.list_all_people()?;
            for identity in &people {
                writeln!(out, "{identity}  {}", book.who_am_i(identity)?)?;
            }
            writeln!(out, "{} registered", people.len())?;
        }
        Commands::AddExpense { label, shares } => {
            let id = book.add_expense(share::into_new_expense(label, &shares))?;
            writeln!(out, "expense #{id}")?;
        }
        Commands::Expense { id: None } => {
            writeln!(out, "{}", book.last_expense_label()?)?;
        }
        Commands::Expense { id: Some(id) } => {
            let expense = book.expense_record(ExpenseId(id))?;
            writeln!(
                out,
                "#{} \"{}\" at {}",
                expense.expense_id(),
                expense.label(),
                expense.created_at().to_rfc3339()
            )?;
            for who in expense.participants() {
                writeln!(
                    out,
                    "  {who}  paid {}  owed {}",
                    expense.paid_by(who),
                    expense.owed_by(who)
                )?;
            }
        }
        Commands::Balance { identity } => {
            writeln!(out, "{}", book.net_balance(&identity)?)?;
        }
        Commands::Balances => {
            for (identity, balance) in book.balances()? {
                writeln!(out, "{identity}  {balance:+}")?;
            }
        }
        Commands::Settle { caller, to, amount } => {
            book.settle(caller, to, amount)?;
            writeln!(out, "recorded: {caller} settled {amount} with {to}")?;
        }
        Commands::Audit { json: true } => {
            serde_json::to_writer_pretty(&mut *out, &book.audit_trail()?)?;
            writeln!(out)?;
        }
        Commands::Audit { json: false } => {
            for entry in book.audit_trail()?.entries() {
                let at = entry
                    .occurred_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                writeln!(out, "{at}  {:<18}  {}", entry.stream, entry.summary)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_in(dir: &std::path::Path) -> FileBook {
        let config = BookConfig {
            data_dir: dir.to_path_buf(),
            book_id: BookId::new(),
        };
        open_book(&config).unwrap()
    }

    fn output(book: &FileBook, command: Commands) -> String {
        let mut buf = Vec::new();
        run(book, command, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn flags_override_environment_config() {
        let book = BookId::new();
        let cli = Cli::parse_from([
            "splitledger",
            "--data-dir",
            "/tmp/elsewhere",
            "--book",
            book.to_string().as_str(),
            "people",
        ]);

        let config = resolve_config(&cli, BookConfig::default());
        assert_eq!(config.data_dir, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(config.book_id, book);
    }

    #[test]
    fn add_expense_parses_repeated_shares() {
        let (a, b) = (Identity::new(), Identity::new());
        let cli = Cli::parse_from([
            "splitledger",
            "add-expense",
            "dinner",
            "--share",
            format!("{a}:40:20").as_str(),
            "--share",
            format!("{b}:0:20").as_str(),
        ]);

        match cli.command {
            Commands::AddExpense { label, shares } => {
                assert_eq!(label, "dinner");
                assert_eq!(shares.len(), 2);
                assert_eq!(shares[1].identity, b);
            }
            other => panic!("expected AddExpense, got {other:?}"),
        }
    }

    #[test]
    fn commands_drive_the_book() {
        let dir = tempfile::tempdir().unwrap();
        let book = book_in(dir.path());
        let (alice, bob) = (Identity::new(), Identity::new());

        output(
            &book,
            Commands::Register {
                caller: alice,
                name: "Alice".to_string(),
            },
        );
        output(
            &book,
            Commands::AddExpense {
                label: "dinner".to_string(),
                shares: vec![
                    Share {
                        identity: alice,
                        paid: 40,
                        owed: 20,
                    },
                    Share {
                        identity: bob,
                        paid: 0,
                        owed: 20,
                    },
                ],
            },
        );

        assert_eq!(output(&book, Commands::Whoami { caller: alice }), "Alice\n");
        assert_eq!(output(&book, Commands::Expense { id: None }), "dinner\n");
        assert_eq!(output(&book, Commands::Balance { identity: bob }), "-20\n");
        assert!(output(&book, Commands::Audit { json: false }).contains("registered as \"Alice\""));
    }

    #[test]
    fn domain_errors_surface_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let book = book_in(dir.path());
        let mut buf = Vec::new();

        let err = run(&book, Commands::Expense { id: Some(0) }, &mut buf).unwrap_err();
        assert_eq!(err.to_string(), "id 0 out of range (count: 0)");
        assert!(buf.is_empty());
    }
}

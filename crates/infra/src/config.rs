//! Configuration loading and representation.
//!
//! | Variable               | Meaning                           | Default              |
//! |------------------------|-----------------------------------|----------------------|
//! | `SPLITLEDGER_DATA_DIR` | root of the JSON-lines event log  | `./splitledger-data` |
//! | `SPLITLEDGER_BOOK_ID`  | UUID of the book to open          | [`DEFAULT_BOOK_ID`]  |

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use splitledger_core::BookId;

pub const DATA_DIR_VAR: &str = "SPLITLEDGER_DATA_DIR";
pub const BOOK_ID_VAR: &str = "SPLITLEDGER_BOOK_ID";

/// Book opened when none is configured.
pub const DEFAULT_BOOK_ID: Uuid = Uuid::from_u128(0x0192_6f3a_5b1c_7d2e_8f40_5b1c_0000_0001);

const DEFAULT_DATA_DIR: &str = "./splitledger-data";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid UUID: {reason}")]
    InvalidBookId { var: &'static str, reason: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookConfig {
    pub data_dir: PathBuf,
    pub book_id: BookId,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            book_id: BookId::from_uuid(DEFAULT_BOOK_ID),
        }
    }
}

impl BookConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup; unset variables keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = lookup(DATA_DIR_VAR) {
            if dir.trim().is_empty() {
                return Err(ConfigError::Empty { var: DATA_DIR_VAR });
            }
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup(BOOK_ID_VAR) {
            config.book_id = raw.trim().parse().map_err(|e| ConfigError::InvalidBookId {
                var: BOOK_ID_VAR,
                reason: format!("{e}"),
            })?;
        }

        Ok(config)
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::error::Result;
use crate::store::{EventStore, JsonlEventStore, MemoryEventStore, SqliteEventStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// One JSON event per line in an append-only log file
    Jsonl,
    /// SQLite database
    Sqlite,
    /// Nothing persisted
    Memory,
}

/// Funnel analytics service for multi-step lead forms
#[derive(Parser, Debug, Clone)]
#[command(name = "form-funnel", version)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "FORM_FUNNEL_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Event log backend
    #[arg(long, env = "FORM_FUNNEL_STORE", value_enum, default_value_t = StoreBackend::Jsonl)]
    pub store: StoreBackend,

    /// Event log file for the jsonl backend
    #[arg(long, env = "FORM_FUNNEL_LOG_PATH", default_value = "data/events.log")]
    pub log_path: PathBuf,

    /// Database file for the sqlite backend
    #[arg(long, env = "FORM_FUNNEL_DB_PATH", default_value = "data/events.db")]
    pub db_path: PathBuf,

    /// JSON export of the form builder's forms
    #[arg(long, env = "FORM_FUNNEL_FORMS_PATH", default_value = "data/forms.json")]
    pub forms_path: PathBuf,
}

impl Config {
    pub fn open_store(&self) -> Result<Arc<dyn EventStore>> {
        Ok(match self.store {
            StoreBackend::Jsonl => Arc::new(JsonlEventStore::new(&self.log_path)),
            StoreBackend::Sqlite => {
                if let Some(parent) = self.db_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Arc::new(SqliteEventStore::open(&self.db_path)?)
            }
            StoreBackend::Memory => Arc::new(MemoryEventStore::new()),
        })
    }
}

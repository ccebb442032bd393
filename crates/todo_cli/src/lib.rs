//! Shared command-line plumbing for the todo binaries.
//!
//! # Responsibility
//! - Map flags and environment variables onto [`StoreConfig`].
//! - Bootstrap core logging before any store call.

use anyhow::{anyhow, bail};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use todo_core::config::{DEFAULT_DATABASE, DEFAULT_URI};
use todo_core::{StoreConfig, TODOS_COLLECTION};

const DEFAULT_LOG_DIR_NAME: &str = "todo_store_logs";

/// Which store to talk to.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Connection string: mongodb://host:port, sqlite://<dir> or sqlite::memory:
    #[arg(long, env = "TODO_MONGODB_URI", default_value = DEFAULT_URI)]
    pub uri: String,

    /// Database name
    #[arg(long, env = "TODO_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: String,
}

impl StoreArgs {
    pub fn to_config(&self, connect_timeout: Duration) -> StoreConfig {
        StoreConfig {
            uri: self.uri.clone(),
            database: self.database.clone(),
            collection: TODOS_COLLECTION.to_string(),
            connect_timeout,
        }
    }
}

/// Fails for stores whose contents vanish when the process exits.
pub fn require_persistent_store(config: &StoreConfig) -> anyhow::Result<()> {
    if !config.location()?.is_persistent() {
        bail!(
            "`{}` is discarded when the process exits; point --uri at a persistent store",
            config.uri
        );
    }
    Ok(())
}

/// Log level and destination.
#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    /// trace|debug|info|warn|error; defaults by build mode
    #[arg(long, env = "TODO_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Directory for rolling log files; defaults to a temp subdirectory
    #[arg(long, env = "TODO_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl LogArgs {
    /// Starts file logging. Relative directories resolve against the
    /// current working directory.
    pub fn init(&self) -> anyhow::Result<()> {
        let level = self
            .log_level
            .as_deref()
            .unwrap_or_else(|| todo_core::default_log_level());
        let log_dir = self.resolved_log_dir()?;
        todo_core::init_logging(level, &log_dir).map_err(|err| anyhow!(err))
    }

    fn resolved_log_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.log_dir {
            Some(dir) if dir.is_absolute() => Ok(dir.clone()),
            Some(dir) => Ok(std::env::current_dir()?.join(dir)),
            None => Ok(std::env::temp_dir().join(DEFAULT_LOG_DIR_NAME)),
        }
    }
}

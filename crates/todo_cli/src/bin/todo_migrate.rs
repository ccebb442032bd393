//! One-shot migration: ensure the `status` index on the todos collection.

use anyhow::Context;
use clap::Parser;
use log::error;
use todo_cli::{require_persistent_store, LogArgs, StoreArgs};
use todo_core::config::MIGRATION_CONNECT_TIMEOUT;
use todo_core::{ensure_status_index, IndexOutcome, StoreClient};

#[derive(Parser)]
#[command(name = "todo_migrate")]
#[command(about = "Create the status index on the todos collection if it is missing")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    log: LogArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.log.init().context("failed to initialize logging")?;

    let config = cli.store.to_config(MIGRATION_CONNECT_TIMEOUT);
    require_persistent_store(&config)?;
    let store = StoreClient::open(&config)
        .with_context(|| format!("error connecting to database `{}`", config.database))?;

    let outcome =
        ensure_status_index(&store, &config.collection).context("error creating index");
    let closed = store.close().context("error disconnecting from store");

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("event=migration_run module=cli status=error error={err:#}");
            return Err(err);
        }
    };
    closed?;

    match outcome {
        IndexOutcome::Created(name) => println!("Created index {name}"),
        IndexOutcome::AlreadyExists(name) => println!("Index {name} already present"),
    }
    println!("Migration complete!");
    Ok(())
}

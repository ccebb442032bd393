//! CRUD walkthrough against the todo document store.
//!
//! Connects, creates one todo, lists the collection, marks the todo
//! completed, soft-deletes it, prints the listing taken before the updates
//! and exits. Any error is logged and ends the process with a non-zero code.

use anyhow::Context;
use clap::Parser;
use log::error;
use todo_cli::{LogArgs, StoreArgs};
use todo_core::config::DEFAULT_CONNECT_TIMEOUT;
use todo_core::{DocumentTodoRepository, StoreClient, Todo, TodoService};

const EXAMPLE_TEXT: &str = "Example Task";
const INITIAL_STATUS: &str = "Pending";
const FINAL_STATUS: &str = "Completed";

#[derive(Parser)]
#[command(name = "todo_cli")]
#[command(about = "Run create/list/update/soft-delete against the todos collection")]
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

    let config = cli.store.to_config(DEFAULT_CONNECT_TIMEOUT);
    let store = StoreClient::open(&config)
        .with_context(|| format!("error connecting to database `{}`", config.database))?;

    let outcome = run(&store, &config.collection);
    let closed = store.close().context("error disconnecting from store");

    let todos = match outcome {
        Ok(todos) => todos,
        Err(err) => {
            error!("event=crud_run module=cli status=error error={err:#}");
            return Err(err);
        }
    };
    closed?;

    for todo in &todos {
        println!("{todo:?}");
    }
    println!("CRUD operations completed successfully!");
    Ok(())
}

fn run(store: &StoreClient, collection: &str) -> anyhow::Result<Vec<Todo>> {
    let service = TodoService::new(DocumentTodoRepository::with_collection(store, collection));

    let id = service
        .create_todo(EXAMPLE_TEXT, INITIAL_STATUS)
        .context("error creating todo")?;
    println!("New Todo ID: {id}");

    let todos = service.list_todos().context("error retrieving todos")?;
    println!("All Todos:");
    for todo in &todos {
        println!(
            "Todo ID: {}, Todo: {}, Status: {}",
            todo.id, todo.text, todo.status
        );
    }

    let id = id.to_hex();
    service
        .update_status(&id, FINAL_STATUS)
        .context("error updating todo")?;
    service
        .soft_delete(&id)
        .context("error soft deleting todo")?;

    Ok(todos)
}

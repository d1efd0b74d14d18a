//! GestiHotel administration CLI
//!
//! Edits reference lists through the cascade engine, against the PostgreSQL store
//! configured in `gestihotel.{toml,yaml,json}` or `GESTIHOTEL__*` environment variables.

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use gestihotel_reference_lists::{
    listener, Actor, CascadeReport, DeletePolicy, ItemChanges, ListItem, ListSnapshot,
    PostgresDocumentStore, ReferenceListDocument, ReferenceListSystem,
};
use sqlx::PgPool;

use crate::config::{Config, DatabaseConfig};

#[derive(Parser)]
#[command(
    name = "gestihotel",
    about = "Manage GestiHotel reference lists",
    version,
    arg_required_else_help = true
)]
struct Cli {
    /// Actor id stamped on changes (overrides `actor.id`).
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations.
    Migrate,

    /// Create the reference list document of an establishment.
    Init {
        establishment: String,
        /// Also add the standard GestiHotel lists.
        #[arg(long, action = ArgAction::SetTrue)]
        with_defaults: bool,
    },

    /// Add the standard lists an establishment does not have yet.
    Seed { establishment: String },

    /// Print lists.
    Show {
        establishment: String,
        /// Only this list.
        #[arg(long)]
        list: Option<String>,
        /// Hide deactivated items.
        #[arg(long, action = ArgAction::SetTrue)]
        active_only: bool,
    },

    /// Add an item to a list.
    Add {
        establishment: String,
        list: String,
        value: String,
        label: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
        /// Display position (default: after the last item).
        #[arg(long)]
        order: Option<i32>,
    },

    /// Change the label or display attributes of an item.
    Rename {
        establishment: String,
        list: String,
        value: String,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        order: Option<i32>,
    },

    /// Change an item's value and rewrite every record using the old one.
    Rekey {
        establishment: String,
        list: String,
        old: String,
        new: String,
    },

    /// Hide an item from pickers (records keep resolving it).
    Deactivate {
        establishment: String,
        list: String,
        value: String,
    },

    /// Make a deactivated item selectable again.
    Activate {
        establishment: String,
        list: String,
        value: String,
    },

    /// Remove an item. Refused while records reference it unless reassigned.
    Delete {
        establishment: String,
        list: String,
        value: String,
        /// Move references to this value before deleting.
        #[arg(long)]
        reassign_to: Option<String>,
    },

    /// Set display order; name every value of the list once.
    Reorder {
        establishment: String,
        list: String,
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Replace a whole list from a JSON array of items (or "-" for stdin).
    Import {
        establishment: String,
        list: String,
        file: PathBuf,
    },

    /// Records whose value is missing from the list.
    Strays { establishment: String, list: String },

    /// Recent list changes, newest first.
    Audit {
        establishment: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print the whole document as JSON.
    Export { establishment: String },

    /// Print a list every time it changes (Ctrl-C to stop).
    Watch { establishment: String, list: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    let pool = create_db_pool(&config.database).await?;
    let store = PostgresDocumentStore::new(pool.clone());

    if let Commands::Migrate = cli.command {
        store.migrate().await.context("Failed to run migrations")?;
        tracing::info!("Migrations applied");
        return Ok(());
    }

    let actor = match cli.actor {
        Some(id) => Actor::new(id),
        None => {
            let actor = Actor::new(config.actor.id.clone());
            match &config.actor.display_name {
                Some(name) => actor.with_display_name(name.clone()),
                None => actor,
            }
        }
    };
    let system = ReferenceListSystem::new(Arc::new(store), config.reference_lists.clone());

    run(cli.command, &system, &actor, pool).await
}

async fn run(
    command: Commands,
    system: &ReferenceListSystem,
    actor: &Actor,
    pool: PgPool,
) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => Ok(()),

        Commands::Init {
            establishment,
            with_defaults,
        } => {
            let mut document = system.store.initialize(&establishment, actor).await?;
            if with_defaults {
                document = system.cascade.seed_defaults(&establishment, actor).await?;
            }
            print_document_summary(&document);
            Ok(())
        }

        Commands::Seed { establishment } => {
            let document = system.cascade.seed_defaults(&establishment, actor).await?;
            print_document_summary(&document);
            Ok(())
        }

        Commands::Show {
            establishment,
            list,
            active_only,
        } => {
            let keys: Vec<String> = match list {
                Some(key) => vec![key],
                None => system
                    .store
                    .get(&establishment)
                    .await?
                    .lists
                    .keys()
                    .map(str::to_string)
                    .collect(),
            };
            for key in keys {
                let items = if active_only {
                    system.access.get_active_list(&establishment, &key).await?
                } else {
                    system.access.get_list(&establishment, &key).await?
                };
                print_list(&key, &items);
            }
            Ok(())
        }

        Commands::Add {
            establishment,
            list,
            value,
            label,
            icon,
            color,
            order,
        } => {
            let mut item = ListItem::new(value, label);
            item.icon = icon;
            item.color = color;
            let document = system
                .cascade
                .add_item(&establishment, &list, item, order, actor)
                .await?;
            print_document_summary(&document);
            Ok(())
        }

        Commands::Rename {
            establishment,
            list,
            value,
            label,
            icon,
            color,
            order,
        } => {
            let changes = ItemChanges {
                label,
                icon,
                color,
                order,
            };
            let report = system
                .cascade
                .update_item(&establishment, &list, &value, changes, actor)
                .await?;
            print_report(&report)
        }

        Commands::Rekey {
            establishment,
            list,
            old,
            new,
        } => {
            let report = system
                .cascade
                .rekey_item(&establishment, &list, &old, &new, actor)
                .await?;
            print_report(&report)
        }

        Commands::Deactivate {
            establishment,
            list,
            value,
        } => {
            let document = system
                .cascade
                .deactivate_item(&establishment, &list, &value, actor)
                .await?;
            print_document_summary(&document);
            Ok(())
        }

        Commands::Activate {
            establishment,
            list,
            value,
        } => {
            let document = system
                .cascade
                .reactivate_item(&establishment, &list, &value, actor)
                .await?;
            print_document_summary(&document);
            Ok(())
        }

        Commands::Delete {
            establishment,
            list,
            value,
            reassign_to,
        } => {
            let policy = match reassign_to {
                Some(target) => DeletePolicy::ReassignTo(target),
                None => DeletePolicy::Refuse,
            };
            let report = system
                .cascade
                .delete_item(&establishment, &list, &value, policy, actor)
                .await?;
            print_report(&report)
        }

        Commands::Reorder {
            establishment,
            list,
            values,
        } => {
            let document = system
                .cascade
                .reorder_items(&establishment, &list, &values, actor)
                .await?;
            print_document_summary(&document);
            Ok(())
        }

        Commands::Import {
            establishment,
            list,
            file,
        } => {
            let raw = if file.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?
            };
            let items: Vec<ListItem> =
                serde_json::from_str(&raw).context("Expected a JSON array of list items")?;
            let document = system
                .cascade
                .replace_list(&establishment, &list, items, actor)
                .await?;
            print_document_summary(&document);
            Ok(())
        }

        Commands::Strays {
            establishment,
            list,
        } => {
            let strays = system
                .cascade
                .find_stray_references(&establishment, &list)
                .await?;
            println!("{}", serde_json::to_string_pretty(&strays)?);
            Ok(())
        }

        Commands::Audit {
            establishment,
            limit,
        } => {
            for entry in system.store.audit_trail(&establishment, limit).await? {
                println!(
                    "v{:<5} {}  {:<16} {:<24} {:<16} {}",
                    entry.version,
                    entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.action,
                    entry.list_key.as_deref().unwrap_or("-"),
                    entry.actor,
                    entry.details
                );
            }
            Ok(())
        }

        Commands::Export { establishment } => {
            let document = system.store.get(&establishment).await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }

        Commands::Watch {
            establishment,
            list,
        } => watch(system, pool, &establishment, &list).await,
    }
}

async fn watch(
    system: &ReferenceListSystem,
    pool: PgPool,
    establishment: &str,
    list: &str,
) -> anyhow::Result<()> {
    let listener = listener::spawn_change_listener(pool, system.access.clone());

    let subscription = system
        .access
        .subscribe(establishment, list, |snapshot: &ListSnapshot| {
            println!("--- version {}", snapshot.version);
            print_list(&snapshot.list_key, &snapshot.items);
        })
        .await?;
    tracing::info!(
        establishment_id = establishment,
        list_key = list,
        subscription = %subscription,
        "Watching for changes"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    system.access.unsubscribe(subscription);
    listener.abort();
    Ok(())
}

async fn create_db_pool(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let statement_timeout = config.statement_timeout_seconds;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .min_connections(config.pool_min_size)
        .max_connections(config.pool_max_size)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET statement_timeout = '{}s'", statement_timeout))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
        .context("Failed to connect to database")?;

    Ok(pool)
}

fn print_document_summary(document: &ReferenceListDocument) {
    let lists: Vec<String> = document
        .lists
        .keys()
        .map(|key| format!("{} ({})", key, document.lists.items(key).len()))
        .collect();
    println!(
        "{} version {} by {} at {}",
        document.establishment_id,
        document.version,
        document.modified_by,
        document.last_modified.to_rfc3339()
    );
    if !lists.is_empty() {
        println!("  {}", lists.join(", "));
    }
}

fn print_list(key: &str, items: &[ListItem]) {
    println!("{}:", key);
    for item in items {
        println!(
            "  {:>4}  {:<24} {:<32} {}{}",
            item.order,
            item.value,
            item.label,
            item.color.as_deref().unwrap_or(""),
            if item.active { "" } else { "  (inactive)" }
        );
    }
}

/// Print the report as JSON; an incomplete cascade is an error exit.
fn print_report(report: &CascadeReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if report.is_success() {
        return Ok(());
    }

    let unapplied = report.unapplied_records();
    anyhow::bail!(
        "Cascade incomplete: {} record(s) not updated, list commit {:?}",
        unapplied.len(),
        report.list_commit
    )
}

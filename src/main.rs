use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use scriptgate::approval::ApprovalEngine;
use scriptgate::audit::{LogNotifier, NoopCache, PgEditHistory, Sinks};
use scriptgate::auth::{Actor, RolePermissions};
use scriptgate::config::Config;
use scriptgate::db;
use scriptgate::errors::AppError;
use scriptgate::models::approval_request::RequestFilter;
use scriptgate::models::paging::PageRequest;
use scriptgate::store::PgStore;

#[derive(Parser)]
#[command(name = "scriptgate", version, about = "Approval workflow and version control for SQL scripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// List requests awaiting review
    Pending {
        #[arg(long)]
        script: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        per_page: i64,
    },
    /// List approved, rejected and withdrawn requests
    Completed {
        #[arg(long)]
        script: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        per_page: i64,
    },
    /// Show the transition log of one request
    History { request_id: String },
    /// List versions of a script, newest first
    Versions {
        script_id: String,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        per_page: i64,
    },
    /// Diff two versions of a script
    Compare {
        script_id: String,
        from: String,
        to: String,
    },
    /// Publish an old version's content as a new version
    Rollback {
        script_id: String,
        version: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Version counters for a script
    Stats { script_id: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::from_env()?;
    let pool = db::init_pool(&config).await?;

    if let Command::Migrate = cli.command {
        return db::run_migrations(&pool).await;
    }

    let store = Arc::new(PgStore::new(pool.clone()));
    let permissions = Arc::new(RolePermissions::with_roles(config.role_assignments()));
    let sinks = Sinks {
        edit_history: Arc::new(PgEditHistory::new(pool)),
        cache: Arc::new(NoopCache),
        notifier: Arc::new(LogNotifier),
    };
    let engine = ApprovalEngine::new(store, permissions, sinks);

    match cli.command {
        Command::Migrate => Ok(()),
        Command::Pending { script, page, per_page } => {
            let filter = RequestFilter { script_id: script, requester_id: None };
            print_json(&engine.get_pending(&filter, PageRequest::new(page, per_page)).await?)
        }
        Command::Completed { script, page, per_page } => {
            let filter = RequestFilter { script_id: script, requester_id: None };
            print_json(&engine.get_completed(&filter, PageRequest::new(page, per_page)).await?)
        }
        Command::History { request_id } => print_json(&engine.get_history(&request_id).await?),
        Command::Versions { script_id, page, per_page } => print_json(
            &engine
                .versions()
                .list_versions(&script_id, PageRequest::new(page, per_page))
                .await?,
        ),
        Command::Compare { script_id, from, to } => {
            print_json(&engine.versions().compare(&script_id, &from, &to).await?)
        }
        Command::Rollback { script_id, version, actor, email, reason } => {
            let actor = Actor::new(actor, email);
            print_json(&engine.versions().rollback(&script_id, &version, &actor, reason).await?)
        }
        Command::Stats { script_id } => {
            print_json(&engine.versions().get_statistics(&script_id).await?)
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()).await {
        log::error!("{e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

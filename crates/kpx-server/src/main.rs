use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use kpx_config::KpxConfig;
use kpx_db::dispatch::OutboxDispatcher;
use kpx_db::repos::{AuditFilter, NewUser};
use kpx_db::service::KpxService;
use kpx_server::{AppState, build_router, outbox};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands, CompanyCommands, OutboxCommands, UserCommands};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("kutplix error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => KpxConfig::load_from_file(path)?,
        None => KpxConfig::load_with_dotenv()?,
    };
    let svc = Arc::new(open_service(&config).await?);

    match cli.command {
        Commands::Serve => serve(svc, config).await,
        Commands::Company { action } => match action {
            CompanyCommands::Create { name } => print_json(&svc.create_company(&name).await?),
            CompanyCommands::List => print_json(&svc.list_companies().await?),
        },
        Commands::User { action } => match action {
            UserCommands::Create {
                email,
                role,
                company,
                name,
            } => {
                let user = svc
                    .create_user(&NewUser {
                        email,
                        full_name: name,
                        role: role.into(),
                        company_id: company,
                    })
                    .await?;
                print_json(&user)
            }
            UserCommands::Activate { id } => print_json(&svc.set_user_active(&id, true).await?),
            UserCommands::Deactivate { id } => print_json(&svc.set_user_active(&id, false).await?),
        },
        Commands::Outbox { action } => match action {
            OutboxCommands::Flush => {
                let report = OutboxDispatcher::new(config.outbox.max_attempts)
                    .deliver_pending(&svc, &*svc, config.outbox.batch_size)
                    .await?;
                println!(
                    "delivered {}, retrying {}, failed {}, deferred {}",
                    report.delivered, report.retried, report.failed, report.deferred
                );
                Ok(())
            }
            OutboxCommands::Show { grid_id } => {
                print_json(&svc.outbox_events_for_grid(&grid_id).await?)
            }
        },
        Commands::Audit {
            entity_id,
            actor,
            limit,
        } => {
            let filter = AuditFilter {
                entity_id,
                actor_id: actor,
                limit: Some(config.general.clamp_limit(limit)),
                ..Default::default()
            };
            print_json(&svc.query_audit(&filter).await?)
        }
    }
}

async fn open_service(config: &KpxConfig) -> anyhow::Result<KpxService> {
    let db = &config.database;
    let svc = if db.is_remote() {
        KpxService::new_remote(&db.url, &db.auth_token)
            .await
            .with_context(|| format!("failed to connect to {}", db.url))?
    } else {
        KpxService::new_local(&db.path)
            .await
            .with_context(|| format!("failed to open database at {}", db.path))?
    };
    Ok(svc)
}

async fn serve(svc: Arc<KpxService>, config: KpxConfig) -> anyhow::Result<()> {
    let addr = config.server.socket_addr()?;

    if config.outbox.enabled {
        tokio::spawn(outbox::run_dispatcher(
            Arc::clone(&svc),
            config.outbox.clone(),
        ));
    } else {
        tracing::warn!("outbox dispatcher disabled; notifications will queue");
    }

    let app = build_router(AppState::new(svc, config));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "kutplix listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_env("KUTPLIX_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize tracing: {e}"))
}

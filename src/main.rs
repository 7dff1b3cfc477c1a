//! # News Rank
//!
//! Collects the daily "most viewed" article rankings that each newspaper
//! publishes on Naver, stores them in SQLite, and serves them over HTTP.
//!
//! ## Usage
//!
//! ```sh
//! JWT_SECRET_KEY=change-me news_rank --sections 001,020,023 serve
//! news_rank --sections 001,020 scrape
//! news_rank add-user --username admin --password s3cret --role 1
//! ```
//!
//! ## Architecture
//!
//! The `serve` command runs three things side by side:
//! 1. **Scheduler**: queues a pipeline run once a day at the configured time
//! 2. **Worker**: scrapes every section (stage 1), then bulk-inserts the
//!    normalized articles (stage 2)
//! 3. **API**: ranking queries, search, article CRUD and token login

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod auth;
mod cli;
mod config;
mod error;
mod models;
mod normalize;
mod pipeline;
mod schedule;
mod scrapers;
mod storage;
mod utils;

use api::AppState;
use auth::hash_password;
use cli::{AddUserArgs, Cli, Command, ServeArgs};
use config::ScrapeConfig;
use pipeline::{news_pipeline, spawn_worker};
use storage::ArticleStore;
use utils::ensure_sqlite_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_rank starting up");

    let args = Cli::parse();
    debug!(database_url = %args.database_url, sections = ?args.scrape.sections, "Parsed CLI arguments");

    let scrape_config = args.scrape.to_config()?;
    if scrape_config.sections.is_empty() {
        warn!("No sections configured; pipeline runs will store nothing");
    }

    ensure_sqlite_dir(&args.database_url).await?;
    let store = ArticleStore::connect(&args.database_url).await?;

    match args.command {
        Command::Serve(serve_args) => serve(serve_args, scrape_config, store).await?,
        Command::Scrape => scrape_now(&scrape_config, store).await?,
        Command::AddUser(user_args) => add_user(user_args, &store).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

#[instrument(level = "info", skip_all, fields(bind = %args.bind))]
async fn serve(args: ServeArgs, scrape: ScrapeConfig, store: ArticleStore) -> Result<(), Box<dyn Error>> {
    let schedule = args.schedule(&scrape)?;
    let pipeline = Arc::new(news_pipeline(&scrape, store.clone())?);
    let (queue, worker) = spawn_worker(pipeline);
    let mut scheduler = schedule::start_daily(&schedule, queue)
        .await
        .map_err(|e| format!("scheduler failed to start: {e:?}"))?;

    let state = AppState {
        store,
        auth: Arc::new(args.auth()),
        rank_limit: args.rank_limit.max(1),
        day_offset: scrape.day_offset,
        time_zone: scrape.time_zone,
    };
    let listener = TcpListener::bind(&args.bind).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for ctrl-c");
        }
        info!("Shutdown signal received");
    };
    let served = api::serve(listener, state, shutdown).await;

    if let Err(e) = scheduler.shutdown().await {
        warn!(error = ?e, "Scheduler did not shut down cleanly");
    }
    if let Err(e) = worker.stop().await {
        warn!(error = %e, "Pipeline worker did not stop cleanly");
    }
    served?;
    Ok(())
}

async fn scrape_now(scrape: &ScrapeConfig, store: ArticleStore) -> Result<(), Box<dyn Error>> {
    let pipeline = news_pipeline(scrape, store)?;
    let inserted = pipeline.run_once(1).await?;
    info!(inserted, "Manual pipeline run stored articles");
    Ok(())
}

#[instrument(level = "info", skip_all, fields(username = %args.username, role = args.role))]
async fn add_user(args: AddUserArgs, store: &ArticleStore) -> Result<(), Box<dyn Error>> {
    if store.find_user(&args.username).await?.is_some() {
        return Err(format!("user `{}` already exists", args.username).into());
    }
    let hashed = hash_password(&args.password, args.bcrypt_cost)?;
    let user = store.create_user(&args.username, &hashed, args.role).await?;
    info!(user_id = user.id, privileged = user.is_privileged(), "User created");
    Ok(())
}

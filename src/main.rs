use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use mediadex::{
    application::{
        catalog::CatalogService, error::AppError, ingest::IngestService, repos::AssetsRepo,
    },
    cache::{self, CacheConfig, CacheStore},
    config::{self, Settings},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
        uploads::UploadStorage,
    },
};
use sqlx::PgPool;
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        None | Some(config::Command::Serve(_)) => run_serve(settings).await,
        Some(config::Command::Migrate(_)) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err)))?;
    info!(target = "mediadex::migrate", "Migrations applied");
    pool.close().await;
    Ok(())
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err)))?;
    let repositories = Arc::new(PostgresRepositories::new(pool));

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = cache::open(&cache_config).map_err(|err| AppError::from(InfraError::from(err)))?;

    let storage = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let state = build_state(repositories.clone(), cache.clone(), storage, &settings);
    let router = http::build_router(state, settings.uploads.max_request_bytes.get() as usize);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "mediadex::serve",
        addr = %settings.server.addr,
        cache_backend = cache.backend(),
        photo_limit = settings.catalog.photo_limit,
        video_limit = settings.catalog.video_limit,
        capacity_policy = settings.catalog.capacity_policy.as_str(),
        "Listening"
    );

    let result = serve_until_shutdown(listener, router, settings.server.graceful_shutdown).await;

    cache.close().await;
    repositories.close().await;
    info!(target = "mediadex::serve", "Shutdown complete");

    result
}

fn build_state(
    repositories: Arc<PostgresRepositories>,
    cache: Arc<dyn CacheStore>,
    storage: Arc<UploadStorage>,
    settings: &Settings,
) -> ApiState {
    let repo: Arc<dyn AssetsRepo> = repositories;
    let catalog = CatalogService::new(repo.clone(), cache, settings.cache.ttl);
    let ingest = IngestService::new(repo.clone(), storage.clone(), settings.catalog.limits());

    ApiState {
        catalog,
        ingest,
        repo,
        storage,
    }
}

async fn connect_pool(settings: &Settings) -> Result<PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err)))
}

/// Serve until ctrl-c, then give in-flight requests `grace` to finish.
async fn serve_until_shutdown(
    listener: tokio::net::TcpListener,
    router: axum::Router,
    grace: Duration,
) -> Result<(), AppError> {
    let (stopping_tx, mut stopping_rx) = watch::channel(false);

    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(target = "mediadex::serve", error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!(target = "mediadex::serve", "Shutdown requested");
            let _ = stopping_tx.send(true);
        },
    );
    let server = server.into_future();

    let drain_deadline = async move {
        if stopping_rx.wait_for(|stopping| *stopping).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.map_err(|err| AppError::from(InfraError::from(err))),
        () = drain_deadline => {
            warn!(
                target = "mediadex::serve",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; dropping remaining connections"
            );
            Ok(())
        }
    }
}

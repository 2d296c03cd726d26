use std::{process, sync::Arc, time::Duration};

use catalogd::{
    application::{
        catalog::CatalogService,
        error::AppError,
        repos::{CatalogRepo, SnapshotRepo},
    },
    cache::{CacheStore, MemoryCacheStore},
    config::{self, CacheBackend},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
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

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let service = build_catalog_service(repositories, &settings);
    let state = ApiState::new(Arc::new(service), settings.api.timeouts);
    serve_http(&settings, state).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, &settings.database.pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let repositories = PostgresRepositories::new(pool, &settings.database.relations);
    if let Err(err) = repositories.health_check().await {
        warn!(
            target = "catalogd::startup",
            error = %err,
            "database is not reachable yet; requests will retry through the pool"
        );
    }

    info!(
        target = "catalogd::startup",
        catalog_relation = %repositories.catalog_relation(),
        snapshot_relation = %repositories.snapshot_relation(),
        max_connections = settings.database.pool.max_connections,
        "database pool ready"
    );

    Ok(Arc::new(repositories))
}

fn build_catalog_service(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> CatalogService {
    let catalog_repo: Arc<dyn CatalogRepo> = repositories.clone();
    let snapshot_repo: Arc<dyn SnapshotRepo> = repositories;

    let store: Option<Arc<dyn CacheStore>> = match settings.cache.backend {
        CacheBackend::Memory => Some(Arc::new(MemoryCacheStore::new(
            settings.cache.memory_capacity,
        ))),
        CacheBackend::None => None,
    };

    info!(
        target = "catalogd::startup",
        backend = ?settings.cache.backend,
        namespace = settings.cache.policy.namespace().unwrap_or(""),
        capacity = settings.cache.memory_capacity.get(),
        "cache configured"
    );

    CatalogService::new(
        catalog_repo,
        snapshot_repo,
        store,
        settings.cache.policy.clone(),
        settings.api.max_page_size,
    )
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(settings.server.addr, err)))?;

    info!(
        target = "catalogd::startup",
        addr = %settings.server.addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::from(InfraError::Serve(err)))?;

    info!(target = "catalogd::shutdown", "server stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM, then arms a watchdog that exits the process
/// if in-flight requests have not drained within `grace`.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "catalogd::shutdown", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "catalogd::shutdown", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(
        target = "catalogd::shutdown",
        grace_secs = grace.as_secs(),
        "shutdown requested; draining requests"
    );

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(
            target = "catalogd::shutdown",
            "graceful shutdown timed out; exiting"
        );
        process::exit(1);
    });
}

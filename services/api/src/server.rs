use crate::cli::ServeArgs;
use crate::infra::{seed_demo_store, AppState};
use crate::routes::with_certification_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use certolo::config::AppConfig;
use certolo::error::AppError;
use certolo::telemetry;
use certolo::workflows::certification::{
    CertificationService, CertificationStore, PgCertificationStore, ReviewPolicy,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let policy = ReviewPolicy::from(config.review);
    let site_url = config.server.site_url.clone();
    match config.database.url.as_deref() {
        Some(url) => {
            let store =
                PgCertificationStore::connect(url, config.database.max_connections).await?;
            info!(
                max_connections = config.database.max_connections,
                "using postgres certification store"
            );
            let service = CertificationService::new(Arc::new(store), policy, site_url);
            serve(&config, service).await
        }
        None => {
            warn!("DATABASE_URL not set; serving the seeded in-memory store");
            let store = seed_demo_store()?;
            let service = CertificationService::new(Arc::new(store), policy, site_url);
            serve(&config, service).await
        }
    }
}

async fn serve<S>(config: &AppConfig, service: CertificationService<S>) -> Result<(), AppError>
where
    S: CertificationStore + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_certification_routes(Arc::new(service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "certification review service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) async fn migrate() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let url = config
        .database
        .url
        .as_deref()
        .ok_or(AppError::DatabaseNotConfigured)?;
    let store = PgCertificationStore::connect(url, config.database.max_connections).await?;
    store.migrate().await?;

    info!("certification schema is up to date");
    Ok(())
}

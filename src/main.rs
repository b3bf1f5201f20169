use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use shelterflow::config::AppConfig;
use shelterflow::error::AppError;
use shelterflow::telemetry;
use shelterflow::workflows::adoption::{
    adoption_router, AdoptionService, MemoryBlobStore, MemoryShelterRepository, Role,
    StaticRoleDirectory, UserId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: Arc<PrometheusHandle>,
}

#[derive(Parser, Debug)]
#[command(
    name = "Shelterflow",
    about = "Run the cat adoption intake and review service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
    /// Grant the adopter capability to a user id (repeatable)
    #[arg(long = "adopter", value_name = "USER_ID")]
    adopters: Vec<u64>,
    /// Grant the coordinator capability to a user id (repeatable)
    #[arg(long = "coordinator", value_name = "USER_ID")]
    coordinators: Vec<u64>,
    /// Seed demo cats and users for local exploration
    #[arg(long)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let mut directory = StaticRoleDirectory::default();
    for adopter in &args.adopters {
        directory = directory.grant(UserId(*adopter), Role::Adopter);
    }
    for coordinator in &args.coordinators {
        directory = directory.grant(UserId(*coordinator), Role::Coordinator);
    }
    if args.seed_demo {
        directory = directory
            .grant(UserId(1), Role::Adopter)
            .grant(UserId(2), Role::Coordinator)
            .grant(UserId(3), Role::Admin);
    }

    let repository = Arc::new(MemoryShelterRepository::default());
    let blobs = Arc::new(MemoryBlobStore::default());
    let service = Arc::new(
        AdoptionService::new(repository, blobs, Arc::new(directory))
            .with_review_sla_days(config.workflow.review_sla_days),
    );

    if args.seed_demo {
        for name in ["Miuda", "Frajola", "Thor"] {
            let cat = service.register_cat(name)?;
            info!(cat = %cat.id, name = %cat.name, "demo cat registered");
        }
    }

    let app = adoption_router(service)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "adoption workflow service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

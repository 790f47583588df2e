use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};

use api_shared::HealthService;
use api_shared::auth::TokenValidator;
use ark_core::{IngestService, MediaRecord, ServerConfig};
use ark_hash::ContentHash;

/// Application state shared across REST API handlers
#[derive(Clone)]
struct AppState {
    ingest: IngestService,
}

#[derive(Serialize, ToSchema)]
struct HealthRes {
    ok: bool,
    message: String,
}

/// An archived file as exposed over REST.
#[derive(Serialize, ToSchema, Debug, PartialEq)]
struct MediaRecordRes {
    /// Lowercase hex BLAKE3 digest of the content
    hash: String,
    /// Location of the file inside the archive
    path: String,
    created_at: DateTime<Utc>,
    imported_at: Option<DateTime<Utc>>,
}

impl From<MediaRecord> for MediaRecordRes {
    fn from(record: MediaRecord) -> Self {
        Self {
            hash: record.hash.to_hex(),
            path: record.path.display().to_string(),
            created_at: record.created_at,
            imported_at: record.imported_at,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, get_media),
    components(schemas(HealthRes, MediaRecordRes))
)]
struct ApiDoc;

/// Main entry point for the Ark server
///
/// Runs the gRPC upload service and the REST API side by side until Ctrl-C:
/// - gRPC on `ARK_SERVER_ADDRESS` (default `0.0.0.0:9999`), token authenticated
/// - REST on `ARK_SERVER_REST_ADDRESS` (default `0.0.0.0:3000`), read-only
///
/// See [`ServerConfig`] for the full list of environment variables.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(log_filter()?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let ingest = api_grpc::ingest_service(&config.core)?;
    let repository = ingest.repository().clone();
    let validator = TokenValidator::new(config.signing_key.as_str().as_bytes())?;

    tracing::info!("++ Starting Ark gRPC on {}", config.grpc_address);
    tracing::info!("++ Starting Ark REST on {}", config.rest_address);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(config.rest_address).await?;
    let rest_server = axum::serve(listener, rest_app(ingest.clone()))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    let grpc_server = api_grpc::router(ingest, validator, config.enable_reflection)?
        .serve_with_shutdown(config.grpc_address, shutdown.clone().cancelled_owned());

    let (rest_result, grpc_result) = tokio::join!(rest_server, grpc_server);
    // Stop the other server if one of them failed.
    shutdown.cancel();
    rest_result?;
    grpc_result?;

    repository.close()?;
    tracing::info!("stopped");
    Ok(())
}

/// `RUST_LOG` plus info-level logging for the Ark crates, including the gRPC layer.
fn log_filter() -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("ark=info".parse()?)
        .add_directive("api_grpc=info".parse()?))
}

fn rest_app(ingest: IngestService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/media/:hash", get(get_media))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(CorsLayer::permissive())
        .with_state(AppState { ingest })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
async fn health() -> Json<HealthRes> {
    let res = HealthService::check_health();
    Json(HealthRes {
        ok: res.ok,
        message: res.message,
    })
}

#[utoipa::path(
    get,
    path = "/media/{hash}",
    params(("hash" = String, Path, description = "Hex BLAKE3 digest of the content")),
    responses(
        (status = 200, description = "Archived file", body = MediaRecordRes),
        (status = 400, description = "Malformed hash"),
        (status = 404, description = "No file with this hash"),
        (status = 500, description = "Internal server error")
    )
)]
/// Looks up an archived file by content hash
async fn get_media(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<MediaRecordRes>, (StatusCode, &'static str)> {
    let hash =
        ContentHash::parse(&hash).map_err(|_| (StatusCode::BAD_REQUEST, "Malformed hash"))?;

    match state.ingest.lookup(hash).await {
        Ok(Some(record)) => Ok(Json(record.into())),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Not found")),
        Err(e) => {
            tracing::error!(%hash, "lookup failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

use api_shared::auth::TokenValidator;
use ark_core::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ark=info".parse()?)
                .add_directive("api_grpc=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let ingest = api_grpc::ingest_service(&config.core)?;
    let repository = ingest.repository().clone();
    let validator = TokenValidator::new(config.signing_key.as_str().as_bytes())?;

    tracing::info!("-- Starting Ark gRPC on {}", config.grpc_address);

    api_grpc::router(ingest, validator, config.enable_reflection)?
        .serve_with_shutdown(config.grpc_address, async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown requested");
        })
        .await?;

    repository.close()?;
    Ok(())
}

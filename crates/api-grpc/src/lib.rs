//! # API gRPC
//!
//! gRPC server implementation for Ark.
//!
//! Handles:
//! - `ArkApi` service setup with token authentication
//! - Translating the streamed `UploadFile` messages into `ark-core` upload frames
//! - gRPC-specific concerns (interceptors, message limits, reflection)
//!
//! Uses `api-shared` for the generated protobuf types and auth.

#![warn(rust_2018_idioms)]

pub use service::{pb, ArkService};

pub mod service;

use api_shared::auth::{AuthInterceptor, TokenValidator};
use api_shared::FILE_DESCRIPTOR_SET;
use ark_core::{open_repository, CoreConfig, IngestService};
use ark_files::ArchivePlacer;
use pb::ark_api_server::ArkApiServer;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::server::Router;
use tonic::transport::Server;

/// Largest message the server accepts. Clients send 1 MiB chunks; this leaves ample room for
/// framing overhead and larger chunks from other clients.
pub const MAX_DECODING_MESSAGE_SIZE: usize = 4 * 1024 * 1024 + 64 * 1024;

/// Opens the repository and archive described by `config` and builds the ingest pipeline.
pub fn ingest_service(config: &CoreConfig) -> anyhow::Result<IngestService> {
    let repository = open_repository(config)?;
    let placer = ArchivePlacer::new(config.archive_root())?;
    tracing::info!(archive = %placer.root().display(), "archive ready");
    Ok(IngestService::new(repository, placer))
}

/// The authenticated `ArkApi` service.
pub fn ark_api(
    ingest: IngestService,
    validator: TokenValidator,
) -> InterceptedService<ArkApiServer<ArkService>, AuthInterceptor> {
    let server = ArkApiServer::new(ArkService::new(ingest))
        .max_decoding_message_size(MAX_DECODING_MESSAGE_SIZE);
    InterceptedService::new(server, AuthInterceptor::new(validator))
}

/// Builds the server router, optionally with gRPC reflection.
pub fn router(
    ingest: IngestService,
    validator: TokenValidator,
    enable_reflection: bool,
) -> anyhow::Result<Router> {
    let mut router = Server::builder().add_service(ark_api(ingest, validator));

    if enable_reflection {
        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()?;
        router = router.add_service(reflection_service);
        tracing::info!("gRPC server reflection enabled");
    } else {
        tracing::info!("gRPC server reflection disabled");
    }

    Ok(router)
}

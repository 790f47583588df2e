//! # Ark Core
//!
//! Core business logic of the Ark media archive server.
//!
//! This crate contains the ingest pipeline and record storage:
//! - [`IngestService`]: validates a streamed upload, rejects duplicates and hands the content
//!   to the [`ArchivePlacer`](ark_files::ArchivePlacer)
//! - [`Repository`] with in-memory and sharded JSON backends
//! - [`ServerConfig`], resolved once at startup
//!
//! **No API concerns**: authentication, the protobuf wire types and the gRPC/REST servers live
//! in `api-shared`, `api-grpc` and the `ark-run` binary. Transport layers translate their
//! frames into [`UploadFrame`] and map [`IngestError`] onto status codes with
//! `tonic::Status::from`.

pub mod config;
pub mod constants;
mod error;
pub mod ingest;
mod record;
pub mod repositories;

pub use config::{CoreConfig, RepositoryKind, ServerConfig};
pub use error::{
    ConfigError, ConfigResult, IngestError, IngestResult, RepositoryError, RepositoryResult,
};
pub use ingest::{IngestObserver, IngestService, TracingObserver, UploadFrame, UploadMetadata};
pub use record::MediaRecord;
pub use repositories::{open_repository, JsonRepository, MemoryRepository, Repository};

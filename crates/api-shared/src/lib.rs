//! # API Shared
//!
//! Shared utilities and definitions for the Ark APIs.
//!
//! Contains:
//! - Protobuf-generated types, `ArkApi` server trait and client (`pb` module)
//! - Shared services like `HealthService`
//! - Signed-token authentication (issued by the importer, checked by the server)
//!
//! Used by `api-grpc`, the importer and the `ark-run` binary.

// Re-export the generated protobuf module. The generated code will be placed
// into OUT_DIR at build time by the build script.
pub mod pb {
    tonic::include_proto!("ark.v1");
}

pub mod auth;
pub mod health;

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("proto_descriptor");

pub use health::HealthService;
pub use pb::*;

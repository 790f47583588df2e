//! Constants used throughout the Ark core crate.

/// Hidden directory under the archive root for server-owned state.
pub const ARK_STATE_DIR_NAME: &str = ".ark";

/// Directory name, under [`ARK_STATE_DIR_NAME`], of the JSON record store.
pub const RECORDS_DIR_NAME: &str = "records";

/// File extension of a stored JSON record.
pub const RECORD_FILE_EXTENSION: &str = "json";

/// Default gRPC listen address.
pub const DEFAULT_GRPC_ADDRESS: &str = "0.0.0.0:9999";

/// Default REST listen address.
pub const DEFAULT_REST_ADDRESS: &str = "0.0.0.0:3000";

/// Upper bound on the buffer pre-allocated from a client-declared size.
pub const MAX_PREALLOCATED_BYTES: usize = 8 * 1024 * 1024;

pub const ENV_ARCHIVE_PATH: &str = "ARK_SERVER_ARCHIVE_PATH";
pub const ENV_SIGNING_KEY: &str = "ARK_SERVER_SIGNING_KEY";
pub const ENV_GRPC_ADDRESS: &str = "ARK_SERVER_ADDRESS";
pub const ENV_REST_ADDRESS: &str = "ARK_SERVER_REST_ADDRESS";
pub const ENV_REPOSITORY: &str = "ARK_SERVER_REPOSITORY";
pub const ENV_DB_PATH: &str = "ARK_SERVER_DB_PATH";
pub const ENV_ENABLE_REFLECTION: &str = "ARK_SERVER_ENABLE_REFLECTION";

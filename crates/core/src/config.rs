//! Server runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into services. Nothing
//! below the binaries reads process-wide environment variables during request handling; the
//! parsers here take a lookup function so they can be exercised without touching the real
//! environment.

use crate::constants::{
    ARK_STATE_DIR_NAME, DEFAULT_GRPC_ADDRESS, DEFAULT_REST_ADDRESS, ENV_ARCHIVE_PATH, ENV_DB_PATH,
    ENV_ENABLE_REFLECTION, ENV_GRPC_ADDRESS, ENV_REPOSITORY, ENV_REST_ADDRESS, ENV_SIGNING_KEY,
    RECORDS_DIR_NAME,
};
use crate::{ConfigError, ConfigResult};
use ark_types::NonEmptyText;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which [`Repository`](crate::Repository) backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepositoryKind {
    Memory,
    #[default]
    Json,
}

impl FromStr for RepositoryKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(RepositoryKind::Memory),
            "json" => Ok(RepositoryKind::Json),
            other => Err(ConfigError::InvalidValue {
                key: ENV_REPOSITORY,
                reason: format!("unknown repository '{}', expected 'memory' or 'json'", other),
            }),
        }
    }
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::Memory => f.write_str("memory"),
            RepositoryKind::Json => f.write_str("json"),
        }
    }
}

/// Storage configuration shared by every server surface.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    archive_root: PathBuf,
    records_dir: PathBuf,
    repository_kind: RepositoryKind,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// When `records_dir` is `None` records are kept under `<archive_root>/.ark/records`.
    pub fn new(
        archive_root: PathBuf,
        records_dir: Option<PathBuf>,
        repository_kind: RepositoryKind,
    ) -> Self {
        let records_dir = records_dir.unwrap_or_else(|| {
            archive_root
                .join(ARK_STATE_DIR_NAME)
                .join(RECORDS_DIR_NAME)
        });

        Self {
            archive_root,
            records_dir,
            repository_kind,
        }
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    pub fn repository_kind(&self) -> RepositoryKind {
        self.repository_kind
    }
}

/// Everything the server binaries need, resolved from the environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub core: CoreConfig,
    pub grpc_address: SocketAddr,
    pub rest_address: SocketAddr,
    pub signing_key: NonEmptyText,
    pub enable_reflection: bool,
}

impl ServerConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from `lookup`, which maps a variable name to its value.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let archive_root = get(ENV_ARCHIVE_PATH)
            .ok_or(ConfigError::Missing(ENV_ARCHIVE_PATH))
            .and_then(|v| expand_home(&v))?;

        let signing_key = get(ENV_SIGNING_KEY)
            .ok_or(ConfigError::Missing(ENV_SIGNING_KEY))
            .and_then(|v| {
                NonEmptyText::new(v).map_err(|e| ConfigError::InvalidValue {
                    key: ENV_SIGNING_KEY,
                    reason: e.to_string(),
                })
            })?;

        let records_dir = get(ENV_DB_PATH).map(|v| expand_home(&v)).transpose()?;

        let repository_kind = get(ENV_REPOSITORY)
            .map(|v| v.parse::<RepositoryKind>())
            .transpose()?
            .unwrap_or_default();

        let grpc_address = parse_address(ENV_GRPC_ADDRESS, get(ENV_GRPC_ADDRESS), DEFAULT_GRPC_ADDRESS)?;
        let rest_address = parse_address(ENV_REST_ADDRESS, get(ENV_REST_ADDRESS), DEFAULT_REST_ADDRESS)?;

        let enable_reflection = get(ENV_ENABLE_REFLECTION)
            .map(|v| parse_bool(ENV_ENABLE_REFLECTION, &v))
            .transpose()?
            .unwrap_or(false);

        Ok(Self {
            core: CoreConfig::new(archive_root, records_dir, repository_kind),
            grpc_address,
            rest_address,
            signing_key,
            enable_reflection,
        })
    }
}

/// Replaces a leading `~` with the current user's home directory.
pub fn expand_home(path: &str) -> ConfigResult<PathBuf> {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return Ok(PathBuf::from(path)),
    };

    let home = directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDirectory)?;

    if rest.is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}

fn parse_address(
    key: &'static str,
    value: Option<String>,
    default: &str,
) -> ConfigResult<SocketAddr> {
    let value = value.as_deref().unwrap_or(default);
    value.parse().map_err(|e| ConfigError::InvalidValue {
        key,
        reason: format!("'{}' is not a socket address: {}", value, e),
    })
}

fn parse_bool(key: &'static str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key,
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("ARK_SERVER_ARCHIVE_PATH", "/srv/archive"),
            ("ARK_SERVER_SIGNING_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.core.archive_root(), Path::new("/srv/archive"));
        assert_eq!(
            config.core.records_dir(),
            Path::new("/srv/archive/.ark/records")
        );
        assert_eq!(config.core.repository_kind(), RepositoryKind::Json);
        assert_eq!(config.grpc_address, "0.0.0.0:9999".parse().unwrap());
        assert_eq!(config.rest_address, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.signing_key.as_str(), "secret");
        assert!(!config.enable_reflection);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("ARK_SERVER_ARCHIVE_PATH", "/srv/archive"),
            ("ARK_SERVER_SIGNING_KEY", "secret"),
            ("ARK_SERVER_ADDRESS", "127.0.0.1:50051"),
            ("ARK_SERVER_REST_ADDRESS", "127.0.0.1:8080"),
            ("ARK_SERVER_REPOSITORY", "Memory"),
            ("ARK_SERVER_DB_PATH", "/var/lib/ark"),
            ("ARK_SERVER_ENABLE_REFLECTION", "true"),
        ]))
        .unwrap();

        assert_eq!(config.grpc_address, "127.0.0.1:50051".parse().unwrap());
        assert_eq!(config.rest_address, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.core.repository_kind(), RepositoryKind::Memory);
        assert_eq!(config.core.records_dir(), Path::new("/var/lib/ark"));
        assert!(config.enable_reflection);
    }

    #[test]
    fn test_missing_required_values() {
        let err = ServerConfig::from_lookup(lookup(&[("ARK_SERVER_SIGNING_KEY", "secret")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ARK_SERVER_ARCHIVE_PATH")));

        let err = ServerConfig::from_lookup(lookup(&[
            ("ARK_SERVER_ARCHIVE_PATH", "/srv/archive"),
            ("ARK_SERVER_SIGNING_KEY", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ARK_SERVER_SIGNING_KEY")));
    }

    #[test]
    fn test_invalid_values() {
        let base = [
            ("ARK_SERVER_ARCHIVE_PATH", "/srv/archive"),
            ("ARK_SERVER_SIGNING_KEY", "secret"),
        ];

        for (key, value) in [
            ("ARK_SERVER_ADDRESS", "not-an-address"),
            ("ARK_SERVER_REPOSITORY", "postgres"),
            ("ARK_SERVER_ENABLE_REFLECTION", "maybe"),
        ] {
            let mut vars = base.to_vec();
            vars.push((key, value));
            let err = ServerConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { key: k, .. } if k == key),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path").unwrap(), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("~other/x").unwrap(), PathBuf::from("~other/x"));

        if let Some(dirs) = directories::BaseDirs::new() {
            assert_eq!(expand_home("~").unwrap(), dirs.home_dir());
            assert_eq!(
                expand_home("~/Pictures").unwrap(),
                dirs.home_dir().join("Pictures")
            );
        }
    }
}

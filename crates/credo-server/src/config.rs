//! Command-line and environment configuration for the server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use credo_auth::{AuthConfig, NotifyConfig};
use credo_db::{StoreConfig, StoreCredentials};

/// Log output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Raw settings parsed from CLI arguments, falling back to `CREDO_*`
/// environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "credo-server",
    version,
    about = "Account registration service"
)]
pub struct CliArgs {
    /// Interface to bind.
    #[arg(long, env = "CREDO_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "CREDO_PORT", default_value_t = 8443)]
    pub port: u16,

    /// Serve over TLS. Requires `--tls-cert-file` and `--tls-key-file`.
    #[arg(long, env = "CREDO_TLS_ENABLED", default_value_t = false)]
    pub tls_enabled: bool,

    #[arg(long, env = "CREDO_TLS_CERT_FILE")]
    pub tls_cert_file: Option<PathBuf>,

    #[arg(long, env = "CREDO_TLS_KEY_FILE")]
    pub tls_key_file: Option<PathBuf>,

    /// SurrealDB endpoint, e.g. `ws://127.0.0.1:8000` or `mem://`.
    #[arg(long, env = "CREDO_DB_ENDPOINT", default_value = "ws://127.0.0.1:8000")]
    pub db_endpoint: String,

    #[arg(long, env = "CREDO_DB_NAMESPACE", default_value = "credo")]
    pub db_namespace: String,

    #[arg(long, env = "CREDO_DB_DATABASE", default_value = "main")]
    pub db_database: String,

    /// Root user for the store. Omit for unauthenticated endpoints.
    #[arg(long, env = "CREDO_DB_USERNAME")]
    pub db_username: Option<String>,

    #[arg(long, env = "CREDO_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Connection attempts before startup gives up.
    #[arg(long, env = "CREDO_DB_MAX_ATTEMPTS", default_value_t = 5)]
    pub db_max_attempts: u32,

    /// HS256 signing key for access and refresh tokens.
    #[arg(long, env = "CREDO_SECRET_KEY", hide_env_values = true, default_value = "")]
    pub secret_key: String,

    /// Access token lifetime in seconds.
    #[arg(long, env = "CREDO_ACCESS_TOKEN_TTL", default_value_t = 900)]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds.
    #[arg(long, env = "CREDO_REFRESH_TOKEN_TTL", default_value_t = 2_592_000)]
    pub refresh_token_ttl: u64,

    /// Filter directive used when `RUST_LOG` is unset.
    #[arg(long, env = "CREDO_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "CREDO_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Verification email worker tasks.
    #[arg(long, env = "CREDO_NOTIFY_WORKERS", default_value_t = 2)]
    pub notify_workers: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CREDO_SECRET_KEY must be set")]
    MissingSecretKey,

    #[error("TLS is enabled but {0} is not set")]
    MissingTlsFile(&'static str),

    #[error("CREDO_DB_USERNAME and CREDO_DB_PASSWORD must be set together")]
    PartialCredentials,

    #[error("{name} must be greater than 0")]
    Zero { name: &'static str },

    #[error("{name} exceeds the largest representable token lifetime")]
    TtlOutOfRange { name: &'static str },
}

/// Token expiry is a signed Unix timestamp, so lifetimes must fit in `i64`.
fn token_ttl(name: &'static str, secs: u64) -> Result<u64, ConfigError> {
    if i64::try_from(secs).is_err() {
        return Err(ConfigError::TtlOutOfRange { name });
    }
    Ok(secs)
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub tls: Option<TlsConfig>,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub notify: NotifyConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.secret_key.is_empty() {
            return Err(ConfigError::MissingSecretKey);
        }
        if args.db_max_attempts == 0 {
            return Err(ConfigError::Zero {
                name: "CREDO_DB_MAX_ATTEMPTS",
            });
        }
        if args.notify_workers == 0 {
            return Err(ConfigError::Zero {
                name: "CREDO_NOTIFY_WORKERS",
            });
        }

        let tls = if args.tls_enabled {
            let cert_file = args
                .tls_cert_file
                .ok_or(ConfigError::MissingTlsFile("CREDO_TLS_CERT_FILE"))?;
            let key_file = args
                .tls_key_file
                .ok_or(ConfigError::MissingTlsFile("CREDO_TLS_KEY_FILE"))?;
            Some(TlsConfig {
                cert_file,
                key_file,
            })
        } else {
            None
        };

        let credentials = match (args.db_username, args.db_password) {
            (Some(username), Some(password)) => Some(StoreCredentials { username, password }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialCredentials),
        };

        Ok(Self {
            listen_addr: format!("{}:{}", args.host, args.port),
            tls,
            store: StoreConfig {
                endpoint: args.db_endpoint,
                namespace: args.db_namespace,
                database: args.db_database,
                credentials,
                max_attempts: args.db_max_attempts,
                retry_base_delay: Duration::from_secs(2),
            },
            auth: AuthConfig {
                secret_key: args.secret_key,
                access_token_lifetime_secs: token_ttl(
                    "CREDO_ACCESS_TOKEN_TTL",
                    args.access_token_ttl,
                )?,
                refresh_token_lifetime_secs: token_ttl(
                    "CREDO_REFRESH_TOKEN_TTL",
                    args.refresh_token_ttl,
                )?,
                pepper: None,
            },
            notify: NotifyConfig {
                workers: args.notify_workers,
                ..NotifyConfig::default()
            },
            log_level: args.log_level,
            log_format: args.log_format,
        })
    }
}

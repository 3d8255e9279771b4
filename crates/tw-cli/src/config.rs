//! # Process Configuration
//!
//! Read once from the environment at startup. Optional integrations fall
//! back to in-process substitutes with a startup warning:
//!
//! | Unset | Fallback |
//! |---|---|
//! | `DATABASE_URL` | in-memory store and queue |
//! | `BLOCKCHAIN_RPC_URL` | mock ledger |
//! | `SMTP_HOST` | email deliveries fail with a transport error |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tw_delivery::SmtpConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_CA_BUNDLE: &str = "./certs/ca-bundle.pem";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_FROM: &str = "noreply@trustwipe.com";

/// Invalid or incomplete configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable required by another one is unset.
    #[error("{var} is required when {because} is set")]
    Missing {
        /// The unset variable.
        var: &'static str,
        /// The variable that requires it.
        because: &'static str,
    },

    /// A variable could not be parsed.
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// EVM JSON-RPC ledger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    pub rpc_url: String,
    pub contract_address: String,
    pub from_address: String,
}

/// Everything `trustwipe serve` needs.
#[derive(Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub ca_bundle_path: PathBuf,
    /// Abort startup when the CA bundle is missing or empty.
    pub require_ca_bundle: bool,
    pub ledger: Option<LedgerSettings>,
    pub rpc_timeout: Duration,
    pub delivery_timeout: Duration,
    pub smtp: Option<SmtpConfig>,
    pub anchor_concurrency: usize,
    pub delivery_concurrency: usize,
    pub poll_interval: Duration,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("bind_addr", &self.bind_addr)
            .field("ca_bundle_path", &self.ca_bundle_path)
            .field("require_ca_bundle", &self.require_ca_bundle)
            .field("ledger", &self.ledger)
            .field("rpc_timeout", &self.rpc_timeout)
            .field("delivery_timeout", &self.delivery_timeout)
            .field("smtp", &self.smtp)
            .field("anchor_concurrency", &self.anchor_concurrency)
            .field("delivery_concurrency", &self.delivery_concurrency)
            .field("poll_interval", &self.poll_interval)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let ledger = match get("BLOCKCHAIN_RPC_URL") {
            None => None,
            Some(rpc_url) => Some(LedgerSettings {
                rpc_url,
                contract_address: get("CONTRACT_ADDRESS").ok_or(ConfigError::Missing {
                    var: "CONTRACT_ADDRESS",
                    because: "BLOCKCHAIN_RPC_URL",
                })?,
                from_address: get("ANCHOR_FROM_ADDRESS").ok_or(ConfigError::Missing {
                    var: "ANCHOR_FROM_ADDRESS",
                    because: "BLOCKCHAIN_RPC_URL",
                })?,
            }),
        };

        let delivery_timeout = Duration::from_secs(parse_or(&get, "DELIVERY_TIMEOUT_SECS", 30)?);
        let smtp = match get("SMTP_HOST") {
            None => None,
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(&get, "SMTP_PORT", DEFAULT_SMTP_PORT)?,
                username: get("SMTP_USER"),
                password: get("SMTP_PASS"),
                from: get("SMTP_FROM").unwrap_or_else(|| DEFAULT_SMTP_FROM.to_string()),
                timeout: delivery_timeout,
            }),
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(f) if f == "text" => LogFormat::Text,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other,
                    reason: "expected text or json".into(),
                })
            }
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            bind_addr: parse_or(
                &get,
                "BIND_ADDR",
                DEFAULT_BIND_ADDR.parse().map_err(|e: std::net::AddrParseError| {
                    ConfigError::Invalid {
                        var: "BIND_ADDR",
                        value: DEFAULT_BIND_ADDR.into(),
                        reason: e.to_string(),
                    }
                })?,
            )?,
            ca_bundle_path: get("CA_BUNDLE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CA_BUNDLE)),
            require_ca_bundle: parse_or(&get, "REQUIRE_CA_BUNDLE", false)?,
            ledger,
            rpc_timeout: Duration::from_secs(parse_or(&get, "RPC_TIMEOUT_SECS", 30)?),
            delivery_timeout,
            smtp,
            anchor_concurrency: positive(parse_or(&get, "ANCHOR_CONCURRENCY", 5)?, "ANCHOR_CONCURRENCY")?,
            delivery_concurrency: positive(
                parse_or(&get, "DELIVERY_CONCURRENCY", 3)?,
                "DELIVERY_CONCURRENCY",
            )?,
            poll_interval: Duration::from_millis(parse_or(&get, "QUEUE_POLL_INTERVAL_MS", 500)?),
            log_format,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive(value: usize, var: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(value)
}

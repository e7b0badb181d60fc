use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::review::{ReforwardPolicy, Role};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let reforward_policy = match env::var("SETUP_REFORWARD_POLICY") {
            Ok(raw) => ReforwardPolicy::parse(&raw)
                .ok_or(ConfigError::InvalidReforwardPolicy { value: raw })?,
            Err(_) => ReforwardPolicy::default(),
        };

        let sweep_secs = parse_positive("SETUP_OUTBOX_SWEEP_SECS", 30)?;
        let outbox_batch_size = parse_positive("SETUP_OUTBOX_BATCH", 50)? as usize;

        let role_grants = match env::var("SETUP_ROLE_GRANTS") {
            Ok(raw) => parse_role_grants(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
                include_targets: environment != AppEnvironment::Production,
            },
            workflow: WorkflowConfig {
                reforward_policy,
                outbox_sweep_interval: Duration::from_secs(sweep_secs),
                outbox_batch_size,
                role_grants,
            },
        })
    }
}

fn parse_positive(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidNumber { key, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

/// Parse `actor:role` pairs separated by commas, e.g. `psto-01:provincial_reviewer,dost-01:dost`.
pub fn parse_role_grants(raw: &str) -> Result<Vec<(String, Role)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (actor, role) = pair
                .split_once(':')
                .ok_or_else(|| ConfigError::InvalidRoleGrant {
                    value: pair.to_string(),
                })?;
            let actor = actor.trim();
            let role = Role::parse(role).ok_or_else(|| ConfigError::InvalidRoleGrant {
                value: pair.to_string(),
            })?;
            if actor.is_empty() {
                return Err(ConfigError::InvalidRoleGrant {
                    value: pair.to_string(),
                });
            }
            Ok((actor.to_string(), role))
        })
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
    pub include_targets: bool,
}

/// Review workflow knobs.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub reforward_policy: ReforwardPolicy,
    pub outbox_sweep_interval: Duration,
    pub outbox_batch_size: usize,
    pub role_grants: Vec<(String, Role)>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidReforwardPolicy { value: String },
    InvalidNumber { key: &'static str, value: String },
    InvalidRoleGrant { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidReforwardPolicy { value } => write!(
                f,
                "SETUP_REFORWARD_POLICY must be 'reject' or 'acknowledge' (got '{value}')"
            ),
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive integer (got '{value}')")
            }
            ConfigError::InvalidRoleGrant { value } => write!(
                f,
                "SETUP_ROLE_GRANTS entry '{value}' must look like actor:role"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidReforwardPolicy { .. }
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidRoleGrant { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "SETUP_REFORWARD_POLICY",
            "SETUP_OUTBOX_SWEEP_SECS",
            "SETUP_OUTBOX_BATCH",
            "SETUP_ROLE_GRANTS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.workflow.reforward_policy, ReforwardPolicy::Reject);
        assert_eq!(config.workflow.outbox_sweep_interval, Duration::from_secs(30));
        assert_eq!(config.workflow.outbox_batch_size, 50);
        assert!(config.workflow.role_grants.is_empty());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_unknown_reforward_policy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SETUP_REFORWARD_POLICY", "sometimes");
        match AppConfig::load() {
            Err(ConfigError::InvalidReforwardPolicy { value }) => assert_eq!(value, "sometimes"),
            other => panic!("expected reforward policy error, got {other:?}"),
        }
        env::set_var("SETUP_REFORWARD_POLICY", "acknowledge");
        let config = AppConfig::load().expect("acknowledge is valid");
        assert_eq!(
            config.workflow.reforward_policy,
            ReforwardPolicy::Acknowledge
        );
        reset_env();
    }

    #[test]
    fn rejects_zero_sweep_interval() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SETUP_OUTBOX_SWEEP_SECS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                key: "SETUP_OUTBOX_SWEEP_SECS",
                ..
            })
        ));
        reset_env();
    }

    #[test]
    fn parses_role_grants() {
        let grants = parse_role_grants("psto-romblon:psto, tna-01:assessment_scheduler,,dost-1:dost")
            .expect("grants parse");
        assert_eq!(
            grants,
            vec![
                ("psto-romblon".to_string(), Role::ProvincialReviewer),
                ("tna-01".to_string(), Role::AssessmentScheduler),
                ("dost-1".to_string(), Role::RegionalReviewer),
            ]
        );

        assert!(matches!(
            parse_role_grants("psto-romblon"),
            Err(ConfigError::InvalidRoleGrant { .. })
        ));
        assert!(matches!(
            parse_role_grants(":psto"),
            Err(ConfigError::InvalidRoleGrant { .. })
        ));
    }
}

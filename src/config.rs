use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub gateway: GatewayConfig,
    pub email: EmailConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64,  // seconds
    pub refresh_token_expires_in: i64, // seconds
}

/// Hosted checkout gateway (external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub secret_key: String,
    pub base_url: String,
    /// Base URL the gateway redirects/calls back to; the verification token
    /// is appended as a query parameter.
    pub callback_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub api_key: String,
    pub base_url: String,
    pub from_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub interval_secs: u64,
    pub lookback_days: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            lookback_days: 7,
        }
    }
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("Failed to parse {config_path}: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // No config file: build from environment variables alone.
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is required when no config.toml is present")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                        access_token_expires_in: get_env_parse("JWT_ACCESS_EXPIRES_IN", 7200i64),
                        refresh_token_expires_in: get_env_parse(
                            "JWT_REFRESH_EXPIRES_IN",
                            2_592_000i64,
                        ),
                    },
                    gateway: GatewayConfig {
                        secret_key: get_env("GATEWAY_SECRET_KEY").unwrap_or_default(),
                        base_url: get_env("GATEWAY_BASE_URL")
                            .unwrap_or_else(|| "https://checkout.example.com".to_string()),
                        callback_base_url: get_env("GATEWAY_CALLBACK_BASE_URL")
                            .unwrap_or_else(|| "http://localhost:8080".to_string()),
                    },
                    email: EmailConfig {
                        api_key: get_env("EMAIL_API_KEY").unwrap_or_default(),
                        base_url: get_env("EMAIL_BASE_URL")
                            .unwrap_or_else(|| "https://api.mail.example.com".to_string()),
                        from_address: get_env("EMAIL_FROM_ADDRESS")
                            .unwrap_or_else(|| "no-reply@aihub.app".to_string()),
                    },
                    reconciler: ReconcilerConfig {
                        interval_secs: get_env_parse("RECONCILER_INTERVAL_SECS", 300u64),
                        lookback_days: get_env_parse("RECONCILER_LOOKBACK_DAYS", 7i64),
                    },
                }
            }
            Err(e) => {
                return Err(format!("Failed to read config file {config_path}: {e}").into());
            }
        };

        // Environment variables win over the file.
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            config.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            config.jwt.secret = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            config.jwt.access_token_expires_in = n;
        }
        if let Ok(v) = env::var("JWT_REFRESH_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            config.jwt.refresh_token_expires_in = n;
        }
        if let Ok(v) = env::var("GATEWAY_SECRET_KEY") {
            config.gateway.secret_key = v;
        }
        if let Ok(v) = env::var("GATEWAY_BASE_URL") {
            config.gateway.base_url = v;
        }
        if let Ok(v) = env::var("GATEWAY_CALLBACK_BASE_URL") {
            config.gateway.callback_base_url = v;
        }
        if let Ok(v) = env::var("EMAIL_API_KEY") {
            config.email.api_key = v;
        }
        if let Ok(v) = env::var("EMAIL_BASE_URL") {
            config.email.base_url = v;
        }
        if let Ok(v) = env::var("EMAIL_FROM_ADDRESS") {
            config.email.from_address = v;
        }
        if let Ok(v) = env::var("RECONCILER_INTERVAL_SECS")
            && let Ok(n) = v.parse()
        {
            config.reconciler.interval_secs = n;
        }
        if let Ok(v) = env::var("RECONCILER_LOOKBACK_DAYS")
            && let Ok(n) = v.parse()
        {
            config.reconciler.lookback_days = n;
        }

        Ok(config)
    }
}

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Sync API settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Without a database the API keeps documents in memory (development only).
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub body_limit_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            jwt_secret: required("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty()),
            body_limit_bytes: env::var("BODY_LIMIT_BYTES")
                .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
                .parse()?,
        })
    }
}

/// Settings for the `classbook` client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub data_dir: PathBuf,
    pub cloud_url: String,
    pub save_debounce: Duration,
    pub http_timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            data_dir: env::var("CLASSBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("classbook-data")),
            cloud_url: env::var("CLASSBOOK_CLOUD_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            save_debounce: Duration::from_millis(
                env::var("CLASSBOOK_SAVE_DEBOUNCE_MS")
                    .unwrap_or_else(|_| "1000".into())
                    .parse()?,
            ),
            http_timeout: Duration::from_secs(
                env::var("CLASSBOOK_HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".into())
                    .parse()?,
            ),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

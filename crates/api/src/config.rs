use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Path of the SQLite database file (default: `data/gifpress.db`).
    pub database_path: String,
    /// Directory for uploaded originals (default: `data/uploads`).
    pub upload_dir: PathBuf,
    /// Directory for compressed outputs (default: `data/outputs`).
    pub output_dir: PathBuf,
    /// Path of the frozen baseline prediction model.
    pub baseline_model_path: PathBuf,
    /// gifsicle binary to invoke (default: resolved from `PATH`).
    pub gifsicle_path: String,
    /// How long completed artifacts are retained. `None` keeps them
    /// indefinitely.
    pub retention_ttl: Option<Duration>,
    /// Worker count the pool starts with (default: `2`).
    pub default_concurrency: usize,
    /// Upper bound for runtime concurrency adjustment (default: `10`).
    pub max_concurrency: usize,
    /// Per-file upload size cap in bytes (default: 100 MiB).
    pub max_upload_bytes: usize,
    /// How often the reaper sweeps expired jobs (default: 60 s).
    pub reaper_interval: Duration,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    /// A single `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `300`, sized for large
    /// uploads).
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `HOST`                 | `0.0.0.0`               |
    /// | `PORT`                 | `3000`                  |
    /// | `DATABASE_PATH`        | `data/gifpress.db`      |
    /// | `UPLOAD_DIR`           | `data/uploads`          |
    /// | `OUTPUT_DIR`           | `data/outputs`          |
    /// | `BASELINE_MODEL_PATH`  | `model/baseline.json`   |
    /// | `GIFSICLE_PATH`        | `gifsicle`              |
    /// | `RETENTION_TTL_SECS`   | unset (keep forever)    |
    /// | `DEFAULT_CONCURRENCY`  | `2`                     |
    /// | `MAX_CONCURRENCY`      | `10`                    |
    /// | `MAX_UPLOAD_BYTES`     | `104857600`             |
    /// | `REAPER_INTERVAL_SECS` | `60`                    |
    /// | `CORS_ORIGINS`         | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS` | `300`                   |
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");
        let port: u16 = parse_env("PORT", "3000");

        let database_path = env_or("DATABASE_PATH", "data/gifpress.db");
        let upload_dir = PathBuf::from(env_or("UPLOAD_DIR", "data/uploads"));
        let output_dir = PathBuf::from(env_or("OUTPUT_DIR", "data/outputs"));
        let baseline_model_path = PathBuf::from(env_or("BASELINE_MODEL_PATH", "model/baseline.json"));
        let gifsicle_path = env_or("GIFSICLE_PATH", "gifsicle");

        // Empty or zero means artifacts are kept indefinitely.
        let retention_ttl = std::env::var("RETENTION_TTL_SECS")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                v.parse::<u64>()
                    .expect("RETENTION_TTL_SECS must be a valid u64")
            })
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        let default_concurrency: usize = parse_env("DEFAULT_CONCURRENCY", "2");
        let max_concurrency: usize = parse_env("MAX_CONCURRENCY", "10");
        let max_upload_bytes: usize = parse_env("MAX_UPLOAD_BYTES", "104857600");
        let reaper_interval = Duration::from_secs(parse_env("REAPER_INTERVAL_SECS", "60"));

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = parse_env("REQUEST_TIMEOUT_SECS", "300");

        Self {
            host,
            port,
            database_path,
            upload_dir,
            output_dir,
            baseline_model_path,
            gifsicle_path,
            retention_ttl,
            default_concurrency: default_concurrency.max(1),
            max_concurrency: max_concurrency.max(1),
            max_upload_bytes,
            reaper_interval,
            cors_origins,
            request_timeout_secs,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: &str) -> T
where
    T::Err: std::fmt::Debug,
{
    env_or(name, default)
        .parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid value: {e:?}"))
}

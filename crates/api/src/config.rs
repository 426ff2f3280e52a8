use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    ///
    /// Bounds the time to produce response headers; event streams stay open
    /// after their headers are sent.
    pub request_timeout_secs: u64,
    /// Directory holding the browser frontend (default: `frontend`).
    pub static_dir: String,
    /// Task orchestration settings.
    pub tasks: TaskConfig,
    /// External automation driver command line.
    pub driver: DriverConfig,
}

/// Task orchestration settings.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Maximum number of automation workers running at once.
    pub max_concurrent_jobs: usize,
    /// Wall-clock limit for a single job.
    pub job_timeout: Duration,
    /// How long a finished task stays attachable before it is reaped.
    pub retention: Duration,
    /// How often the retention sweep runs.
    pub sweep_interval: Duration,
    /// Idle period after which a stream sends a keepalive.
    pub stream_idle: Duration,
    /// Log lines buffered per task.
    pub channel_capacity: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            job_timeout: Duration::from_secs(900),
            retention: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            stream_idle: Duration::from_secs(15),
            channel_capacity: unistacker_events::DEFAULT_CAPACITY,
        }
    }
}

/// External automation driver command line.
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// Program to launch per job (`DRIVER_COMMAND`).
    pub command: Option<String>,
    /// Arguments, split on whitespace from `DRIVER_ARGS`.
    pub args: Vec<String>,
}

/// Read and parse an environment variable, falling back to `default`.
///
/// Panics if the variable is set but does not parse, so misconfiguration
/// fails at startup.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                  |
    /// |----------------------------|--------------------------|
    /// | `HOST`                     | `0.0.0.0`                |
    /// | `PORT`                     | `8000`                   |
    /// | `CORS_ORIGINS`             | `http://localhost:8000`  |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                     |
    /// | `STATIC_DIR`               | `frontend`               |
    /// | `MAX_CONCURRENT_JOBS`      | `4`                      |
    /// | `JOB_TIMEOUT_SECS`         | `900`                    |
    /// | `TASK_RETENTION_SECS`      | `600`                    |
    /// | `TASK_SWEEP_INTERVAL_SECS` | `60`                     |
    /// | `STREAM_IDLE_SECS`         | `15`                     |
    /// | `TASK_CHANNEL_CAPACITY`    | `1024`                   |
    /// | `DRIVER_COMMAND`           | unset                    |
    /// | `DRIVER_ARGS`              | empty                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("PORT", 8000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", 30);
        let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "frontend".into());

        let defaults = TaskConfig::default();
        let tasks = TaskConfig {
            max_concurrent_jobs: env_or("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs).max(1),
            job_timeout: Duration::from_secs(env_or(
                "JOB_TIMEOUT_SECS",
                defaults.job_timeout.as_secs(),
            )),
            retention: Duration::from_secs(env_or(
                "TASK_RETENTION_SECS",
                defaults.retention.as_secs(),
            )),
            sweep_interval: Duration::from_secs(
                env_or("TASK_SWEEP_INTERVAL_SECS", defaults.sweep_interval.as_secs()).max(1),
            ),
            stream_idle: Duration::from_secs(
                env_or("STREAM_IDLE_SECS", defaults.stream_idle.as_secs()).max(1),
            ),
            channel_capacity: env_or("TASK_CHANNEL_CAPACITY", defaults.channel_capacity),
        };

        let driver = DriverConfig {
            command: std::env::var("DRIVER_COMMAND")
                .ok()
                .filter(|c| !c.trim().is_empty()),
            args: std::env::var("DRIVER_ARGS")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            static_dir,
            tasks,
            driver,
        }
    }
}

pub mod backend;
pub mod domain;
pub mod error;
pub mod history;
pub mod mode;
pub mod orchestrator;
pub mod recency;
pub mod render;
pub mod session;
pub mod store;
pub mod time;
pub mod viewport;

pub use error::{AnalysisError, TransportError, ValidationError};
pub use orchestrator::AnalysisOrchestrator;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
    pub const DEFAULT_RECENT_CAPACITY: usize = 10;
    pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub backend_url: Option<String>,
        pub api_key: Option<String>,
        pub http_timeout_secs: u64,
        pub recent_capacity: usize,
        pub history_capacity: usize,
        pub data_dir: Option<PathBuf>,
        pub catalog_path: Option<PathBuf>,
        pub sentry_dsn: Option<String>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                backend_url: None,
                api_key: None,
                http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
                recent_capacity: DEFAULT_RECENT_CAPACITY,
                history_capacity: DEFAULT_HISTORY_CAPACITY,
                data_dir: None,
                catalog_path: None,
                sentry_dsn: None,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                backend_url: non_empty_var("KABU_BACKEND_URL"),
                api_key: non_empty_var("KABU_API_KEY"),
                http_timeout_secs: parsed_var("KABU_HTTP_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
                recent_capacity: parsed_var("KABU_RECENT_CAPACITY")?
                    .unwrap_or(DEFAULT_RECENT_CAPACITY),
                history_capacity: parsed_var("KABU_HISTORY_CAPACITY")?
                    .unwrap_or(DEFAULT_HISTORY_CAPACITY),
                data_dir: non_empty_var("KABU_DATA_DIR").map(PathBuf::from),
                catalog_path: non_empty_var("KABU_CATALOG_PATH").map(PathBuf::from),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }

        pub fn backend_url(&self) -> &str {
            self.backend_url.as_deref().unwrap_or(DEFAULT_BACKEND_URL)
        }

        /// Directory holding the durable key-value store.
        pub fn resolve_data_dir(&self) -> anyhow::Result<PathBuf> {
            if let Some(dir) = &self.data_dir {
                return Ok(dir.clone());
            }
            dirs::data_local_dir()
                .map(|d| d.join("kabu"))
                .context("no platform data directory; set KABU_DATA_DIR")
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            anyhow::ensure!(
                self.recent_capacity >= 1,
                "KABU_RECENT_CAPACITY must be >= 1"
            );
            anyhow::ensure!(
                self.history_capacity >= 1,
                "KABU_HISTORY_CAPACITY must be >= 1"
            );
            anyhow::ensure!(
                self.http_timeout_secs >= 1,
                "KABU_HTTP_TIMEOUT_SECS must be >= 1"
            );
            Ok(())
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn parsed_var<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        non_empty_var(key)
            .map(|s| s.parse::<T>().with_context(|| format!("{key} is not valid: {s}")))
            .transpose()
    }

}

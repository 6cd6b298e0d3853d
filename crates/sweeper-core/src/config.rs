use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TRIGGER_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_ITERATIONS: u64 = 10_000;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_NEO4J_ENDPOINT: &str = "http://localhost:7474/db/neo4j/tx/commit";

/// Top-level config (sweeper.toml + SWEEPER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
}

/// Where descriptor files live and how a pass over them behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Directory holding the descriptor files. Subdirectories are ignored.
    #[serde(default = "default_jobs_dir")]
    pub directory: String,
    /// Cadence of the recurring trigger. Per-descriptor intervals only decide
    /// whether a descriptor runs on a given pass.
    #[serde(default = "default_trigger_interval")]
    pub trigger_interval_secs: u64,
    /// Upper bound on drain-loop iterations per descriptor. 0 disables the cap.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    /// Timeout for a single backend call. 0 disables the timeout.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    /// IANA zone in which `lastExecutionTime` is written and read.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            directory: default_jobs_dir(),
            trigger_interval_secs: default_trigger_interval(),
            max_iterations: default_max_iterations(),
            query_timeout_secs: default_query_timeout(),
            timezone: default_timezone(),
        }
    }
}

/// Connection settings for the Neo4j transactional HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            username: None,
            password: None,
        }
    }
}

fn default_jobs_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sweeper/queries", home)
}
fn default_trigger_interval() -> u64 {
    DEFAULT_TRIGGER_INTERVAL_SECS
}
fn default_max_iterations() -> u64 {
    DEFAULT_MAX_ITERATIONS
}
fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_endpoint() -> String {
    DEFAULT_NEO4J_ENDPOINT.to_string()
}

impl SweeperConfig {
    /// Load config from a TOML file with SWEEPER_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `SWEEPER_JOBS__MAX_ITERATIONS=500`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        if !std::path::Path::new(&path).exists() {
            tracing::debug!("config file not found at {path}, using defaults and env");
        }

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("SWEEPER_").split("__")),
        )
    }

    /// Parse config from an in-memory TOML document (no env overrides).
    pub fn from_toml_str(toml: &str) -> crate::error::Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        let config: SweeperConfig = figment
            .extract()
            .map_err(|e| crate::error::SweeperError::Config(e.to_string()))?;
        config.timezone()?;
        Ok(config)
    }

    /// The configured time zone, validated against the IANA database.
    pub fn timezone(&self) -> crate::error::Result<chrono_tz::Tz> {
        self.jobs.timezone.parse::<chrono_tz::Tz>().map_err(|_| {
            crate::error::SweeperError::Config(format!(
                "unknown timezone: {}",
                self.jobs.timezone
            ))
        })
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sweeper/sweeper.toml", home)
}

//! Server configuration loading from file and environment variables.

use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Authorization store.
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    /// Heartbeat aggregation and liveness sweeps.
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub producers: ProducersConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long workers may take to finish their in-flight job on shutdown.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

/// SQLite settings for the authorization store.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Durable job queue settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Path to the SQLite file holding queued jobs.
    #[serde(default = "default_queue_path")]
    pub path: String,

    /// Seconds a claimed job stays invisible before it is redelivered.
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u64,

    /// Upper bound on a single queue operation.
    #[serde(default = "default_queue_op_timeout_ms")]
    pub op_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Liveness monitoring settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Maximum tolerated silence. Defaults to twice the sweep interval.
    #[serde(default)]
    pub threshold_seconds: Option<u64>,

    /// Services the sweeper checks on every tick.
    #[serde(default = "default_watch_list")]
    pub watch_list: Vec<String>,

    /// Name under which allowed events are recorded in the liveness map.
    #[serde(default = "default_event_source")]
    pub event_source: String,
}

/// Which record a producer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKindConfig {
    Heartbeat,
    Event,
}

/// One producer node.
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerInstanceConfig {
    /// Service name carried in heartbeats and used in logs.
    pub name: String,

    pub kind: ProducerKindConfig,

    /// Overrides `producers.interval_seconds` for this producer.
    #[serde(default)]
    pub interval_seconds: Option<u64>,
}

/// Settings shared by every producer.
#[derive(Debug, Clone, Deserialize)]
pub struct ProducersConfig {
    #[serde(default = "default_produce_interval_seconds")]
    pub interval_seconds: u64,

    /// Offset used when rendering producer timestamps, e.g. `-05:00`.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,

    /// Upper bound (inclusive) of generated subject ids.
    #[serde(default = "default_subject_id_max")]
    pub subject_id_max: i64,

    /// Countries event producers draw from.
    #[serde(default = "default_countries")]
    pub countries: Vec<String>,

    /// Producer nodes. Defaults to three heartbeat producers named after
    /// the default watch list and one event producer.
    #[serde(default = "default_producer_instances")]
    pub instances: Vec<ProducerInstanceConfig>,
}

/// Queue consumer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops. Zero disables the worker.
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,

    /// Timeout of the forward call to a reporter.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Pause before polling again when the queue is empty.
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// Job type to reporter URL. When empty, both job types are routed to
    /// this server's own reporting endpoints.
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
}

/// A subject registered at startup unless already present.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedAuthorization {
    pub subject_id: i64,
    pub origin_country: String,
    #[serde(default = "default_true")]
    pub access_enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub seed: Vec<SeedAuthorization>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "heartwatch_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Directory for daily-rolled log files. Console only when unset.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_shutdown_grace_seconds() -> u64 {
    10
}

fn default_db_path() -> String {
    "heartwatch.db".to_string()
}

fn default_queue_path() -> String {
    "heartwatch-queue.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_lease_seconds() -> u64 {
    30
}

fn default_queue_op_timeout_ms() -> u64 {
    5_000
}

fn default_sweep_interval_seconds() -> u64 {
    3
}

fn default_watch_list() -> Vec<String> {
    (1..=3).map(|n| format!("modulo-pedidos-{n}")).collect()
}

fn default_event_source() -> String {
    "logistica".to_string()
}

fn default_produce_interval_seconds() -> u64 {
    5
}

fn default_utc_offset() -> String {
    "-05:00".to_string()
}

fn default_subject_id_max() -> i64 {
    20
}

fn default_countries() -> Vec<String> {
    ["CO", "MX", "PE", "VE", "BR", "AR", "CL", "UY"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_producer_instances() -> Vec<ProducerInstanceConfig> {
    let heartbeats = default_watch_list()
        .into_iter()
        .map(|name| ProducerInstanceConfig {
            name,
            kind: ProducerKindConfig::Heartbeat,
            interval_seconds: None,
        });
    let events = std::iter::once(ProducerInstanceConfig {
        name: default_event_source(),
        kind: ProducerKindConfig::Event,
        interval_seconds: None,
    });
    heartbeats.chain(events).collect()
}

fn default_worker_concurrency() -> usize {
    1
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_idle_backoff_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            lease_seconds: default_lease_seconds(),
            op_timeout_ms: default_queue_op_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval_seconds(),
            threshold_seconds: None,
            watch_list: default_watch_list(),
            event_source: default_event_source(),
        }
    }
}

impl Default for ProducersConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_produce_interval_seconds(),
            utc_offset: default_utc_offset(),
            subject_id_max: default_subject_id_max(),
            countries: default_countries(),
            instances: default_producer_instances(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_worker_concurrency(),
            request_timeout_ms: default_request_timeout_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            routes: BTreeMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

impl MonitorConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn threshold(&self) -> Duration {
        match self.threshold_seconds {
            Some(secs) => Duration::from_secs(secs),
            None => self.sweep_interval().saturating_mul(2),
        }
    }
}

impl ProducersConfig {
    /// Parses [`Self::utc_offset`].
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset
            .trim()
            .parse::<FixedOffset>()
            .map_err(|_| ConfigError::Invalid(format!("invalid producers.utc_offset: {}", self.utc_offset)))
    }

    pub fn interval_for(&self, instance: &ProducerInstanceConfig) -> Duration {
        Duration::from_secs(instance.interval_seconds.unwrap_or(self.interval_seconds))
    }
}

impl WorkerConfig {
    /// Routes with the defaults filled in for `server`.
    ///
    /// An unspecified bind address is replaced by loopback so the worker
    /// can reach its own process.
    pub fn resolved_routes(&self, server: &ServerConfig) -> BTreeMap<String, String> {
        if !self.routes.is_empty() {
            return self.routes.clone();
        }

        let host = if server.host.is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            server.host
        };
        let base = format!("http://{}", SocketAddr::new(host, server.port));

        BTreeMap::from([
            (
                heartwatch_types::HEARTBEAT_JOB.to_string(),
                format!("{base}/report/heartbeat"),
            ),
            (
                heartwatch_types::EVENT_JOB.to_string(),
                format!("{base}/report/event"),
            ),
        ])
    }
}

/// Longest accepted interval or threshold, in seconds (one day).
pub const MAX_INTERVAL_SECONDS: u64 = 86_400;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides and validates the result.
///
/// Environment variable overrides:
/// - `HEARTWATCH_HOST` overrides `server.host`
/// - `HEARTWATCH_PORT` overrides `server.port`
/// - `HEARTWATCH_DB_PATH` overrides `database.path`
/// - `HEARTWATCH_QUEUE_PATH` overrides `queue.path`
/// - `HEARTWATCH_SWEEP_INTERVAL_SECONDS` overrides `monitor.sweep_interval_seconds`
/// - `HEARTWATCH_PRODUCE_INTERVAL_SECONDS` overrides `producers.interval_seconds`
/// - `HEARTWATCH_LOG_DIR` overrides `logging.directory`
/// - `HEARTWATCH_LOG_LEVEL` overrides `logging.level`
/// - `HEARTWATCH_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the final configuration fails [`validate`].
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

/// Applies `HEARTWATCH_*` overrides read through `lookup`.
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("HEARTWATCH_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("HEARTWATCH_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = lookup("HEARTWATCH_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(queue_path) = lookup("HEARTWATCH_QUEUE_PATH") {
        config.queue.path = queue_path;
    }
    if let Some(secs) = lookup("HEARTWATCH_SWEEP_INTERVAL_SECONDS") {
        if let Ok(parsed) = secs.parse() {
            config.monitor.sweep_interval_seconds = parsed;
        }
    }
    if let Some(secs) = lookup("HEARTWATCH_PRODUCE_INTERVAL_SECONDS") {
        if let Ok(parsed) = secs.parse() {
            config.producers.interval_seconds = parsed;
        }
    }
    if let Some(dir) = lookup("HEARTWATCH_LOG_DIR") {
        config.logging.directory = Some(dir).filter(|d| !d.trim().is_empty());
    }
    if let Some(level) = lookup("HEARTWATCH_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("HEARTWATCH_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

/// Rejects configurations the server cannot run with.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` describing the first problem found.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

    if config.monitor.sweep_interval_seconds == 0 {
        return invalid("monitor.sweep_interval_seconds must be greater than zero");
    }
    if config.monitor.threshold_seconds == Some(0) {
        return invalid("monitor.threshold_seconds must be greater than zero");
    }
    if config.monitor.sweep_interval_seconds > MAX_INTERVAL_SECONDS
        || config
            .monitor
            .threshold_seconds
            .is_some_and(|secs| secs > MAX_INTERVAL_SECONDS)
    {
        return invalid("monitor intervals must not exceed one day");
    }
    if config.monitor.event_source.trim().is_empty() {
        return invalid("monitor.event_source must not be empty");
    }
    if config.queue.lease_seconds == 0 || config.queue.op_timeout_ms == 0 {
        return invalid("queue.lease_seconds and queue.op_timeout_ms must be greater than zero");
    }
    if config.producers.interval_seconds == 0
        || config
            .producers
            .instances
            .iter()
            .any(|p| p.interval_seconds == Some(0))
    {
        return invalid("producer intervals must be greater than zero");
    }
    if config.producers.interval_seconds > MAX_INTERVAL_SECONDS
        || config
            .producers
            .instances
            .iter()
            .any(|p| p.interval_seconds.is_some_and(|secs| secs > MAX_INTERVAL_SECONDS))
    {
        return invalid("producer intervals must not exceed one day");
    }
    if config.producers.instances.iter().any(|p| p.name.trim().is_empty()) {
        return invalid("producer names must not be empty");
    }
    let has_event_producer = config
        .producers
        .instances
        .iter()
        .any(|p| p.kind == ProducerKindConfig::Event);
    if has_event_producer {
        if config.producers.subject_id_max < 1 {
            return invalid("producers.subject_id_max must be at least 1");
        }
        if config.producers.countries.iter().all(|c| c.trim().is_empty()) {
            return invalid("producers.countries must contain at least one country");
        }
    }
    config.producers.offset()?;
    if config.worker.request_timeout_ms == 0 {
        return invalid("worker.request_timeout_ms must be greater than zero");
    }
    if config
        .worker
        .routes
        .iter()
        .any(|(job_type, url)| job_type.trim().is_empty() || url.trim().is_empty())
    {
        return invalid("worker.routes must map non-empty job types to non-empty URLs");
    }
    if config
        .access
        .seed
        .iter()
        .any(|s| s.origin_country.trim().is_empty())
    {
        return invalid("access.seed entries need an origin_country");
    }

    Ok(())
}

use serde::{Deserialize, Serialize};

/// Main configuration structure for taskwarden
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Dispatch and retry configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Weights of the ready-task score
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Escalation delivery configuration
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Size of the worker pool (1-100)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Hours without a status change before a non-terminal task counts as stalled
    #[serde(default = "default_stall_threshold_hours")]
    pub stall_threshold_hours: u64,

    /// Retry budget for tasks that do not set their own
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// How many times a dispatcher re-reads a task after a ledger conflict
    #[serde(default = "default_claim_attempts")]
    pub claim_attempts: u32,
}

const fn default_max_workers() -> usize {
    4
}

const fn default_stall_threshold_hours() -> u64 {
    24
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_claim_attempts() -> u32 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            stall_threshold_hours: default_stall_threshold_hours(),
            default_max_retries: default_max_retries(),
            claim_attempts: default_claim_attempts(),
        }
    }
}

/// Weights for the ready-task score. Must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoringConfig {
    #[serde(default = "default_dependency_weight")]
    pub dependency_weight: f64,

    #[serde(default = "default_complexity_weight")]
    pub complexity_weight: f64,

    #[serde(default = "default_availability_weight")]
    pub availability_weight: f64,

    #[serde(default = "default_urgency_weight")]
    pub urgency_weight: f64,

    /// Deadlines further out than this contribute no urgency
    #[serde(default = "default_time_horizon_hours")]
    pub time_horizon_hours: u64,
}

const fn default_dependency_weight() -> f64 {
    0.3
}

const fn default_complexity_weight() -> f64 {
    0.2
}

const fn default_availability_weight() -> f64 {
    0.2
}

const fn default_urgency_weight() -> f64 {
    0.3
}

const fn default_time_horizon_hours() -> u64 {
    72
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            dependency_weight: default_dependency_weight(),
            complexity_weight: default_complexity_weight(),
            availability_weight: default_availability_weight(),
            urgency_weight: default_urgency_weight(),
            time_horizon_hours: default_time_horizon_hours(),
        }
    }
}

impl ScoringConfig {
    pub fn weight_sum(&self) -> f64 {
        self.dependency_weight + self.complexity_weight + self.availability_weight + self.urgency_weight
    }
}

/// Escalation delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EscalationConfig {
    /// Operator webhook; escalations are only logged when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Delivery attempts before giving up
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_delivery_attempts() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_delivery_attempts: default_max_delivery_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file; the in-memory ledger is used when empty
    #[serde(default)]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

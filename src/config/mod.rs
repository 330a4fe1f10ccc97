use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub analysis: AnalysisConfig,
}

/// Generation gateway API configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Gateway pipe name configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Pipe used for questions, root cause extraction and reports.
    pub generator: String,
    /// Pipe used for answer validation and cause classification.
    pub validator: String,
    /// Evidence analysis pipe. `None` disables evidence features.
    pub vision: Option<String>,
}

/// How the final report is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStrategy {
    /// One generation call per report section.
    Sections,
    /// A single call with a large token budget.
    Single,
}

/// 5 Whys session tuning
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub max_depth: u32,
    pub early_stop_min_iteration: u32,
    pub report_strategy: ReportStrategy,
    pub report_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let gateway = GatewayConfig {
            api_key: env::var("GATEWAY_API_KEY").map_err(|_| AppError::Config {
                message: "GATEWAY_API_KEY is required".to_string(),
            })?,
            base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/rca.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120_000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let pipes = PipeConfig {
            generator: env::var("PIPE_GENERATOR")
                .unwrap_or_else(|_| "rca-generator-v1".to_string()),
            validator: env::var("PIPE_VALIDATOR")
                .unwrap_or_else(|_| "rca-validator-v1".to_string()),
            vision: env::var("PIPE_VISION").ok().filter(|s| !s.trim().is_empty()),
        };

        let max_depth = env::var("RCA_MAX_DEPTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        if max_depth == 0 {
            return Err(AppError::Config {
                message: "RCA_MAX_DEPTH must be at least 1".to_string(),
            });
        }

        let analysis = AnalysisConfig {
            max_depth,
            early_stop_min_iteration: env::var("RCA_EARLY_STOP_MIN_ITERATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            report_strategy: match env::var("RCA_REPORT_STRATEGY")
                .unwrap_or_else(|_| "sections".to_string())
                .to_lowercase()
                .as_str()
            {
                "single" => ReportStrategy::Single,
                _ => ReportStrategy::Sections,
            },
            report_dir: PathBuf::from(
                env::var("RCA_REPORT_DIR").unwrap_or_else(|_| "./reports".to_string()),
            ),
        };

        Ok(Config {
            gateway,
            database,
            logging,
            request,
            pipes,
            analysis,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            max_retries: 0,
            retry_delay_ms: 1000,
        }
    }
}

impl RequestConfig {
    /// Backoff before retry number `retry` (1-based), doubling each time.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 2_u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor))
    }

    /// Upper bound for one gateway operation: every attempt plus every backoff.
    pub fn operation_timeout(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        let backoff = (1..=self.max_retries)
            .map(|retry| self.retry_delay(retry))
            .fold(Duration::ZERO, Duration::saturating_add);
        Duration::from_millis(self.timeout_ms)
            .saturating_mul(attempts)
            .saturating_add(backoff)
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            generator: "rca-generator-v1".to_string(),
            validator: "rca-validator-v1".to_string(),
            vision: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            early_stop_min_iteration: 4,
            report_strategy: ReportStrategy::Sections,
            report_dir: PathBuf::from("./reports"),
        }
    }
}

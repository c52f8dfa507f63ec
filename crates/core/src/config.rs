use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Solver;
use crate::upstream::TargetFormat;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["pricelens.toml", "config/pricelens.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub transformation: TransformationConfig,
    pub analysis: AnalysisConfig,
    pub resilience: ResilienceConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct TransformationConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub format: TargetFormat,
}

#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    /// Budget for one attempt, covering job submission and polling.
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub solver: Solver,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResilienceConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub ttl_secs: u64,
    pub capacity: usize,
    pub redis_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Memory,
    Redis,
}

impl CacheBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub transformation_base_url: Option<String>,
    pub analysis_base_url: Option<String>,
    pub cache_backend: Option<CacheBackend>,
    pub redis_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transformation: TransformationConfig {
                base_url: "http://localhost:8002".to_string(),
                api_key: None,
                timeout_secs: 30,
                format: TargetFormat::Pricing2Yaml,
            },
            analysis: AnalysisConfig {
                base_url: "http://localhost:8080".to_string(),
                api_key: None,
                timeout_secs: 120,
                poll_interval_ms: 2_000,
                solver: Solver::Minizinc,
            },
            resilience: ResilienceConfig {
                max_attempts: 3,
                base_backoff_ms: 500,
                max_backoff_ms: 8_000,
                jitter: true,
                failure_threshold: 5,
                cooldown_secs: 30,
            },
            cache: CacheConfig {
                backend: CacheBackend::Memory,
                ttl_secs: 3_600,
                capacity: 512,
                redis_url: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl TransformationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl ServerConfig {
    pub fn graceful_shutdown(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_secs)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::Validation(format!(
                "unsupported cache backend `{other}` (expected memory|redis)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(transformation) = patch.transformation {
            if let Some(base_url) = transformation.base_url {
                self.transformation.base_url = base_url;
            }
            if let Some(api_key) = transformation.api_key {
                self.transformation.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = transformation.timeout_secs {
                self.transformation.timeout_secs = timeout_secs;
            }
            if let Some(format) = transformation.format {
                self.transformation.format = format;
            }
        }

        if let Some(analysis) = patch.analysis {
            if let Some(base_url) = analysis.base_url {
                self.analysis.base_url = base_url;
            }
            if let Some(api_key) = analysis.api_key {
                self.analysis.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = analysis.timeout_secs {
                self.analysis.timeout_secs = timeout_secs;
            }
            if let Some(poll_interval_ms) = analysis.poll_interval_ms {
                self.analysis.poll_interval_ms = poll_interval_ms;
            }
            if let Some(solver) = analysis.solver {
                self.analysis.solver = solver;
            }
        }

        if let Some(resilience) = patch.resilience {
            if let Some(max_attempts) = resilience.max_attempts {
                self.resilience.max_attempts = max_attempts;
            }
            if let Some(base_backoff_ms) = resilience.base_backoff_ms {
                self.resilience.base_backoff_ms = base_backoff_ms;
            }
            if let Some(max_backoff_ms) = resilience.max_backoff_ms {
                self.resilience.max_backoff_ms = max_backoff_ms;
            }
            if let Some(jitter) = resilience.jitter {
                self.resilience.jitter = jitter;
            }
            if let Some(failure_threshold) = resilience.failure_threshold {
                self.resilience.failure_threshold = failure_threshold;
            }
            if let Some(cooldown_secs) = resilience.cooldown_secs {
                self.resilience.cooldown_secs = cooldown_secs;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(backend) = cache.backend {
                self.cache.backend = backend;
            }
            if let Some(ttl_secs) = cache.ttl_secs {
                self.cache.ttl_secs = ttl_secs;
            }
            if let Some(capacity) = cache.capacity {
                self.cache.capacity = capacity;
            }
            if let Some(redis_url) = cache.redis_url {
                self.cache.redis_url = Some(redis_url);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PRICELENS_TRANSFORMATION_BASE_URL") {
            self.transformation.base_url = value;
        }
        if let Some(value) = read_env("PRICELENS_TRANSFORMATION_API_KEY") {
            self.transformation.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PRICELENS_TRANSFORMATION_TIMEOUT_SECS") {
            self.transformation.timeout_secs =
                parse_u64("PRICELENS_TRANSFORMATION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_TRANSFORMATION_FORMAT") {
            self.transformation.format = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "PRICELENS_TRANSFORMATION_FORMAT".to_string(),
                value: value.clone(),
            })?;
        }

        if let Some(value) = read_env("PRICELENS_ANALYSIS_BASE_URL") {
            self.analysis.base_url = value;
        }
        if let Some(value) = read_env("PRICELENS_ANALYSIS_API_KEY") {
            self.analysis.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PRICELENS_ANALYSIS_TIMEOUT_SECS") {
            self.analysis.timeout_secs = parse_u64("PRICELENS_ANALYSIS_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_ANALYSIS_POLL_INTERVAL_MS") {
            self.analysis.poll_interval_ms =
                parse_u64("PRICELENS_ANALYSIS_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_ANALYSIS_SOLVER") {
            self.analysis.solver = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "PRICELENS_ANALYSIS_SOLVER".to_string(),
                value: value.clone(),
            })?;
        }

        if let Some(value) = read_env("PRICELENS_RESILIENCE_MAX_ATTEMPTS") {
            self.resilience.max_attempts = parse_u32("PRICELENS_RESILIENCE_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_RESILIENCE_BASE_BACKOFF_MS") {
            self.resilience.base_backoff_ms =
                parse_u64("PRICELENS_RESILIENCE_BASE_BACKOFF_MS", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_RESILIENCE_MAX_BACKOFF_MS") {
            self.resilience.max_backoff_ms =
                parse_u64("PRICELENS_RESILIENCE_MAX_BACKOFF_MS", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_RESILIENCE_JITTER") {
            self.resilience.jitter = parse_bool("PRICELENS_RESILIENCE_JITTER", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_RESILIENCE_FAILURE_THRESHOLD") {
            self.resilience.failure_threshold =
                parse_u32("PRICELENS_RESILIENCE_FAILURE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_RESILIENCE_COOLDOWN_SECS") {
            self.resilience.cooldown_secs =
                parse_u64("PRICELENS_RESILIENCE_COOLDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("PRICELENS_CACHE_BACKEND") {
            self.cache.backend = value.parse()?;
        }
        if let Some(value) = read_env("PRICELENS_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_u64("PRICELENS_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_CACHE_CAPACITY") {
            self.cache.capacity = parse_usize("PRICELENS_CACHE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(value);
        }

        if let Some(value) = read_env("PRICELENS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PRICELENS_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("PRICELENS_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("PRICELENS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PRICELENS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("PRICELENS_LOGGING_LEVEL").or_else(|| read_env("PRICELENS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PRICELENS_LOGGING_FORMAT").or_else(|| read_env("PRICELENS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.transformation_base_url {
            self.transformation.base_url = base_url;
        }
        if let Some(base_url) = overrides.analysis_base_url {
            self.analysis.base_url = base_url;
        }
        if let Some(backend) = overrides.cache_backend {
            self.cache.backend = backend;
        }
        if let Some(redis_url) = overrides.redis_url {
            self.cache.redis_url = Some(redis_url);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_transformation(&self.transformation)?;
        validate_analysis(&self.analysis)?;
        validate_resilience(&self.resilience)?;
        validate_cache(&self.cache)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_base_url(key: &str, url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{key} must start with http:// or https:// (got `{url}`)"
        )));
    }
    Ok(())
}

fn validate_api_key(key: &str, api_key: Option<&SecretString>) -> Result<(), ConfigError> {
    let blank = api_key.map(|value| value.expose_secret().trim().is_empty()).unwrap_or(false);
    if blank {
        return Err(ConfigError::Validation(format!(
            "{key} is set but empty; remove it or provide the upstream API key"
        )));
    }
    Ok(())
}

fn validate_transformation(transformation: &TransformationConfig) -> Result<(), ConfigError> {
    validate_base_url("transformation.base_url", &transformation.base_url)?;
    validate_api_key("transformation.api_key", transformation.api_key.as_ref())?;

    if transformation.timeout_secs == 0 || transformation.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "transformation.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_analysis(analysis: &AnalysisConfig) -> Result<(), ConfigError> {
    validate_base_url("analysis.base_url", &analysis.base_url)?;
    validate_api_key("analysis.api_key", analysis.api_key.as_ref())?;

    if analysis.timeout_secs == 0 || analysis.timeout_secs > 1_800 {
        return Err(ConfigError::Validation(
            "analysis.timeout_secs must be in range 1..=1800".to_string(),
        ));
    }

    if analysis.poll_interval_ms == 0 || analysis.poll_interval_ms >= analysis.timeout_secs * 1_000 {
        return Err(ConfigError::Validation(
            "analysis.poll_interval_ms must be greater than zero and shorter than analysis.timeout_secs"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_resilience(resilience: &ResilienceConfig) -> Result<(), ConfigError> {
    if resilience.max_attempts == 0 || resilience.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "resilience.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if resilience.base_backoff_ms > resilience.max_backoff_ms {
        return Err(ConfigError::Validation(
            "resilience.base_backoff_ms must not exceed resilience.max_backoff_ms".to_string(),
        ));
    }

    if resilience.failure_threshold == 0 {
        return Err(ConfigError::Validation(
            "resilience.failure_threshold must be greater than zero".to_string(),
        ));
    }

    if resilience.cooldown_secs == 0 {
        return Err(ConfigError::Validation(
            "resilience.cooldown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.ttl_secs == 0 {
        return Err(ConfigError::Validation("cache.ttl_secs must be greater than zero".to_string()));
    }

    if cache.capacity == 0 {
        return Err(ConfigError::Validation("cache.capacity must be greater than zero".to_string()));
    }

    if cache.backend == CacheBackend::Redis {
        let url = cache.redis_url.as_deref().map(str::trim).unwrap_or_default();
        if url.is_empty() {
            return Err(ConfigError::Validation(
                "cache.redis_url is required when cache.backend = \"redis\" (for example `redis://127.0.0.1:6379`)"
                    .to_string(),
            ));
        }
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(ConfigError::Validation(
                "cache.redis_url must start with redis:// or rediss://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    transformation: Option<TransformationPatch>,
    analysis: Option<AnalysisPatch>,
    resilience: Option<ResiliencePatch>,
    cache: Option<CachePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TransformationPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    format: Option<TargetFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    solver: Option<Solver>,
}

#[derive(Debug, Default, Deserialize)]
struct ResiliencePatch {
    max_attempts: Option<u32>,
    base_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    jitter: Option<bool>,
    failure_threshold: Option<u32>,
    cooldown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    backend: Option<CacheBackend>,
    ttl_secs: Option<u64>,
    capacity: Option<usize>,
    redis_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, CacheBackend, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::Solver;
    use crate::upstream::TargetFormat;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_any_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.transformation.format == TargetFormat::Pricing2Yaml, "default format")?;
        ensure(config.analysis.solver == Solver::Minizinc, "default solver")?;
        ensure(config.resilience.max_attempts == 3, "three attempts by default")?;
        ensure(config.resilience.failure_threshold == 5, "five failures open the circuit")?;
        ensure(config.cache.backend == CacheBackend::Memory, "memory cache by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_PRICELENS_ANALYSIS_KEY", "analysis-key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("pricelens.toml");
            fs::write(
                &path,
                r#"
[analysis]
base_url = "https://analysis.internal"
api_key = "${TEST_PRICELENS_ANALYSIS_KEY}"
solver = "choco"

[transformation]
format = "json"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.analysis.api_key.as_ref().map(|key| key.expose_secret())
                    == Some("analysis-key-from-env"),
                "api key should be interpolated from environment",
            )?;
            ensure(config.analysis.solver == Solver::Choco, "solver should come from file")?;
            ensure(config.transformation.format == TargetFormat::Json, "format from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_PRICELENS_ANALYSIS_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PRICELENS_LOG_LEVEL", "warn");
        env::set_var("PRICELENS_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["PRICELENS_LOG_LEVEL", "PRICELENS_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PRICELENS_TRANSFORMATION_BASE_URL", "http://from-env:8002");
        env::set_var("PRICELENS_RESILIENCE_COOLDOWN_SECS", "45");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("pricelens.toml");
            fs::write(
                &path,
                r#"
[transformation]
base_url = "http://from-file:8002"

[analysis]
base_url = "http://from-file:8080"

[resilience]
cooldown_secs = 10
failure_threshold = 7

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    analysis_base_url: Some("http://from-override:8080".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.transformation.base_url == "http://from-env:8002",
                "env transformation url should win over file",
            )?;
            ensure(
                config.analysis.base_url == "http://from-override:8080",
                "override analysis url should win",
            )?;
            ensure(config.resilience.cooldown_secs == 45, "env cooldown should win over file")?;
            ensure(config.resilience.failure_threshold == 7, "file threshold should win over default")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["PRICELENS_TRANSFORMATION_BASE_URL", "PRICELENS_RESILIENCE_COOLDOWN_SECS"]);
        result
    }

    #[test]
    fn redis_backend_requires_url() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PRICELENS_CACHE_BACKEND", "redis");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("cache.redis_url")
            );
            ensure(has_message, "validation failure should mention cache.redis_url")?;

            let config = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    redis_url: Some("redis://127.0.0.1:6379".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.cache.backend == CacheBackend::Redis, "redis backend from env")
        })();

        clear_vars(&["PRICELENS_CACHE_BACKEND"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PRICELENS_RESILIENCE_MAX_ATTEMPTS", "three");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "PRICELENS_RESILIENCE_MAX_ATTEMPTS", "error names the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid override error".to_string()),
        };

        clear_vars(&["PRICELENS_RESILIENCE_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PRICELENS_TRANSFORMATION_API_KEY", "transform-secret-value");
        env::set_var("PRICELENS_ANALYSIS_API_KEY", "analysis-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("transform-secret-value"),
                "debug output should not contain transformation key",
            )?;
            ensure(
                !debug.contains("analysis-secret-value"),
                "debug output should not contain analysis key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["PRICELENS_TRANSFORMATION_API_KEY", "PRICELENS_ANALYSIS_API_KEY"]);
        result
    }
}

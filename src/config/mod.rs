use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// 单节点 TTL 缓存 (redis)
    Redis,
    /// 分布式一致性存储 (etcd)
    Etcd,
    /// 进程内存储，用于本地开发和测试
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "etcd" => Ok(StoreBackend::Etcd),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid {
                key: "KV_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub backend: StoreBackend,
    pub redis_url: String,
    pub etcd_endpoints: Vec<String>,
    pub sentry_dsn: Option<String>,
    pub store_timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub increment_timeout_secs: u64,
    pub counter_ttl_days: u64,
    pub quota_enforcement: bool,
    pub default_monthly_limit: Option<i64>,
    pub trial_prefix: String,
    pub trial_suffix: String,
    pub increment_workers: usize,
    pub increment_queue_capacity: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            environment: "development".to_string(),
            backend: StoreBackend::Redis,
            redis_url: "redis://@localhost:6379".to_string(),
            etcd_endpoints: vec!["localhost:2379".to_string()],
            sentry_dsn: None,
            store_timeout_secs: 10,
            health_timeout_secs: 5,
            increment_timeout_secs: 10,
            counter_ttl_days: 40,
            quota_enforcement: true,
            default_monthly_limit: None,
            trial_prefix: "trial".to_string(),
            trial_suffix: "@pesto.teknologiumum.com".to_string(),
            increment_workers: 4,
            increment_queue_capacity: 1024,
            shutdown_grace_secs: 10,
        }
    }
}

impl Config {
    /// 从环境变量加载配置，`.env` 文件优先载入
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过查找函数构建配置，未设置的变量使用默认值
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            server_host: get("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or(&get, "PORT", defaults.server_port)?,
            environment: get("ENVIRONMENT").unwrap_or(defaults.environment),
            backend: match get("KV_BACKEND") {
                Some(v) => v.parse()?,
                None => defaults.backend,
            },
            redis_url: get("REDIS_URL").unwrap_or(defaults.redis_url),
            etcd_endpoints: get("ETCD_URL")
                .map(|v| split_endpoints(&v))
                .unwrap_or(defaults.etcd_endpoints),
            sentry_dsn: get("SENTRY_DSN"),
            store_timeout_secs: parse_or(&get, "STORE_TIMEOUT_SECS", defaults.store_timeout_secs)?,
            health_timeout_secs: parse_or(&get, "HEALTH_TIMEOUT_SECS", defaults.health_timeout_secs)?,
            increment_timeout_secs: parse_or(
                &get,
                "INCREMENT_TIMEOUT_SECS",
                defaults.increment_timeout_secs,
            )?,
            counter_ttl_days: parse_or(&get, "COUNTER_TTL_DAYS", defaults.counter_ttl_days)?,
            quota_enforcement: parse_bool_or(&get, "QUOTA_ENFORCEMENT", defaults.quota_enforcement)?,
            default_monthly_limit: match get("DEFAULT_MONTHLY_LIMIT") {
                Some(v) => Some(parse_value("DEFAULT_MONTHLY_LIMIT", &v)?),
                None => None,
            },
            trial_prefix: get("TRIAL_PREFIX").unwrap_or(defaults.trial_prefix),
            trial_suffix: get("TRIAL_SUFFIX").unwrap_or(defaults.trial_suffix),
            increment_workers: parse_or(&get, "INCREMENT_WORKERS", defaults.increment_workers)?
                .max(1),
            increment_queue_capacity: parse_or(
                &get,
                "INCREMENT_QUEUE_CAPACITY",
                defaults.increment_queue_capacity,
            )?
            .max(1),
            shutdown_grace_secs: parse_or(&get, "SHUTDOWN_GRACE_SECS", defaults.shutdown_grace_secs)?,
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn increment_timeout(&self) -> Duration {
        Duration::from_secs(self.increment_timeout_secs)
    }

    pub fn counter_ttl(&self) -> Duration {
        Duration::from_secs(self.counter_ttl_days * 24 * 60 * 60)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn split_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: raw }),
        },
        None => Ok(default),
    }
}

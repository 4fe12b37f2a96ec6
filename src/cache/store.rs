use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::cache::backends::{EtcdStore, MemoryStore, RedisStore};
use crate::config::{Config, StoreBackend};

/// 写入时的过期策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// 不设置过期时间
    Never,
    /// 保留键当前的过期时间；键不存在时等同于 `Never`
    KeepExisting,
    /// 指定时长后过期
    After(Duration),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("etcd: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("counter {key} still contended after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    #[error("value at {key} is invalid: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("unknown endpoint {0}")]
    UnknownEndpoint(String),
}

/// 键值存储的统一能力
///
/// 不同后端对外行为一致：键不存在返回 `Ok(None)`，只有后端故障才返回错误。
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// 原子地加一并返回新值，同时把过期时间设为 `ttl`
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    fn endpoints(&self) -> Vec<String>;

    async fn health(&self, endpoint: &str) -> Result<(), StoreError>;
}

/// 给存储操作加上截止时间，超时视为存储故障
pub async fn with_deadline<T, F>(limit: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    Deadline::after(limit).run(operation).await
}

/// 一次请求内所有存储操作共用的截止时间
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// 在剩余时间内执行，前面的操作耗掉的时间不会归还
    pub async fn run<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout_at(self.at, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.budget)),
        }
    }
}

/// 按配置连接存储后端
pub async fn connect(config: &Config) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
        StoreBackend::Etcd => Arc::new(
            EtcdStore::connect(config.etcd_endpoints.clone(), config.health_timeout()).await?,
        ),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    tracing::info!(backend = ?config.backend, endpoints = ?store.endpoints(), "store connected");
    Ok(store)
}

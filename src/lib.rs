use std::sync::Arc;

use cache::{HealthProber, KeyValueStore, QuotaCounter, TokenRepository};
use cache::operations::QuotaPolicy;
use config::Config;
use tasks::{IncrementQueue, IncrementWorkers, PoolOptions, spawn_increment_pool};
use telemetry::ErrorReporter;

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod tasks;
pub mod telemetry;

/// 请求之间共享的只读状态，存储通过构造注入
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: TokenRepository,
    pub quota: QuotaCounter,
    pub health: HealthProber,
    pub telemetry: Arc<dyn ErrorReporter>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        queue: IncrementQueue,
        telemetry: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            tokens: TokenRepository::new(store.clone()),
            quota: QuotaCounter::new(store.clone(), queue, QuotaPolicy::from_config(&config)),
            health: HealthProber::new(store, config.health_timeout()),
            telemetry,
            config: Arc::new(config),
        }
    }

    /// 启动递增 worker 并组装状态
    pub fn start(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        telemetry: Arc<dyn ErrorReporter>,
    ) -> (Self, IncrementWorkers) {
        let (queue, workers) = spawn_increment_pool(
            store.clone(),
            telemetry.clone(),
            PoolOptions {
                workers: config.increment_workers,
                capacity: config.increment_queue_capacity,
                counter_ttl: config.counter_ttl(),
                timeout: config.increment_timeout(),
            },
        );
        (Self::new(config, store, queue, telemetry), workers)
    }
}

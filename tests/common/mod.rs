#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use pesto_auth::{
    AppState,
    cache::{Expiry, KeyValueStore, MemoryStore, StoreError, keys::counter_key},
    config::{Config, StoreBackend},
    router::create_router,
    routes::auth::TOKEN_HEADER,
    tasks::{IncrementStats, IncrementWorkers},
    telemetry::MemoryReporter,
};
use tower::ServiceExt;

pub fn test_config() -> Config {
    Config {
        backend: StoreBackend::Memory,
        increment_workers: 2,
        store_timeout_secs: 1,
        health_timeout_secs: 1,
        increment_timeout_secs: 1,
        ..Config::default()
    }
}

pub struct Harness {
    pub app: Router,
    pub store: Arc<ScriptedStore>,
    pub reporter: Arc<MemoryReporter>,
    pub stats: Arc<IncrementStats>,
    pub workers: IncrementWorkers,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(test_config(), ScriptedStore::new())
    }

    pub fn with(config: Config, store: ScriptedStore) -> Self {
        let store = Arc::new(store);
        let reporter = Arc::new(MemoryReporter::new());
        let (state, workers) = AppState::start(config, store.clone(), reporter.clone());
        Self {
            app: create_router(state),
            store,
            reporter,
            stats: workers.stats(),
            workers,
        }
    }

    pub async fn register(&self, token: &str, record: &str) {
        self.store
            .inner
            .set(token, record, Expiry::Never)
            .await
            .unwrap();
    }

    pub async fn set_usage(&self, owner: &str, count: &str) {
        self.store
            .inner
            .set(&counter_key(Utc::now(), owner), count, Expiry::Never)
            .await
            .unwrap();
    }

    pub async fn usage(&self, owner: &str) -> Option<String> {
        self.store
            .inner
            .get(&counter_key(Utc::now(), owner))
            .await
            .unwrap()
    }

    pub async fn settle(&self) {
        assert!(
            self.stats.settled(Duration::from_secs(3)).await,
            "increments did not settle"
        );
    }

    pub async fn send(&self, method: Method, token: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().method(method).uri("/");
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        self.call(request.body(Body::empty()).unwrap()).await
    }

    pub async fn get(&self, token: &str) -> (StatusCode, String) {
        self.send(Method::GET, Some(token)).await
    }

    pub async fn healthz(&self) -> (StatusCode, String) {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        self.call(request).await
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

pub fn message(body: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(body).expect("json envelope");
    value["message"].as_str().expect("message field").to_string()
}

fn refused() -> StoreError {
    StoreError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

/// 基于内存存储、可注入故障的存储
#[derive(Debug, Default)]
pub struct ScriptedStore {
    pub inner: MemoryStore,
    fail_get: bool,
    fail_increment: bool,
    get_delay: Option<Duration>,
    endpoints: Option<Vec<String>>,
    down: Vec<String>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_get = true;
        self
    }

    pub fn failing_increments(mut self) -> Self {
        self.fail_increment = true;
        self
    }

    pub fn slow_reads(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    pub fn with_endpoints(mut self, endpoints: &[&str], down: &[&str]) -> Self {
        self.endpoints = Some(endpoints.iter().map(|e| e.to_string()).collect());
        self.down = down.iter().map(|e| e.to_string()).collect();
        self
    }
}

#[async_trait]
impl KeyValueStore for ScriptedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_get {
            return Err(refused());
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), StoreError> {
        self.inner.set(key, value, expiry).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        if self.fail_increment {
            return Err(refused());
        }
        self.inner.increment(key, ttl).await
    }

    fn endpoints(&self) -> Vec<String> {
        match &self.endpoints {
            Some(endpoints) => endpoints.clone(),
            None => self.inner.endpoints(),
        }
    }

    async fn health(&self, endpoint: &str) -> Result<(), StoreError> {
        if self.endpoints.is_none() {
            return self.inner.health(endpoint).await;
        }
        if self.down.iter().any(|d| d == endpoint) {
            return Err(refused());
        }
        Ok(())
    }
}

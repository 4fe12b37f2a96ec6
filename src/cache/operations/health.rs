use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;

use crate::cache::store::{KeyValueStore, StoreError, with_deadline};

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("no store endpoints configured")]
    NoEndpoints,

    #[error("endpoint {endpoint} unhealthy: {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: StoreError,
    },
}

/// 存活检查：任意节点失败即整体失败
#[derive(Clone)]
pub struct HealthProber {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn probe(&self) -> Result<(), HealthError> {
        let endpoints = self.store.endpoints();
        if endpoints.is_empty() {
            return Err(HealthError::NoEndpoints);
        }

        let checks = endpoints.iter().map(|endpoint| async move {
            with_deadline(self.timeout, self.store.health(endpoint))
                .await
                .map_err(|source| HealthError::Endpoint {
                    endpoint: endpoint.clone(),
                    source,
                })
        });

        // 按节点顺序返回第一个失败
        join_all(checks).await.into_iter().collect()
    }
}

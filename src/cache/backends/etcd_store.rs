use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Client as EtcdClient, Compare, CompareOp, ConnectOptions, DeleteOptions, PutOptions, Txn,
    TxnOp,
};

use crate::cache::store::{Expiry, KeyValueStore, StoreError};

/// 计数器 CAS 的最大重试次数
const MAX_CAS_ATTEMPTS: u32 = 16;

/// 分布式一致性存储后端
///
/// 读取返回匹配数量和原始条目，数量为 0 即视为键不存在。
/// 健康检查需要逐个节点确认，因此保留完整的节点列表。
#[derive(Clone)]
pub struct EtcdStore {
    client: EtcdClient,
    endpoints: Vec<String>,
    connect_timeout: Duration,
}

impl std::fmt::Debug for EtcdStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdStore")
            .field("endpoints", &self.endpoints)
            .field("client", &"<etcd_client::Client>")
            .finish()
    }
}

impl EtcdStore {
    pub async fn connect(
        endpoints: Vec<String>,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let options = ConnectOptions::new().with_connect_timeout(connect_timeout);
        let client = EtcdClient::connect(&endpoints, Some(options)).await?;

        Ok(Self {
            client,
            endpoints,
            connect_timeout,
        })
    }

    async fn lease_for(&self, ttl: Duration) -> Result<i64, StoreError> {
        let mut client = self.client.clone();
        let ttl = ttl.as_secs().max(1) as i64;
        let lease = client.lease_grant(ttl, None).await?;
        Ok(lease.id())
    }

    /// 回收不再挂有键的租约，失败只记录日志，租约到期后由 etcd 自行清理
    async fn release_lease(&self, lease: i64) {
        let mut client = self.client.clone();
        if let Err(e) = client.lease_revoke(lease).await {
            tracing::warn!(lease, error = %e, "failed to revoke etcd lease");
        }
    }

    /// CAS 循环。已带租约的键沿用原租约；需要新租约时最多申请一次，记在 `granted` 里
    async fn compare_and_increment(
        &self,
        key: &str,
        ttl: Duration,
        granted: &mut Option<i64>,
    ) -> Result<(i64, i64), StoreError> {
        let mut client = self.client.clone();

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let resp = client.get(key, None).await?;
            let (current, guard, existing) = match resp.kvs().first() {
                Some(kv) => {
                    let raw = kv.value_str()?;
                    let current: i64 = raw.trim().parse().map_err(|_| StoreError::InvalidValue {
                        key: key.to_string(),
                        reason: format!("not an integer: {raw:?}"),
                    })?;
                    (
                        current,
                        Compare::mod_revision(key, CompareOp::Equal, kv.mod_revision()),
                        kv.lease(),
                    )
                }
                None => (0, Compare::create_revision(key, CompareOp::Equal, 0), 0),
            };

            let lease = match (existing, *granted) {
                (0, Some(lease)) => lease,
                (0, None) => {
                    let lease = self.lease_for(ttl).await?;
                    *granted = Some(lease);
                    lease
                }
                (existing, _) => existing,
            };

            let next = current + 1;
            let txn = Txn::new().when(vec![guard]).and_then(vec![TxnOp::put(
                key,
                next.to_string(),
                Some(PutOptions::new().with_lease(lease)),
            )]);

            if client.txn(txn).await?.succeeded() {
                return Ok((next, lease));
            }

            tracing::debug!(key = %key, attempt, "counter changed concurrently, retrying");
        }

        Err(StoreError::Conflict {
            key: key.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}

#[async_trait]
impl KeyValueStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await?;
        if resp.count() == 0 {
            return Ok(None);
        }

        match resp.kvs().first() {
            Some(kv) => Ok(Some(kv.value_str()?.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), StoreError> {
        let options = match expiry {
            Expiry::Never => None,
            Expiry::After(ttl) => {
                let lease = self.lease_for(ttl).await?;
                let options = PutOptions::new().with_lease(lease).with_prev_key();
                let mut client = self.client.clone();
                let resp = match client.put(key, value, Some(options)).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        self.release_lease(lease).await;
                        return Err(e.into());
                    }
                };
                // 旧租约只挂着这一个键，换成新租约后回收
                if let Some(prev) = resp.prev_key().map(|kv| kv.lease()) {
                    if prev != 0 && prev != lease {
                        self.release_lease(prev).await;
                    }
                }
                return Ok(());
            }
            Expiry::KeepExisting => {
                // ignore_lease 要求键已存在且带租约
                let mut client = self.client.clone();
                let resp = client.get(key, None).await?;
                match resp.kvs().first() {
                    Some(kv) if kv.lease() != 0 => Some(PutOptions::new().with_ignore_lease()),
                    _ => None,
                }
            }
        };

        let mut client = self.client.clone();
        client.put(key, value, options).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        let resp = client
            .delete(key, Some(DeleteOptions::new().with_prev_key()))
            .await?;
        for lease in resp.prev_kvs().iter().map(|kv| kv.lease()) {
            if lease != 0 {
                self.release_lease(lease).await;
            }
        }
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut granted = None;
        let result = self.compare_and_increment(key, ttl, &mut granted).await;

        // 申请过但最终没有挂到键上的租约
        if let Some(lease) = granted {
            let attached = matches!(&result, Ok((_, used)) if *used == lease);
            if !attached {
                self.release_lease(lease).await;
            }
        }

        result.map(|(count, _)| count)
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }

    async fn health(&self, endpoint: &str) -> Result<(), StoreError> {
        if !self.endpoints.iter().any(|e| e == endpoint) {
            return Err(StoreError::UnknownEndpoint(endpoint.to_string()));
        }

        // 单独连接该节点，避免负载均衡把请求转发到其他健康节点
        let options = ConnectOptions::new().with_connect_timeout(self.connect_timeout);
        let mut client = EtcdClient::connect([endpoint], Some(options)).await?;
        client.status().await?;
        Ok(())
    }
}

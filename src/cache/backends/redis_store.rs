use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient, aio::MultiplexedConnection};

use crate::cache::store::{Expiry, KeyValueStore, StoreError};

/// 单节点 TTL 缓存后端
#[derive(Clone)]
pub struct RedisStore {
    endpoint: String,
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = RedisClient::open(url)?;
        // 只暴露地址部分，避免把密码写进日志
        let endpoint = client.get_connection_info().addr.to_string();
        let conn = client.get_multiplexed_async_connection().await?;

        Ok(Self { endpoint, conn })
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match expiry {
            Expiry::Never => {
                let _: () = conn.set(key, value).await?;
            }
            Expiry::KeepExisting => {
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("KEEPTTL")
                    .query_async(&mut conn)
                    .await?;
            }
            Expiry::After(ttl) => {
                let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        // MULTI/EXEC 保证计数和过期时间一起生效
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl_secs(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    fn endpoints(&self) -> Vec<String> {
        vec![self.endpoint.clone()]
    }

    async fn health(&self, endpoint: &str) -> Result<(), StoreError> {
        if endpoint != self.endpoint {
            return Err(StoreError::UnknownEndpoint(endpoint.to_string()));
        }

        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

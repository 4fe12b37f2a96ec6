use std::sync::Arc;

use thiserror::Error;

use crate::cache::models::token::TokenRecord;
use crate::cache::store::{Deadline, KeyValueStore, StoreError};

#[derive(Debug, Error)]
pub enum TokenError {
    /// 键不存在，属于客户端问题
    #[error("token not registered")]
    NotRegistered,

    /// 存储中的值无法解析，属于服务端问题
    #[error("decoding token record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("acquiring token record: {0}")]
    Store(#[from] StoreError),
}

/// 令牌记录读取
#[derive(Clone)]
pub struct TokenRepository {
    store: Arc<dyn KeyValueStore>,
}

impl TokenRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// 以令牌原文为键读取记录，不在这里判断是否已吊销
    pub async fn resolve(
        &self,
        token: &str,
        deadline: &Deadline,
    ) -> Result<TokenRecord, TokenError> {
        let raw = deadline
            .run(self.store.get(token))
            .await?
            .ok_or(TokenError::NotRegistered)?;

        Ok(TokenRecord::decode(&raw)?)
    }
}

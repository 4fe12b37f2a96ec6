use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cache::keys::counter_key;
use crate::cache::store::{Deadline, KeyValueStore, StoreError};
use crate::config::Config;
use crate::tasks::{IncrementJob, IncrementQueue};

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("parsing counter {key}: {value:?} is not an integer")]
    InvalidCounter { key: String, value: String },

    #[error("getting counter: {0}")]
    Store(#[from] StoreError),
}

/// 额度判断结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// 放行，`current` 为判断时读到的本月用量
    Accepted { current: i64 },
    Exceeded { current: i64, limit: i64 },
}

/// 额度策略
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    /// 关闭后所有请求都放行，但仍然计数
    pub enforce: bool,
    /// 记录中没有 `MonthlyLimit` 时使用；为空表示不限额
    pub default_limit: Option<i64>,
    pub trial_prefix: String,
    pub trial_suffix: String,
}

impl QuotaPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enforce: config.quota_enforcement,
            default_limit: config.default_monthly_limit,
            trial_prefix: config.trial_prefix.clone(),
            trial_suffix: config.trial_suffix.clone(),
        }
    }

    pub fn effective_limit(&self, record_limit: Option<i64>) -> Option<i64> {
        if !self.enforce {
            return None;
        }
        record_limit.or(self.default_limit)
    }

    /// 试用账号不消耗额度
    pub fn is_trial(&self, owner: &str) -> bool {
        owner.to_lowercase().starts_with(&self.trial_prefix.to_lowercase())
            && owner.ends_with(&self.trial_suffix)
    }
}

/// 月度额度计数
#[derive(Clone)]
pub struct QuotaCounter {
    store: Arc<dyn KeyValueStore>,
    queue: IncrementQueue,
    policy: QuotaPolicy,
}

impl QuotaCounter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        queue: IncrementQueue,
        policy: QuotaPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            policy,
        }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// 读取本月用量
    pub async fn current_usage(
        &self,
        now: DateTime<Utc>,
        owner: &str,
        deadline: &Deadline,
    ) -> Result<i64, QuotaError> {
        let key = counter_key(now, owner);
        match deadline.run(self.store.get(&key)).await? {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| QuotaError::InvalidCounter { key, value }),
            None => Ok(0),
        }
    }

    /// 判断是否放行，放行时提交后台递增
    ///
    /// 用量等于额度时仍然放行，严格大于才拒绝。
    pub async fn check_and_reserve(
        &self,
        owner: &str,
        monthly_limit: Option<i64>,
        deadline: &Deadline,
    ) -> Result<QuotaDecision, QuotaError> {
        let now = Utc::now();
        let current = self.current_usage(now, owner, deadline).await?;

        if let Some(limit) = self.policy.effective_limit(monthly_limit) {
            if current > limit {
                return Ok(QuotaDecision::Exceeded { current, limit });
            }
        }

        if self.policy.is_trial(owner) {
            tracing::debug!(owner = %owner, "trial identity, skipping increment");
        } else {
            self.queue.submit(IncrementJob {
                key: counter_key(now, owner),
                owner: owner.to_string(),
            });
        }

        Ok(QuotaDecision::Accepted { current })
    }
}

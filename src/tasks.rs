//! 月度计数器的后台递增
//!
//! 请求通过有界队列提交任务，固定数量的 worker 消费。
//! 队列满时任务被丢弃并计数，不会阻塞请求。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::cache::store::{KeyValueStore, with_deadline};
use crate::telemetry::ErrorReporter;

/// 一次计数器递增
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementJob {
    pub key: String,
    pub owner: String,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("increment queue is full, dropping increment of {key}")]
    Full { key: String },

    #[error("increment queue is closed, dropping increment of {key}")]
    Closed { key: String },
}

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub workers: usize,
    pub capacity: usize,
    pub counter_ttl: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
pub struct IncrementStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl StatsSnapshot {
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
    }
}

impl IncrementStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
        }
    }

    /// 等待已提交的任务全部结束，超时返回 `false`
    pub async fn settled(&self, limit: Duration) -> bool {
        let poll = async {
            while self.snapshot().pending() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(limit, poll).await.is_ok()
    }
}

/// 队列的提交端，可随请求状态一起克隆
#[derive(Clone)]
pub struct IncrementQueue {
    tx: mpsc::Sender<IncrementJob>,
    stats: Arc<IncrementStats>,
    telemetry: Arc<dyn ErrorReporter>,
}

impl IncrementQueue {
    /// 非阻塞提交，失败时记录并上报，返回是否入队
    pub fn submit(&self, job: IncrementJob) -> bool {
        let result = self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => QueueError::Full { key: job.key },
            mpsc::error::TrySendError::Closed(job) => QueueError::Closed { key: job.key },
        });

        match result {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(err) => {
                self.stats.dropped.fetch_add(1, Ordering::AcqRel);
                tracing::warn!(error = %err, "increment not scheduled");
                self.telemetry.capture("authenticate.increase_limit", &err);
                false
            }
        }
    }

    pub fn stats(&self) -> Arc<IncrementStats> {
        self.stats.clone()
    }
}

/// worker 的句柄，用于停机时等待排空
pub struct IncrementWorkers {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<IncrementStats>,
}

impl IncrementWorkers {
    pub fn stats(&self) -> Arc<IncrementStats> {
        self.stats.clone()
    }

    /// 所有提交端释放后 worker 会处理完剩余任务再退出。
    /// 超过 `grace` 仍未结束的 worker 被中止，返回中止数量。
    pub async fn shutdown(self, grace: Duration) -> usize {
        let aborts: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();

        match tokio::time::timeout(grace, join_all(self.handles)).await {
            Ok(_) => {
                let stats = self.stats.snapshot();
                tracing::info!(
                    completed = stats.completed,
                    failed = stats.failed,
                    dropped = stats.dropped,
                    "increment workers drained"
                );
                0
            }
            Err(_) => {
                let abandoned = aborts.iter().filter(|a| !a.is_finished()).count();
                for abort in &aborts {
                    abort.abort();
                }
                tracing::warn!(
                    abandoned,
                    pending = self.stats.snapshot().pending(),
                    "increment workers did not drain in time"
                );
                abandoned
            }
        }
    }
}

/// 启动固定数量的 worker
pub fn spawn_increment_pool(
    store: Arc<dyn KeyValueStore>,
    telemetry: Arc<dyn ErrorReporter>,
    options: PoolOptions,
) -> (IncrementQueue, IncrementWorkers) {
    let (tx, rx) = mpsc::channel(options.capacity.max(1));
    let rx = Arc::new(Mutex::new(rx));
    let stats = Arc::new(IncrementStats::default());

    let handles = (0..options.workers.max(1))
        .map(|worker| {
            let rx = rx.clone();
            let store = store.clone();
            let telemetry = telemetry.clone();
            let stats = stats.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else {
                        tracing::debug!(worker, "increment queue closed, worker exiting");
                        break;
                    };
                    run_job(store.as_ref(), telemetry.as_ref(), &stats, &options, job).await;
                }
            })
        })
        .collect();

    let queue = IncrementQueue {
        tx,
        stats: stats.clone(),
        telemetry,
    };
    (queue, IncrementWorkers { handles, stats })
}

async fn run_job(
    store: &dyn KeyValueStore,
    telemetry: &dyn ErrorReporter,
    stats: &IncrementStats,
    options: &PoolOptions,
    job: IncrementJob,
) {
    let result = with_deadline(options.timeout, store.increment(&job.key, options.counter_ttl)).await;

    match result {
        Ok(count) => {
            stats.completed.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(key = %job.key, owner = %job.owner, count, "monthly counter incremented");
        }
        Err(err) => {
            stats.failed.fetch_add(1, Ordering::AcqRel);
            tracing::error!(key = %job.key, owner = %job.owner, error = %err, "error incrementing monthly counter");
            telemetry.capture("authenticate.increase_limit", &err);
        }
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use metrics::counter;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::models::job::JobResult;
use crate::domain::models::scrape_request::{ScrapeRequest, UserId, UserTier};
use crate::utils::errors::ScrapeError;
use crate::workers::orchestrator::ScrapeOrchestrator;

/// 任务管理器配置
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// 同时执行的任务数（浏览器会话数上限）
    pub max_concurrent_jobs: usize,
    /// 等待执行槽位的最大任务数
    pub max_queue_depth: usize,
    /// 终止结果在内存中的保留时间
    pub result_retention: Duration,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_queue_depth: 16,
            result_retention: Duration::from_secs(600),
        }
    }
}

/// 已提交任务的句柄
#[derive(Debug)]
pub struct JobTicket {
    pub job_id: Uuid,
    /// 任务终止时收到结果
    pub result: oneshot::Receiver<JobResult>,
}

/// 任务查询结果
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// 等待执行槽位
    Queued { submitted_at: DateTime<Utc> },
    /// 正在执行
    Running { submitted_at: DateTime<Utc> },
    /// 已终止
    Finished { result: JobResult },
}

struct LiveJob {
    owner: UserId,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    submitted_at: DateTime<Utc>,
}

struct StoredResult {
    owner: UserId,
    result: JobResult,
    stored_at: Instant,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

/// 任务管理器
///
/// 持有工作池容量与有界等待队列，为每个活动任务保存取消令牌。
/// 所有任务令牌都派生自进程级关闭令牌，`shutdown` 会取消并等待全部任务。
pub struct JobManager {
    orchestrator: Arc<ScrapeOrchestrator>,
    config: JobManagerConfig,
    slots: Arc<Semaphore>,
    pending: AtomicUsize,
    live: DashMap<Uuid, LiveJob>,
    results: DashMap<Uuid, StoredResult>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl JobManager {
    pub fn new(orchestrator: Arc<ScrapeOrchestrator>, config: JobManagerConfig) -> Arc<Self> {
        Self::with_shutdown_token(orchestrator, config, CancellationToken::new())
    }

    /// 使用外部关闭令牌创建
    pub fn with_shutdown_token(
        orchestrator: Arc<ScrapeOrchestrator>,
        config: JobManagerConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Arc::new(Self {
            orchestrator,
            config,
            slots,
            pending: AtomicUsize::new(0),
            live: DashMap::new(),
            results: DashMap::new(),
            shutdown,
            tracker: TaskTracker::new(),
        })
    }

    fn capacity(&self) -> usize {
        self.config.max_concurrent_jobs.max(1) + self.config.max_queue_depth
    }

    /// 当前排队与执行中的任务数
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// 提交任务
    ///
    /// # 返回值
    ///
    /// * `Ok(JobTicket)` - 已进入执行或排队
    /// * `Err(ScrapeError::QueueFull)` - 工作池与队列均已满
    /// * `Err(ScrapeError::Cancelled)` - 管理器正在关闭
    pub fn submit(
        self: &Arc<Self>,
        request: ScrapeRequest,
        tier: UserTier,
    ) -> Result<JobTicket, ScrapeError> {
        if self.shutdown.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }
        let capacity = self.capacity();
        let reserved = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            });
        if reserved.is_err() {
            warn!("Rejecting job for {}: {} jobs pending", request.domain, capacity);
            counter!("scrape_jobs_total", "state" => "queue_full").increment(1);
            return Err(ScrapeError::QueueFull);
        }

        let job_id = Uuid::new_v4();
        let owner = request.requester.clone();
        let cancel = self.shutdown.child_token();
        let running = Arc::new(AtomicBool::new(false));
        self.live.insert(
            job_id,
            LiveJob {
                owner: owner.clone(),
                cancel: cancel.clone(),
                running: Arc::clone(&running),
                submitted_at: Utc::now(),
            },
        );

        let (tx, rx) = oneshot::channel();
        let manager = Arc::clone(self);
        self.tracker.spawn(async move {
            let fallback = request.clone();
            let result = match AssertUnwindSafe(manager.execute(job_id, request, tier, cancel, running))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!("Job {} panicked: {}", job_id, reason);
                    counter!("scrape_jobs_total", "state" => "panicked").increment(1);
                    JobResult::aborted(job_id, &fallback, ScrapeError::AdapterFault { reason })
                }
            };
            manager.results.insert(
                job_id,
                StoredResult {
                    owner,
                    result: result.clone(),
                    stored_at: Instant::now(),
                },
            );
            manager.live.remove(&job_id);
            manager.pending.fetch_sub(1, Ordering::SeqCst);
            // 调用方可能已放弃等待
            let _ = tx.send(result);
        });

        debug!("Submitted job {}", job_id);
        Ok(JobTicket {
            job_id,
            result: rx,
        })
    }

    async fn execute(
        &self,
        job_id: Uuid,
        request: ScrapeRequest,
        tier: UserTier,
        cancel: CancellationToken,
        running: Arc<AtomicBool>,
    ) -> JobResult {
        let permit = tokio::select! {
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.slots).acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            info!("Job {} cancelled while queued", job_id);
            return JobResult::cancelled_before_start(job_id, &request);
        };
        running.store(true, Ordering::SeqCst);
        self.orchestrator.run(job_id, request, tier, cancel).await
    }

    /// 查询任务状态
    pub fn status(&self, job_id: &Uuid) -> Option<JobStatus> {
        if let Some(stored) = self.results.get(job_id) {
            return Some(JobStatus::Finished {
                result: stored.result.clone(),
            });
        }
        self.live.get(job_id).map(|job| {
            if job.running.load(Ordering::SeqCst) {
                JobStatus::Running {
                    submitted_at: job.submitted_at,
                }
            } else {
                JobStatus::Queued {
                    submitted_at: job.submitted_at,
                }
            }
        })
    }

    /// 任务的提交者
    pub fn owner(&self, job_id: &Uuid) -> Option<UserId> {
        if let Some(stored) = self.results.get(job_id) {
            return Some(stored.owner.clone());
        }
        self.live.get(job_id).map(|job| job.owner.clone())
    }

    /// 请求取消任务
    ///
    /// # 返回值
    ///
    /// 任务仍在排队或执行时返回 true
    pub fn cancel(&self, job_id: &Uuid) -> bool {
        match self.live.get(job_id) {
            Some(job) => {
                info!("Cancelling job {}", job_id);
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// 清理超过保留时间的终止结果
    pub fn purge_expired_results(&self) -> usize {
        let retention = self.config.result_retention;
        let before = self.results.len();
        self.results
            .retain(|_, stored| stored.stored_at.elapsed() < retention);
        before.saturating_sub(self.results.len())
    }

    /// 周期性清理结果，直到关闭
    pub fn spawn_result_janitor(self: &Arc<Self>, interval: Duration) {
        let manager = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = manager.purge_expired_results();
                        if purged > 0 {
                            debug!("Purged {} expired job results", purged);
                        }
                    }
                }
            }
        });
    }

    /// 取消全部任务并等待其释放会话
    pub async fn shutdown(&self) {
        info!("Shutting down job manager, {} jobs pending", self.pending());
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("All jobs released");
    }
}

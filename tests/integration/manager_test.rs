// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{reason_kind, request, BrowserScript, HarnessBuilder, StubAdapter};
use promptscrape::domain::models::job::JobState;
use promptscrape::domain::models::scrape_request::UserTier;
use promptscrape::utils::errors::ScrapeError;
use promptscrape::workers::manager::{JobManager, JobManagerConfig, JobStatus};
use std::sync::Arc;
use std::time::Duration;

fn slow_script() -> BrowserScript {
    BrowserScript {
        navigation_delay: Duration::from_secs(1),
        ..Default::default()
    }
}

fn manager(script: BrowserScript, max_concurrent_jobs: usize, max_queue_depth: usize) -> Arc<JobManager> {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![20; 5]))
        .browser(script)
        .build();
    JobManager::new(
        harness.orchestrator,
        JobManagerConfig {
            max_concurrent_jobs,
            max_queue_depth,
            result_retention: Duration::from_secs(60),
        },
    )
}

#[tokio::test]
async fn test_submit_delivers_result() {
    let manager = manager(BrowserScript::default(), 2, 2);

    let ticket = manager.submit(request(30), UserTier::Standard).unwrap();
    let job_id = ticket.job_id;
    let result = ticket.result.await.unwrap();

    assert_eq!(result.job_id, job_id);
    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.records.len(), 30);
    assert!(matches!(
        manager.status(&job_id),
        Some(JobStatus::Finished { .. })
    ));
    assert_eq!(manager.pending(), 0);
}

/// 工作池与队列都满时立即拒绝
#[tokio::test(start_paused = true)]
async fn test_queue_full_rejects_immediately() {
    let manager = manager(slow_script(), 1, 1);

    let first = manager.submit(request(100), UserTier::Standard).unwrap();
    let second = manager.submit(request(100), UserTier::Standard).unwrap();
    let third = manager.submit(request(100), UserTier::Standard);

    assert_eq!(third.unwrap_err(), ScrapeError::QueueFull);
    assert_eq!(manager.pending(), 2);

    manager.shutdown().await;
    assert_eq!(first.result.await.unwrap().state, JobState::Failed);
    assert_eq!(second.result.await.unwrap().reason, Some(ScrapeError::Cancelled));
}

/// 排队中的任务被取消后不会占用执行槽位
#[tokio::test(start_paused = true)]
async fn test_cancel_queued_job() {
    let manager = manager(slow_script(), 1, 4);

    let running = manager.submit(request(100), UserTier::Standard).unwrap();
    let queued = manager.submit(request(100), UserTier::Standard).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(matches!(
        manager.status(&queued.job_id),
        Some(JobStatus::Queued { .. })
    ));
    assert!(matches!(
        manager.status(&running.job_id),
        Some(JobStatus::Running { .. })
    ));

    assert!(manager.cancel(&queued.job_id));
    let result = queued.result.await.unwrap();
    assert_eq!(result.state, JobState::Failed);
    assert_eq!(result.reason, Some(ScrapeError::Cancelled));

    // 第一个任务不受影响
    let result = running.result.await.unwrap();
    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.records.len(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_running_job() {
    let manager = manager(slow_script(), 1, 1);

    let ticket = manager.submit(request(100), UserTier::Standard).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(manager.cancel(&ticket.job_id));

    let result = ticket.result.await.unwrap();
    assert_eq!(result.state, JobState::Failed);
    assert_eq!(result.reason, Some(ScrapeError::Cancelled));
    assert!(!manager.cancel(&ticket.job_id));
}

#[tokio::test]
async fn test_unknown_job_has_no_status() {
    let manager = manager(BrowserScript::default(), 1, 1);
    let unknown = uuid::Uuid::new_v4();

    assert!(manager.status(&unknown).is_none());
    assert!(manager.owner(&unknown).is_none());
    assert!(!manager.cancel(&unknown));
}

/// 关闭后拒绝新任务
#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_and_refuses_new_jobs() {
    let manager = manager(slow_script(), 2, 2);

    let ticket = manager.submit(request(100), UserTier::Standard).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    manager.shutdown().await;

    let result = ticket.result.await.unwrap();
    assert_eq!(result.reason, Some(ScrapeError::Cancelled));
    assert_eq!(
        manager.submit(request(1), UserTier::Standard).unwrap_err(),
        ScrapeError::Cancelled
    );
}

#[tokio::test]
async fn test_purge_expired_results() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![1])).build();
    let manager = JobManager::new(
        harness.orchestrator,
        JobManagerConfig {
            max_concurrent_jobs: 1,
            max_queue_depth: 1,
            result_retention: Duration::ZERO,
        },
    );

    let ticket = manager.submit(request(1), UserTier::Standard).unwrap();
    let job_id = ticket.job_id;
    ticket.result.await.unwrap();

    assert_eq!(manager.purge_expired_results(), 1);
    assert!(manager.status(&job_id).is_none());
}

/// 适配器 panic 时任务以 Failed(AdapterFault) 结束，并归还槽位与会话
#[tokio::test]
async fn test_panicking_job_releases_slot() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![5]).panicking()).build();
    let browser = Arc::clone(&harness.browser);
    let manager = JobManager::new(
        harness.orchestrator,
        JobManagerConfig {
            max_concurrent_jobs: 1,
            max_queue_depth: 0,
            result_retention: Duration::from_secs(60),
        },
    );

    let ticket = manager.submit(request(5), UserTier::Standard).unwrap();
    let job_id = ticket.job_id;
    let result = ticket.result.await.unwrap();

    assert_eq!(result.state, JobState::Failed);
    assert_eq!(reason_kind(&result.reason), Some("adapter_fault"));
    assert!(result.message.unwrap().contains("selector blew up"));
    assert!(matches!(
        manager.status(&job_id),
        Some(JobStatus::Finished { .. })
    ));
    assert_eq!(manager.pending(), 0);

    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(browser.closes(), 1);

    // 槽位已归还，后续任务可以提交
    let next = manager.submit(request(5), UserTier::Standard).unwrap();
    assert_eq!(next.result.await.unwrap().state, JobState::Failed);
}

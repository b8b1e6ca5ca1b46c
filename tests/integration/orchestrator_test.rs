// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    reason_kind, request, BrowserScript, HarnessBuilder, StubAdapter, StubRobotsFetcher,
};
use promptscrape::domain::models::job::JobState;
use promptscrape::domain::models::scrape_request::{ScrapeRequest, UserId, UserTier};
use promptscrape::domain::services::rate_limiter::RateLimiterConfig;
use promptscrape::utils::errors::ScrapeError;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn run(harness: &super::helpers::Harness, request: ScrapeRequest) -> promptscrape::domain::models::job::JobResult {
    harness
        .orchestrator
        .run(Uuid::new_v4(), request, UserTier::Standard, CancellationToken::new())
        .await
}

/// robots.txt 禁止搜索路径时任务被拒绝，且不启动浏览器
#[tokio::test]
async fn test_robots_disallow_rejects_without_fetch() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![20]))
        .robots(StubRobotsFetcher::with_body("User-agent: *\nDisallow: /search\n"))
        .build();

    let result = run(&harness, request(10)).await;

    assert_eq!(result.state, JobState::Rejected);
    assert_eq!(reason_kind(&result.reason), Some("robots_disallowed"));
    assert!(result.message.is_some());
    assert_eq!(harness.browser.launches(), 0);
    assert_eq!(harness.browser.navigations(), 0);
    assert!(result.records.is_empty());
}

/// 20/20/5 三页、上限 50：得到 45 条记录、抓取 3 页
#[tokio::test]
async fn test_paginates_until_last_page() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![20, 20, 5])).build();

    let result = run(&harness, request(50)).await;

    assert_eq!(result.state, JobState::Completed);
    assert!(result.reason.is_none());
    assert_eq!(result.records.len(), 45);
    assert_eq!(result.metadata.pages_fetched, 3);
    assert_eq!(result.metadata.items_collected, 45);
    assert!(result.warnings.is_empty());
    assert_eq!(harness.browser.launches(), 1);
    assert_eq!(harness.browser.closes(), 1);
}

/// 记录按请求字段投影：缺失字段为 null，多余字段丢弃
#[tokio::test]
async fn test_records_have_requested_schema() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![3])).build();

    let result = run(&harness, request(10)).await;

    assert_eq!(result.records.len(), 3);
    for record in &result.records {
        let names: Vec<&str> = record.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["price", "rating", "title"]);
        assert_eq!(record.get("rating"), Some(&Value::Null));
    }
}

/// 记录数不超过上限，达到上限后不再翻页
#[tokio::test]
async fn test_item_limit_truncates_and_stops() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![20, 20, 20])).build();

    let result = run(&harness, request(25)).await;

    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.records.len(), 25);
    assert_eq!(result.metadata.pages_fetched, 2);
    assert_eq!(harness.browser.navigations(), 2);
}

/// 第 2 页始终超时：重试后以部分结果完成并带警告
#[tokio::test(start_paused = true)]
async fn test_page_timeout_degrades_to_partial_result() {
    let script = BrowserScript {
        hanging_pages: HashSet::from([2]),
        ..Default::default()
    };
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![20, 20, 5]))
        .browser(script)
        .build();

    let result = run(&harness, request(50)).await;

    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.records.len(), 20);
    assert_eq!(result.metadata.pages_fetched, 1);
    assert!(!result.warnings.is_empty());
    assert!(result.warnings[0].contains("Page 2"));
    // 1 次首页 + 第 2 页 1 次尝试与 2 次重试
    assert_eq!(harness.browser.navigations(), 4);
    assert_eq!(harness.browser.closes(), 1);
}

/// 首页失败也按部分结果处理：零记录、Completed、带警告
#[tokio::test(start_paused = true)]
async fn test_first_page_failure_completes_empty() {
    let script = BrowserScript {
        hanging_pages: HashSet::from([1]),
        ..Default::default()
    };
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![20]))
        .browser(script)
        .build();

    let result = run(&harness, request(50)).await;

    assert_eq!(result.state, JobState::Completed);
    assert!(result.records.is_empty());
    assert_eq!(result.metadata.pages_fetched, 0);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(harness.browser.closes(), 1);
}

/// 翻页中取消：会话只释放一次，终止状态为 Failed(Cancelled)
#[tokio::test(start_paused = true)]
async fn test_cancel_mid_pagination_releases_session_once() {
    let script = BrowserScript {
        navigation_delay: Duration::from_secs(1),
        ..Default::default()
    };
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![20, 20, 20, 20, 20]))
        .browser(script)
        .build();
    let orchestrator = Arc::clone(&harness.orchestrator);
    let cancel = CancellationToken::new();

    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            orchestrator
                .run(Uuid::new_v4(), request(100), UserTier::Standard, cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1500)).await;
    cancel.cancel();
    let result = handle.await.unwrap();

    assert_eq!(result.state, JobState::Failed);
    assert_eq!(result.reason, Some(ScrapeError::Cancelled));
    assert_eq!(harness.browser.navigations(), 2);
    assert_eq!(harness.browser.closes(), 1);
}

/// 限流拒绝发生在 robots.txt 检查与抓取之前
#[tokio::test]
async fn test_rate_limit_rejects_second_job() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![5]))
        .limiter(RateLimiterConfig {
            per_domain_limit: 1,
            ..Default::default()
        })
        .build();

    let first = run(&harness, request(5)).await;
    assert_eq!(first.state, JobState::Completed);

    let second = run(&harness, request(5)).await;
    assert_eq!(second.state, JobState::Rejected);
    match second.reason {
        Some(ScrapeError::RateLimited {
            ref scope,
            retry_after_secs,
        }) => {
            assert_eq!(scope, "domain");
            assert!(retry_after_secs > 0);
        }
        other => panic!("unexpected reason: {:?}", other),
    }
    assert_eq!(harness.robots_fetcher.calls(), 1);
    assert_eq!(harness.browser.launches(), 1);
}

/// 管理员不受按域名限流约束
#[tokio::test]
async fn test_admin_bypasses_domain_limit() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![1]))
        .limiter(RateLimiterConfig {
            per_domain_limit: 1,
            ..Default::default()
        })
        .build();

    for _ in 0..3 {
        let result = harness
            .orchestrator
            .run(Uuid::new_v4(), request(1), UserTier::Admin, CancellationToken::new())
            .await;
        assert_eq!(result.state, JobState::Completed);
    }
}

/// 同一域名的策略在有效期内只获取一次
#[tokio::test]
async fn test_robots_fetched_once_per_ttl() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![1])).build();

    run(&harness, request(1)).await;
    run(&harness, request(1)).await;

    assert_eq!(harness.robots_fetcher.calls(), 1);
}

#[tokio::test]
async fn test_browser_launch_failure() {
    let script = BrowserScript {
        fail_launch: true,
        ..Default::default()
    };
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![5]))
        .browser(script)
        .build();

    let result = run(&harness, request(5)).await;

    assert_eq!(result.state, JobState::Failed);
    assert_eq!(reason_kind(&result.reason), Some("fetch_unavailable"));
    assert_eq!(harness.browser.closes(), 0);
}

#[tokio::test]
async fn test_malformed_request_rejected_before_admission() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![5])).build();
    let empty_fields = ScrapeRequest::new(
        super::helpers::TEST_DOMAIN,
        "books",
        Vec::<String>::new(),
        5,
        UserId::new("alice"),
    );

    let result = run(&harness, empty_fields).await;
    assert_eq!(result.state, JobState::Rejected);
    assert_eq!(reason_kind(&result.reason), Some("invalid_request"));

    let zero_limit = request(0);
    let result = run(&harness, zero_limit).await;
    assert_eq!(reason_kind(&result.reason), Some("invalid_request"));

    assert_eq!(harness.robots_fetcher.calls(), 0);
    assert!(harness
        .rate_limiter
        .snapshot(&promptscrape::domain::models::rate_window::SubjectKey::global(
            &UserId::new("alice")
        ))
        .is_none());
}

#[tokio::test]
async fn test_unknown_domain_without_fallback_is_unsupported() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![5])).build();
    let other = ScrapeRequest::new("other.test", "books", ["title"], 5, UserId::new("alice"));

    let result = run(&harness, other).await;

    assert_eq!(result.state, JobState::Rejected);
    assert_eq!(reason_kind(&result.reason), Some("unsupported"));
    assert_eq!(harness.browser.launches(), 0);
}

/// 启发式适配器首页无记录：Failed(Unsupported)
#[tokio::test]
async fn test_heuristic_adapter_with_no_records_fails() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![0]).heuristic()).build();

    let result = run(&harness, request(10)).await;

    assert_eq!(result.state, JobState::Failed);
    assert_eq!(reason_kind(&result.reason), Some("unsupported"));
    assert!(result.metadata.heuristic);
    assert!(result.warnings.iter().any(|w| w.contains("heuristic")));
    assert_eq!(harness.browser.closes(), 1);
}

#[tokio::test]
async fn test_adapter_fault_is_fatal_and_releases_session() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![5]).failing()).build();

    let result = run(&harness, request(10)).await;

    assert_eq!(result.state, JobState::Failed);
    assert_eq!(reason_kind(&result.reason), Some("adapter_fault"));
    assert_eq!(harness.browser.closes(), 1);
}

#[tokio::test]
async fn test_unreachable_robots_fail_open_and_fail_closed() {
    let open = HarnessBuilder::new(StubAdapter::pages(vec![2]))
        .robots(StubRobotsFetcher::unreachable())
        .build();
    let result = run(&open, request(5)).await;
    assert_eq!(result.state, JobState::Completed);
    assert!(result.metadata.robots_degraded);
    assert!(result.warnings.iter().any(|w| w.contains("robots.txt")));

    let closed = HarnessBuilder::new(StubAdapter::pages(vec![2]))
        .robots(StubRobotsFetcher::unreachable())
        .fail_closed()
        .build();
    let result = run(&closed, request(5)).await;
    assert_eq!(result.state, JobState::Rejected);
    assert_eq!(reason_kind(&result.reason), Some("robots_disallowed"));
    assert_eq!(closed.browser.launches(), 0);
}

/// 后续页被 robots.txt 禁止时停止翻页并警告
#[tokio::test]
async fn test_later_page_disallowed_stops_pagination() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![20, 20]))
        .robots(StubRobotsFetcher::with_body(
            "User-agent: *\nDisallow: /search?q=books&page=2\n",
        ))
        .build();

    let result = run(&harness, request(50)).await;

    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.records.len(), 20);
    assert_eq!(harness.browser.navigations(), 1);
    assert!(result.warnings.iter().any(|w| w.contains("pagination stopped")));
}

#[tokio::test]
async fn test_crawl_delay_recorded_in_metadata() {
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![1]))
        .robots(StubRobotsFetcher::with_body(
            "User-agent: *\nCrawl-delay: 2\nAllow: /\n",
        ))
        .build();

    let result = run(&harness, request(1)).await;

    assert_eq!(result.metadata.crawl_delay_ms, 2000);
}

#[tokio::test]
async fn test_captcha_and_page_cap_produce_warnings() {
    let script = BrowserScript {
        extra_html: "Please solve the CAPTCHA to continue".to_string(),
        ..Default::default()
    };
    let harness = HarnessBuilder::new(StubAdapter::pages(vec![5, 5, 5]))
        .browser(script)
        .max_pages(1)
        .build();

    let result = run(&harness, request(50)).await;

    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.records.len(), 5);
    assert!(result.warnings.iter().any(|w| w.contains("captcha")));
    assert!(result.warnings.iter().any(|w| w.contains("page limit")));
}

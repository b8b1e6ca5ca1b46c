// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use promptscrape::domain::models::rate_window::SubjectKey;
use promptscrape::domain::models::scrape_request::{UserId, UserTier};
use promptscrape::domain::services::rate_limiter::{RateLimiter, RateLimiterConfig};
use promptscrape::infrastructure::repositories::audit_log_repo_impl::JsonLinesAuditRepository;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn config(per_domain: u32, global: u32) -> RateLimiterConfig {
    RateLimiterConfig {
        per_domain_limit: per_domain,
        global_limit: global,
        admin_global_limit: 1000,
        window: Duration::from_secs(3600),
    }
}

/// 并发请求同一主体键时不会超额放行
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admissions_never_exceed_limit() {
    let limiter = Arc::new(RateLimiter::new(config(5, 100)));
    let user = UserId::new("alice");

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let user = user.clone();
            tokio::spawn(async move {
                limiter
                    .admit_request(&user, UserTier::Standard, "shop.test", 1)
                    .await
                    .is_admitted()
            })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 5);
    let window = limiter
        .snapshot(&SubjectKey::domain(&user, "shop.test"))
        .unwrap();
    assert_eq!(window.count, 5);
}

/// 全局键被多个域名共享；被拒绝的请求不扣减任何键
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_global_limit_spans_domains() {
    let limiter = Arc::new(RateLimiter::new(config(5, 8)));
    let user = UserId::new("bob");

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let limiter = Arc::clone(&limiter);
            let user = user.clone();
            let domain = if i % 2 == 0 { "a.test" } else { "b.test" };
            tokio::spawn(async move {
                limiter
                    .admit_request(&user, UserTier::Standard, domain, 1)
                    .await
                    .is_admitted()
            })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 8);
    let global = limiter.snapshot(&SubjectKey::global(&user)).unwrap();
    let a = limiter.snapshot(&SubjectKey::domain(&user, "a.test")).unwrap();
    let b = limiter.snapshot(&SubjectKey::domain(&user, "b.test")).unwrap();
    assert_eq!(global.count, 8);
    assert_eq!(a.count + b.count, 8);
    assert!(a.count <= 5 && b.count <= 5);
}

#[tokio::test]
async fn test_denial_reports_retry_after() {
    let limiter = RateLimiter::new(config(1, 10));
    let user = UserId::new("carol");

    assert!(limiter
        .admit_request(&user, UserTier::Standard, "shop.test", 1)
        .await
        .is_admitted());
    let denied = limiter
        .admit_request(&user, UserTier::Standard, "shop.test", 1)
        .await;

    let error = denied.into_error().unwrap();
    assert_eq!(error.kind(), "rate_limited");
    let retry_after = error.retry_after().unwrap();
    assert!(retry_after > Duration::ZERO && retry_after <= Duration::from_secs(3600));
}

/// 重启后从审计日志恢复计数
#[tokio::test]
async fn test_rehydrate_from_jsonl_audit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rate_audit.jsonl");
    let user = UserId::new("dave");

    {
        let limiter = RateLimiter::new(config(5, 20))
            .with_audit(Arc::new(JsonLinesAuditRepository::new(&path)));
        for _ in 0..3 {
            assert!(limiter
                .admit_request(&user, UserTier::Standard, "shop.test", 1)
                .await
                .is_admitted());
        }
    }

    let restarted =
        RateLimiter::new(config(5, 20)).with_audit(Arc::new(JsonLinesAuditRepository::new(&path)));
    let replayed = restarted.rehydrate_from_audit().await.unwrap();
    // 每次放行写入全局键与域名键两条
    assert_eq!(replayed, 6);

    let domain_window = restarted
        .snapshot(&SubjectKey::domain(&user, "shop.test"))
        .unwrap();
    assert_eq!(domain_window.count, 3);

    let mut admitted = 0;
    for _ in 0..5 {
        if restarted
            .admit_request(&user, UserTier::Standard, "shop.test", 1)
            .await
            .is_admitted()
        {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 2);
}

#[tokio::test]
async fn test_prune_audit_drops_old_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rate_audit.jsonl");
    let user = UserId::new("erin");
    let limiter =
        RateLimiter::new(config(5, 20)).with_audit(Arc::new(JsonLinesAuditRepository::new(&path)));

    limiter
        .admit_request(&user, UserTier::Standard, "shop.test", 1)
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let pruned = limiter.prune_audit(Duration::ZERO).await.unwrap();
    assert_eq!(pruned, 2);
    assert_eq!(limiter.prune_audit(Duration::ZERO).await.unwrap(), 0);

    let restarted =
        RateLimiter::new(config(5, 20)).with_audit(Arc::new(JsonLinesAuditRepository::new(&path)));
    assert_eq!(restarted.rehydrate_from_audit().await.unwrap(), 0);
}

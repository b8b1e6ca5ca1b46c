// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use promptscrape::infrastructure::repositories::robots_cache_repo_impl::JsonFileRobotsCache;
use promptscrape::utils::retry_policy::RetryPolicy;
use promptscrape::utils::robots::{
    HttpRobotsFetcher, RobotsBody, RobotsFetcher, RobotsResolver, RobotsResolverConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_AGENT: &str = "promptscrape-bot";

fn fetcher() -> HttpRobotsFetcher {
    HttpRobotsFetcher::new(USER_AGENT)
        .with_scheme("http")
        .with_ssrf_protection(false)
        .with_timeout(Duration::from_secs(2))
        .with_retry_policy(
            RetryPolicy::for_page_fetch(1, Duration::from_millis(10)).without_jitter(),
        )
}

/// MockServer 地址去掉协议后作为域名
fn host_of(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

#[tokio::test]
async fn test_fetch_found_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .and(header("User-Agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /cart\n"))
        .expect(1)
        .mount(&server)
        .await;

    let body = fetcher().fetch(&host_of(&server)).await.unwrap();
    assert_eq!(
        body,
        RobotsBody::Found("User-agent: *\nDisallow: /cart\n".to_string())
    );
}

/// 4xx 视为站点没有 robots.txt，全部放行
#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let domain = host_of(&server);

    let resolver = RobotsResolver::new(Arc::new(fetcher()), RobotsResolverConfig::default());
    let policy = resolver.resolve(&domain).await;

    assert!(!policy.degraded);
    assert!(policy.is_allowed(USER_AGENT, "/anything/at/all"));
}

/// 5xx 重试后仍失败：按配置降级
#[tokio::test]
async fn test_server_error_degrades_per_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;
    let domain = host_of(&server);

    let open = RobotsResolver::new(Arc::new(fetcher()), RobotsResolverConfig::default());
    let policy = open.resolve(&domain).await;
    assert!(policy.degraded);
    assert!(policy.is_allowed(USER_AGENT, "/search"));

    let closed = RobotsResolver::new(
        Arc::new(fetcher()),
        RobotsResolverConfig {
            fail_open: false,
            ..Default::default()
        },
    );
    let policy = closed.resolve(&domain).await;
    assert!(policy.degraded);
    assert!(!policy.is_allowed(USER_AGENT, "/search"));
}

/// 缓存有效期内并发解析只获取一次
#[tokio::test]
async fn test_concurrent_resolves_share_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /private\n")
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    let domain = host_of(&server);
    let resolver = Arc::new(RobotsResolver::new(
        Arc::new(fetcher()),
        RobotsResolverConfig::default(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let domain = domain.clone();
            tokio::spawn(async move { resolver.resolve(&domain).await })
        })
        .collect();
    for handle in handles {
        let policy = handle.await.unwrap();
        assert!(!policy.is_allowed(USER_AGENT, "/private/page"));
        assert!(policy.is_allowed(USER_AGENT, "/public"));
    }
}

/// 持久化缓存让新进程无需重新获取
#[tokio::test]
async fn test_persisted_policy_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "User-agent: promptscrape-bot\nCrawl-delay: 3\nDisallow: /checkout\n",
        ))
        .expect(1)
        .mount(&server)
        .await;
    let domain = host_of(&server);
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("robots_cache.json");

    let first = RobotsResolver::new(Arc::new(fetcher()), RobotsResolverConfig::default())
        .with_store(Arc::new(JsonFileRobotsCache::new(&cache_path)));
    let policy = first.resolve(&domain).await;
    assert_eq!(policy.crawl_delay(USER_AGENT), Duration::from_secs(3));

    let second = RobotsResolver::new(Arc::new(fetcher()), RobotsResolverConfig::default())
        .with_store(Arc::new(JsonFileRobotsCache::new(&cache_path)));
    let policy = second.resolve(&domain).await;
    assert!(!policy.is_allowed(USER_AGENT, "/checkout"));
    assert_eq!(policy.crawl_delay(USER_AGENT), Duration::from_secs(3));
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use robotstxt::{parse_robotstxt, RobotsParseHandler};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

const WILDCARD_AGENT: &str = "*";

/// Crawl-delay 上限，超出的声明值按此截断
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// robots.txt 中的一条访问规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsRule {
    /// 规则所属的 User-agent（小写，`*` 表示通配）
    pub user_agent: String,
    /// 路径模式，支持 `*` 通配与结尾 `$` 锚定
    pub path_pattern: String,
    /// true 为 Allow，false 为 Disallow
    pub allow: bool,
}

/// Crawl-delay 指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlDelay {
    pub user_agent: String,
    pub seconds: f64,
}

/// 域名的爬取策略
///
/// 按域名缓存；过期后必须重新获取。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotsPolicy {
    /// 所属域名
    pub domain: String,
    /// 获取时间
    pub fetched_at: DateTime<Utc>,
    /// 按文件顺序排列的规则
    pub rules: Vec<RobotsRule>,
    /// 各 User-agent 的抓取间隔
    pub crawl_delays: Vec<CrawlDelay>,
    /// 文件中声明过的全部 User-agent
    pub user_agents: BTreeSet<String>,
    /// 过期时间
    pub expires_at: DateTime<Utc>,
    /// 是否为获取失败后的降级策略
    #[serde(default)]
    pub degraded: bool,
}

impl RobotsPolicy {
    /// 解析 robots.txt 内容
    ///
    /// 未知指令被忽略；出现在任何 User-agent 之前的规则被忽略。
    pub fn parse(domain: &str, body: &str, ttl: Duration) -> Self {
        let mut builder = PolicyBuilder::default();
        parse_robotstxt(body, &mut builder);

        let mut policy = Self::empty(domain, ttl);
        policy.rules = builder.rules;
        policy.crawl_delays = builder.crawl_delays;
        policy.user_agents = builder.user_agents;
        policy
    }

    /// 允许全部访问、无抓取间隔的策略
    pub fn allow_all(domain: &str, ttl: Duration) -> Self {
        Self::empty(domain, ttl)
    }

    /// 拒绝全部访问的策略（仅用于获取失败且配置为 fail-closed 时）
    pub fn deny_all(domain: &str, ttl: Duration) -> Self {
        let mut policy = Self::empty(domain, ttl);
        policy.user_agents.insert(WILDCARD_AGENT.to_string());
        policy.rules.push(RobotsRule {
            user_agent: WILDCARD_AGENT.to_string(),
            path_pattern: "/".to_string(),
            allow: false,
        });
        policy
    }

    fn empty(domain: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        Self {
            domain: domain.to_string(),
            fetched_at: now,
            rules: Vec::new(),
            crawl_delays: Vec::new(),
            user_agents: BTreeSet::new(),
            expires_at: now + ttl,
            degraded: false,
        }
    }

    /// 标记为降级策略
    pub fn into_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// 判断指定 User-agent 是否允许访问路径
    ///
    /// 存在与 User-agent 匹配的具体分组时只使用这些分组，否则使用 `*` 分组。
    /// 多条规则匹配时取模式最长者；长度相同时 Allow 优先。
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        if path == "/robots.txt" {
            return true;
        }

        let group = self.applicable_group(user_agent);
        let mut best: Option<(usize, bool)> = None;
        for rule in self.rules.iter().filter(|r| group.contains(&r.user_agent)) {
            if !pattern_matches(&rule.path_pattern, path) {
                continue;
            }
            let priority = rule.path_pattern.len();
            best = match best {
                Some((len, allow)) if len > priority || (len == priority && allow) => {
                    Some((len, allow))
                }
                _ => Some((priority, rule.allow)),
            };
        }

        best.map(|(_, allow)| allow).unwrap_or(true)
    }

    /// 指定 User-agent 的抓取间隔（秒），未声明时为 None
    pub fn crawl_delay_seconds(&self, user_agent: &str) -> Option<f64> {
        let group = self.applicable_group(user_agent);
        self.crawl_delays
            .iter()
            .filter(|d| group.contains(&d.user_agent))
            .map(|d| d.seconds)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))
    }

    /// 指定 User-agent 的抓取间隔，未声明时为 0，最大为 [`MAX_CRAWL_DELAY`]
    pub fn crawl_delay(&self, user_agent: &str) -> Duration {
        self.crawl_delay_seconds(user_agent)
            .map(|s| {
                Duration::try_from_secs_f64(s)
                    .unwrap_or(MAX_CRAWL_DELAY)
                    .min(MAX_CRAWL_DELAY)
            })
            .unwrap_or(Duration::ZERO)
    }

    /// 计算适用的 User-agent 集合
    fn applicable_group(&self, user_agent: &str) -> BTreeSet<String> {
        let specific: BTreeSet<String> = self
            .user_agents
            .iter()
            .filter(|agent| agent.as_str() != WILDCARD_AGENT && agent_matches(agent, user_agent))
            .cloned()
            .collect();

        if specific.is_empty() {
            BTreeSet::from([WILDCARD_AGENT.to_string()])
        } else {
            specific
        }
    }
}

/// 具体 User-agent 的匹配：取产品名部分，大小写不敏感的包含匹配
fn agent_matches(agent: &str, user_agent: &str) -> bool {
    let token = agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    !token.is_empty() && user_agent.to_lowercase().contains(token)
}

/// 路径模式匹配
///
/// 模式总是从路径开头匹配；`*` 匹配任意字符序列；结尾的 `$` 要求匹配到路径末尾。
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    if !path.starts_with(first) {
        return false;
    }
    if parts.len() == 1 {
        return !anchored || path.len() == first.len();
    }

    let mut pos = first.len();
    for part in &parts[1..parts.len() - 1] {
        match path[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }

    let last = parts[parts.len() - 1];
    if anchored {
        path[pos..].ends_with(last)
    } else {
        path[pos..].contains(last)
    }
}

#[derive(Default)]
struct PolicyBuilder {
    rules: Vec<RobotsRule>,
    crawl_delays: Vec<CrawlDelay>,
    user_agents: BTreeSet<String>,
    current_agents: Vec<String>,
    in_agent_block: bool,
}

impl PolicyBuilder {
    fn push_rule(&mut self, value: &str, allow: bool) {
        self.in_agent_block = false;
        // 空的 Disallow 表示允许全部，不产生规则
        if value.is_empty() {
            return;
        }
        for agent in &self.current_agents {
            self.rules.push(RobotsRule {
                user_agent: agent.clone(),
                path_pattern: value.to_string(),
                allow,
            });
        }
    }
}

impl RobotsParseHandler for PolicyBuilder {
    fn handle_robots_start(&mut self) {}

    fn handle_robots_end(&mut self) {}

    fn handle_user_agent(&mut self, _line_num: u32, user_agent: &str) {
        if !self.in_agent_block {
            self.current_agents.clear();
        }
        self.in_agent_block = true;

        let agent = user_agent.trim().to_lowercase();
        if agent.is_empty() {
            return;
        }
        self.user_agents.insert(agent.clone());
        self.current_agents.push(agent);
    }

    fn handle_allow(&mut self, _line_num: u32, value: &str) {
        self.push_rule(value.trim(), true);
    }

    fn handle_disallow(&mut self, _line_num: u32, value: &str) {
        self.push_rule(value.trim(), false);
    }

    fn handle_sitemap(&mut self, _line_num: u32, _value: &str) {}

    fn handle_unknown_action(&mut self, _line_num: u32, action: &str, value: &str) {
        let action = action.trim().to_ascii_lowercase();
        if action != "crawl-delay" && action != "crawl_delay" {
            return;
        }
        self.in_agent_block = false;

        let seconds = match value.trim().parse::<f64>() {
            Ok(s) if s.is_finite() && s >= 0.0 => s,
            _ => return,
        };
        for agent in &self.current_agents {
            self.crawl_delays.push(CrawlDelay {
                user_agent: agent.clone(),
                seconds,
            });
        }
    }
}

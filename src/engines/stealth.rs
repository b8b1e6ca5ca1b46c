// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use rand::seq::IndexedRandom;
use std::collections::BTreeMap;

use crate::engines::traits::{StealthProfile, Viewport};

/// 桌面浏览器 User-Agent 池
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// 常见桌面分辨率
const VIEWPORTS: &[Viewport] = &[
    Viewport { width: 1920, height: 1080 },
    Viewport { width: 1536, height: 864 },
    Viewport { width: 1440, height: 900 },
    Viewport { width: 1366, height: 768 },
    Viewport { width: 1280, height: 720 },
];

/// 页面中出现这些标记时视为遇到验证码
const CAPTCHA_INDICATORS: &[&str] = &["captcha", "recaptcha", "hcaptcha", "i'm not a robot"];

/// 隐藏自动化特征的注入脚本，在每个文档加载前执行
pub const STEALTH_INIT_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
window.chrome = { runtime: {} };
"#;

/// 启动浏览器时附加的参数
pub const STEALTH_LAUNCH_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
    "--disable-blink-features=AutomationControlled",
];

/// 滚动到底部并返回新的页面高度
pub const SCROLL_SCRIPT: &str =
    "window.scrollTo(0, document.body.scrollHeight); document.body.scrollHeight";

/// 为新会话随机生成伪装参数
pub fn random_profile() -> StealthProfile {
    let mut rng = rand::rng();
    let user_agent = USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string();
    let viewport = VIEWPORTS.choose(&mut rng).copied().unwrap_or(VIEWPORTS[0]);

    StealthProfile {
        user_agent,
        viewport,
        extra_headers: default_headers(),
    }
}

fn default_headers() -> BTreeMap<String, String> {
    [
        ("Accept-Language", "en-US,en;q=0.9"),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Upgrade-Insecure-Requests", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// 检测页面是否包含验证码
///
/// 只做检测，不尝试破解
pub fn detect_captcha(html: &str) -> bool {
    let lower = html.to_lowercase();
    CAPTCHA_INDICATORS
        .iter()
        .any(|indicator| lower.contains(indicator))
}

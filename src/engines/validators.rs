// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::net::IpAddr;
use tokio::net::lookup_host;
use url::Url;

use crate::engines::traits::EngineError;

/// 验证 URL 是否安全 (防止 SSRF)
///
/// 只允许 http/https；检查解析后的 IP 是否为私有地址或环回地址
pub async fn validate_url(url: &Url) -> Result<(), EngineError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(EngineError::Blocked(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| EngineError::Blocked(format!("missing host in {}", url)))?;

    if host.eq_ignore_ascii_case("localhost") {
        return Err(EngineError::Blocked("localhost is not allowed".to_string()));
    }

    // IP 字面量无需 DNS 解析
    if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return check_ip(ip);
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = lookup_host(format!("{}:{}", host, port))
        .await
        .map_err(|e| EngineError::Navigation(format!("DNS lookup for {} failed: {}", host, e)))?;

    for addr in addrs {
        check_ip(addr.ip())?;
    }
    Ok(())
}

fn check_ip(ip: IpAddr) -> Result<(), EngineError> {
    if is_private_ip(ip) {
        return Err(EngineError::Blocked(format!(
            "private IP access is not allowed: {}",
            ip
        )));
    }
    Ok(())
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_unspecified()
                || (224..=239).contains(&octets[0])
        }
        IpAddr::V6(ipv6) => {
            let first = ipv6.segments()[0];
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // Unique Local Address (fc00::/7)
                || (first & 0xfe00) == 0xfc00
                // Link-local (fe80::/10)
                || (first & 0xffc0) == 0xfe80
                // Multicast (ff00::/8)
                || (first & 0xff00) == 0xff00
        }
    }
}

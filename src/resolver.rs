use log::{debug, warn};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::ratelimit::RateLimiter;

/// 默认 DNS 端口
pub const DEFAULT_DNS_PORT: u16 = 53;

/// 一个上游 DNS 服务器
#[derive(Debug)]
pub struct Resolver {
    addr: SocketAddr,
    limiter: RateLimiter,
    healthy: AtomicBool,
    failures: AtomicU32,
}

impl Resolver {
    pub fn new(addr: SocketAddr, rate_limit: u64) -> Self {
        Resolver {
            addr,
            limiter: RateLimiter::per_second(rate_limit),
            healthy: AtomicBool::new(true),
            failures: AtomicU32::new(0),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// 查询成功，清零连续失败计数
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// 记录一次失败，达到阈值后剔除；返回本次调用是否触发了剔除
    pub fn record_failure(&self, threshold: u32) -> bool {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= threshold {
            return self.evict();
        }
        false
    }

    /// 剔除出轮换，健康标志只会被翻转一次
    pub fn evict(&self) -> bool {
        let evicted = self
            .healthy
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if evicted {
            warn!("解析器 {} 连续失败，已剔除", self.addr);
        }
        evicted
    }
}

impl fmt::Display for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// 解析 `host` 或 `host:port` 形式的解析器地址，缺省端口为 53
///
/// host 必须是 IP 字面量；带端口的 IPv6 地址需要使用方括号。
pub fn parse_resolver_addr(input: &str) -> Option<SocketAddr> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Some(addr);
    }
    let host = input.trim_start_matches('[').trim_end_matches(']');
    host.parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, DEFAULT_DNS_PORT))
}

/// 规范化解析器地址为 `host:port` 字符串
pub fn normalize_resolver_addr(input: &str) -> Option<String> {
    parse_resolver_addr(input).map(|addr| addr.to_string())
}

/// 解析每行一个地址的解析器列表，跳过空行、注释和无法识别的行
pub fn parse_resolver_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let addr = normalize_resolver_addr(line);
            if addr.is_none() {
                debug!("跳过无法识别的解析器: {}", line);
            }
            addr
        })
        .collect()
}

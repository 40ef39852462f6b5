//! 两级解析器池
//!
//! 候选池由用户提供并经过校验的解析器组成，承担主要查询流量；
//! 基线池由少量知名公共解析器组成，作为兜底和 NXDOMAIN 确认。
//! 所有查询都要经过全局速率限制和单个解析器的速率限制。

use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::error::{Error, QueryError, Result};
use crate::ratelimit::RateLimiter;
use crate::resolver::{parse_resolver_addr, Resolver};
use crate::transport::{DnsAnswer, DnsTransport, RecordKind};
use crate::util::{fd_limit, max_resolvers_for};
use crate::validate::{validate_resolvers, LivenessProbe};

/// 内置的知名公共解析器
pub const DEFAULT_RESOLVERS: &[&str] = &[
    "1.1.1.1:53",     // Cloudflare
    "8.8.8.8:53",     // Google
    "64.6.64.6:53",   // Verisign
    "77.88.8.8:53",   // Yandex.DNS
    "74.82.42.42:53", // Hurricane Electric
    "1.0.0.1:53",     // Cloudflare Secondary
    "8.8.4.4:53",     // Google Secondary
    "77.88.8.1:53",   // Yandex.DNS Secondary
];

/// 单个候选解析器的默认每秒配额
pub const DEFAULT_RESOLVER_QUOTA: u64 = 15;

/// 单个基线解析器的默认每秒配额
pub const DEFAULT_BASELINE_QUOTA: u64 = 10;

/// 内置解析器列表
pub fn default_resolvers() -> Vec<SocketAddr> {
    DEFAULT_RESOLVERS
        .iter()
        .filter_map(|s| parse_resolver_addr(s))
        .collect()
}

/// 解析器池配置
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 期望的全局每秒查询数，None 时按候选数量计算
    pub rate_limit: Option<u64>,
    /// 单个候选解析器的默认每秒配额
    pub resolver_quota: u64,
    /// 基线解析器
    pub baseline: Vec<SocketAddr>,
    /// 单个基线解析器的每秒配额
    pub baseline_quota: u64,
    /// 候选解析器数量上限，None 时取文件描述符上限的 70%
    pub max_resolvers: Option<usize>,
    /// 每一级池内的最大尝试次数
    pub retries: usize,
    /// 连续失败多少次后剔除解析器
    pub failure_threshold: u32,
    /// 每个候选解析器的并发系数
    pub candidate_concurrency: usize,
    /// 每个基线解析器的并发系数
    pub baseline_concurrency: usize,
    /// 候选解析器返回的 NXDOMAIN 是否交由基线确认
    pub confirm_nxdomain: bool,
    /// 单次查询超时
    pub query_timeout: Duration,
    /// 候选解析器校验探针
    pub probe: LivenessProbe,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            rate_limit: None,
            resolver_quota: DEFAULT_RESOLVER_QUOTA,
            baseline: default_resolvers(),
            baseline_quota: DEFAULT_BASELINE_QUOTA,
            max_resolvers: None,
            retries: 3,
            failure_threshold: 5,
            candidate_concurrency: 8,
            baseline_concurrency: 2,
            confirm_nxdomain: true,
            query_timeout: Duration::from_secs(3),
            probe: LivenessProbe::default(),
        }
    }
}

/// 计算候选池的速率上限
///
/// 配置值低于候选数量时提升到每个候选至少 1 q/s；
/// 未配置时为默认配额乘以候选数量。
pub fn effective_rate(configured: Option<u64>, candidates: usize, quota: u64) -> u64 {
    let count = candidates as u64;
    match configured {
        Some(rate) => rate.max(count),
        None => quota * count,
    }
}

/// 同一级的一组解析器
struct Tier {
    name: &'static str,
    members: Vec<Arc<Resolver>>,
    permits: Semaphore,
}

impl Tier {
    fn new(name: &'static str, members: Vec<Arc<Resolver>>, concurrency: usize) -> Self {
        let permits = (members.len() * concurrency).max(1);
        Tier {
            name,
            members,
            permits: Semaphore::new(permits),
        }
    }

    fn live_count(&self) -> usize {
        self.members.iter().filter(|r| r.is_healthy()).count()
    }

    fn has_live(&self) -> bool {
        self.members.iter().any(|r| r.is_healthy())
    }

    /// 按当前窗口剩余配额加权挑选一个存活成员，优先未尝试过的成员
    fn pick(&self, tried: &[SocketAddr]) -> Option<Arc<Resolver>> {
        let live: Vec<&Arc<Resolver>> = self.members.iter().filter(|r| r.is_healthy()).collect();
        if live.is_empty() {
            return None;
        }
        let fresh: Vec<&Arc<Resolver>> = live
            .iter()
            .copied()
            .filter(|r| !tried.contains(&r.addr()))
            .collect();
        let choices = if fresh.is_empty() { live } else { fresh };

        let weights: Vec<u64> = choices.iter().map(|r| r.limiter().remaining()).collect();
        let mut rng = rand::thread_rng();
        let index = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut rng),
            // 配额全部用尽，随机选一个等待下个窗口
            Err(_) => rng.gen_range(0..choices.len()),
        };
        Some(Arc::clone(choices[index]))
    }
}

/// 两级解析器池
pub struct ResolverPool {
    candidates: Tier,
    baseline: Tier,
    global: RateLimiter,
    transport: Arc<dyn DnsTransport>,
    retries: usize,
    failure_threshold: u32,
    confirm_nxdomain: bool,
    query_timeout: Duration,
}

impl ResolverPool {
    /// 校验候选解析器并构建两级池
    ///
    /// 两级都为空时返回 [`Error::EmptyPool`]。
    pub async fn setup(
        candidates: Vec<String>,
        config: PoolConfig,
        transport: Arc<dyn DnsTransport>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut addrs = Vec::new();
        for candidate in &candidates {
            match parse_resolver_addr(candidate) {
                Some(addr) => {
                    if seen.insert(addr) {
                        addrs.push(addr);
                    }
                }
                None => debug!("跳过无法识别的解析器地址: {}", candidate),
            }
        }

        let max = config
            .max_resolvers
            .unwrap_or_else(|| max_resolvers_for(fd_limit()));
        if addrs.len() > max {
            warn!("候选解析器数量 {} 超过上限 {}，只保留前 {} 个可用解析器", addrs.len(), max, max);
        }

        let working = validate_resolvers(Arc::clone(&transport), addrs, config.probe.clone(), max).await;

        // 上限按通过校验的数量计算
        let rate = effective_rate(config.rate_limit, working.len(), config.resolver_quota);
        let per_resolver = match config.rate_limit {
            _ if working.is_empty() => 0,
            Some(_) => (rate / working.len() as u64).max(1),
            None => config.resolver_quota,
        };
        let candidate_members: Vec<Arc<Resolver>> = working
            .into_iter()
            .map(|addr| Arc::new(Resolver::new(addr, per_resolver)))
            .collect();

        let mut seen = HashSet::new();
        let baseline_members: Vec<Arc<Resolver>> = config
            .baseline
            .iter()
            .filter(|addr| seen.insert(**addr))
            .map(|addr| Arc::new(Resolver::new(*addr, config.baseline_quota)))
            .collect();

        if candidate_members.is_empty() && baseline_members.is_empty() {
            return Err(Error::EmptyPool);
        }

        let baseline_rate = config.baseline_quota * baseline_members.len() as u64;
        // 未配置速率时基线池的配额也计入全局上限
        let global_rate = match config.rate_limit {
            Some(_) => rate,
            None => rate + baseline_rate,
        };

        info!(
            "解析器池: 候选 {} 个, 基线 {} 个, 全局速率 {} q/s",
            candidate_members.len(),
            baseline_members.len(),
            global_rate
        );

        Ok(ResolverPool {
            candidates: Tier::new("candidate", candidate_members, config.candidate_concurrency),
            baseline: Tier::new("baseline", baseline_members, config.baseline_concurrency),
            global: RateLimiter::per_second(global_rate),
            transport,
            retries: config.retries.max(1),
            failure_threshold: config.failure_threshold.max(1),
            confirm_nxdomain: config.confirm_nxdomain,
            query_timeout: config.query_timeout,
        })
    }

    /// 候选池成员数量
    pub fn candidate_count(&self) -> usize {
        self.candidates.members.len()
    }

    /// 基线池成员数量
    pub fn baseline_count(&self) -> usize {
        self.baseline.members.len()
    }

    /// 仍在轮换中的解析器数量
    pub fn live_count(&self) -> usize {
        self.candidates.live_count() + self.baseline.live_count()
    }

    /// 全局每秒查询上限
    pub fn global_rate(&self) -> u64 {
        self.global.quota()
    }

    /// 候选池查询，失败或无可用候选时回退到基线池
    pub async fn query(&self, name: &str, kind: RecordKind) -> std::result::Result<DnsAnswer, QueryError> {
        let mut last = None;
        if self.candidates.has_live() {
            match self.query_tier(&self.candidates, name, kind).await {
                Ok(answer) if answer.nxdomain && self.confirm_nxdomain && self.baseline.has_live() => {
                    return match self.query_tier(&self.baseline, name, kind).await {
                        Ok(confirmed) => Ok(confirmed),
                        Err(_) => Ok(answer),
                    };
                }
                Ok(answer) => return Ok(answer),
                Err(e) => last = Some(e),
            }
        }
        if self.baseline.has_live() {
            return self
                .query_tier(&self.baseline, name, kind)
                .await
                .map_err(|e| self.exhausted_or(Some(e)));
        }
        Err(self.exhausted_or(last))
    }

    /// 优先使用基线池查询，其应答视为可信结果
    pub async fn query_trusted(
        &self,
        name: &str,
        kind: RecordKind,
    ) -> std::result::Result<DnsAnswer, QueryError> {
        if self.baseline.has_live() {
            match self.query_tier(&self.baseline, name, kind).await {
                Ok(answer) => return Ok(answer),
                Err(e) if !self.candidates.has_live() => return Err(self.exhausted_or(Some(e))),
                Err(e) => debug!("基线池查询 {} 失败: {}，改用候选池", name, e),
            }
        }
        if self.candidates.has_live() {
            return self
                .query_tier(&self.candidates, name, kind)
                .await
                .map_err(|e| self.exhausted_or(Some(e)));
        }
        Err(QueryError::PoolExhausted)
    }

    fn exhausted_or(&self, last: Option<QueryError>) -> QueryError {
        if !self.candidates.has_live() && !self.baseline.has_live() {
            return QueryError::PoolExhausted;
        }
        last.unwrap_or(QueryError::Timeout)
    }

    async fn query_tier(
        &self,
        tier: &Tier,
        name: &str,
        kind: RecordKind,
    ) -> std::result::Result<DnsAnswer, QueryError> {
        let mut tried = Vec::with_capacity(self.retries);
        let mut last = QueryError::Timeout;

        for _ in 0..self.retries {
            let Some(resolver) = tier.pick(&tried) else {
                break;
            };
            tried.push(resolver.addr());

            self.global.acquire().await;
            resolver.limiter().acquire().await;
            let _permit = tier
                .permits
                .acquire()
                .await
                .map_err(|_| QueryError::PoolExhausted)?;

            let result = timeout(self.query_timeout, self.transport.query(resolver.addr(), name, kind))
                .await
                .unwrap_or(Err(QueryError::Timeout));
            match result {
                Ok(answer) => {
                    resolver.record_success();
                    return Ok(answer);
                }
                Err(e) => {
                    debug!("[{}] {} 查询 {} 失败: {}", tier.name, resolver, name, e);
                    resolver.record_failure(self.failure_threshold);
                    last = e;
                }
            }
        }
        Err(last)
    }
}

use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::QueryError;

/// 查询的记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    A,
    Aaaa,
    Cname,
}

impl From<RecordKind> for RecordType {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::A => RecordType::A,
            RecordKind::Aaaa => RecordType::AAAA,
            RecordKind::Cname => RecordType::CNAME,
        }
    }
}

/// 一次查询的应答
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsAnswer {
    /// 应答中的地址集合
    pub ips: BTreeSet<IpAddr>,
    /// CNAME 链的最终目标（小写，去掉末尾的点）
    pub cname: Option<String>,
    /// 是否为 NXDOMAIN
    pub nxdomain: bool,
}

impl DnsAnswer {
    pub fn nxdomain() -> Self {
        DnsAnswer {
            nxdomain: true,
            ..Default::default()
        }
    }

    pub fn with_ips<I: IntoIterator<Item = IpAddr>>(ips: I) -> Self {
        DnsAnswer {
            ips: ips.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_cname(target: &str) -> Self {
        DnsAnswer {
            cname: Some(normalize_target(target)),
            ..Default::default()
        }
    }

    /// 既没有地址也没有别名
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.cname.is_none()
    }
}

/// 去掉 FQDN 末尾的点并转为小写
pub fn normalize_target(target: &str) -> String {
    target.trim_end_matches('.').to_ascii_lowercase()
}

/// DNS 传输层：向指定服务器提出一个问题
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn query(
        &self,
        server: SocketAddr,
        name: &str,
        kind: RecordKind,
    ) -> Result<DnsAnswer, QueryError>;
}

/// 基于 trust-dns 的传输层，每个上游服务器一个单服务器解析器
pub struct TrustDnsTransport {
    timeout: Duration,
    resolvers: Mutex<HashMap<SocketAddr, TokioAsyncResolver>>,
}

impl TrustDnsTransport {
    pub fn new(timeout: Duration) -> Self {
        TrustDnsTransport {
            timeout,
            resolvers: Mutex::new(HashMap::new()),
        }
    }

    /// 获取（或创建）指定服务器的解析器
    fn resolver_for(&self, server: SocketAddr) -> TokioAsyncResolver {
        let mut resolvers = self.resolvers.lock().unwrap_or_else(|e| e.into_inner());
        resolvers
            .entry(server)
            .or_insert_with(|| {
                let group = NameServerConfigGroup::from_ips_clear(&[server.ip()], server.port(), true);
                let config = ResolverConfig::from_parts(None, vec![], group);

                let mut opts = ResolverOpts::default();
                opts.timeout = self.timeout;
                // 重试与缓存由解析器池负责
                opts.attempts = 0;
                opts.cache_size = 0;
                opts.use_hosts_file = false;
                opts.preserve_intermediates = true;

                TokioAsyncResolver::tokio(config, opts)
            })
            .clone()
    }
}

#[async_trait]
impl DnsTransport for TrustDnsTransport {
    async fn query(
        &self,
        server: SocketAddr,
        name: &str,
        kind: RecordKind,
    ) -> Result<DnsAnswer, QueryError> {
        let resolver = self.resolver_for(server);
        // 以点结尾避免搜索域拼接
        let fqdn = format!("{}.", name.trim_end_matches('.'));

        match resolver.lookup(fqdn.as_str(), kind.into()).await {
            Ok(response) => {
                let mut answer = DnsAnswer::default();
                for record in response.iter() {
                    match record {
                        RData::A(a) => {
                            answer.ips.insert(IpAddr::V4(a.0));
                        }
                        RData::AAAA(aaaa) => {
                            answer.ips.insert(IpAddr::V6(aaaa.0));
                        }
                        RData::CNAME(cname) => {
                            // 链上最后一个 CNAME 即最终目标
                            answer.cname = Some(normalize_target(&cname.to_string()));
                        }
                        _ => {}
                    }
                }
                Ok(answer)
            }
            Err(e) => map_resolve_error(server, name, e),
        }
    }
}

fn map_resolve_error(
    server: SocketAddr,
    name: &str,
    err: ResolveError,
) -> Result<DnsAnswer, QueryError> {
    debug!("{} 查询 {} 失败: {}", server, name, err);
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
            ResponseCode::NXDomain => Ok(DnsAnswer::nxdomain()),
            ResponseCode::NoError => Ok(DnsAnswer::default()),
            code => Err(QueryError::ServerFailure(code.to_string())),
        },
        ResolveErrorKind::Timeout => Err(QueryError::Timeout),
        ResolveErrorKind::Proto(e) => Err(QueryError::Malformed(e.to_string())),
        ResolveErrorKind::Io(e) => Err(QueryError::Transport(e.to_string())),
        _ => Err(QueryError::Transport(err.to_string())),
    }
}


/// 单元测试用的内存 DNS
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::grouper::is_subdomain_of;
    use crate::pool::{PoolConfig, ResolverPool};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 精确记录 + 泛解析记录，其余名称返回 NXDOMAIN
    #[derive(Default)]
    pub struct ZoneTransport {
        records: HashMap<String, DnsAnswer>,
        wildcards: HashMap<String, DnsAnswer>,
        delay: Duration,
        failing: bool,
        queries: AtomicUsize,
    }

    impl ZoneTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn record(mut self, name: &str, ips: &[&str]) -> Self {
            let answer = DnsAnswer::with_ips(ips.iter().filter_map(|s| s.parse().ok()));
            self.records.insert(name.to_string(), answer);
            self
        }

        pub fn wildcard(mut self, domain: &str, ips: &[&str]) -> Self {
            let answer = DnsAnswer::with_ips(ips.iter().filter_map(|s| s.parse().ok()));
            self.wildcards.insert(domain.to_string(), answer);
            self
        }

        pub fn delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// 通过校验后所有业务查询都超时
        pub fn failing(mut self) -> Self {
            self.failing = true;
            self
        }

        /// 业务查询次数（不含校验查询）
        pub fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }

        fn lookup(&self, name: &str) -> DnsAnswer {
            if let Some(answer) = self.records.get(name) {
                return answer.clone();
            }
            self.wildcards
                .iter()
                .find(|(domain, _)| name != domain.as_str() && is_subdomain_of(name, domain))
                .map(|(_, answer)| answer.clone())
                .unwrap_or_else(DnsAnswer::nxdomain)
        }
    }

    #[async_trait]
    impl DnsTransport for ZoneTransport {
        async fn query(
            &self,
            _server: SocketAddr,
            name: &str,
            kind: RecordKind,
        ) -> Result<DnsAnswer, QueryError> {
            if name == "one.one.one.one" {
                return Ok(DnsAnswer::with_ips(vec!["1.1.1.1".parse().unwrap()]));
            }
            if is_subdomain_of(name, "example.com") && !self.records.contains_key(name) {
                return Ok(DnsAnswer::nxdomain());
            }
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                return Err(QueryError::Timeout);
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let answer = self.lookup(name);
            match kind {
                RecordKind::Cname if !answer.nxdomain => Ok(DnsAnswer {
                    ips: BTreeSet::new(),
                    ..answer
                }),
                _ => Ok(answer),
            }
        }
    }

    /// 单个候选解析器、无基线的池
    pub async fn single_pool(transport: Arc<ZoneTransport>) -> Arc<ResolverPool> {
        let config = PoolConfig {
            baseline: vec![],
            max_resolvers: Some(10),
            rate_limit: Some(1_000_000),
            query_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let pool = ResolverPool::setup(vec!["10.0.0.1".to_string()], config, transport)
            .await
            .unwrap();
        Arc::new(pool)
    }
}

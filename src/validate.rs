//! 候选解析器的存活与正确性校验
//!
//! 每个候选解析器需要通过两项检查：
//! 1. 已知域名必须解析到预期地址集合之内；
//! 2. 已知无泛解析域名下的随机子域名必须返回 NXDOMAIN，
//!    用于排除劫持 NXDOMAIN 或被滥用的开放解析器。

use log::{debug, info};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::transport::{DnsTransport, RecordKind};
use crate::util::random_label;

/// 校验探针配置
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    /// 已知可解析的域名
    pub known_name: String,
    /// 已知域名的预期地址，为空时只要求应答非空
    pub expected: BTreeSet<IpAddr>,
    /// 已知没有泛解析的域名，其随机子域名必须为 NXDOMAIN
    pub nx_parent: String,
    /// 单个解析器校验的总时长上限
    pub timeout: Duration,
}

impl Default for LivenessProbe {
    fn default() -> Self {
        LivenessProbe {
            known_name: "one.one.one.one".to_string(),
            expected: [
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)),
            ]
            .into_iter()
            .collect(),
            nx_parent: "example.com".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// 校验单个解析器
pub async fn check_resolver(
    transport: &dyn DnsTransport,
    server: SocketAddr,
    probe: &LivenessProbe,
) -> bool {
    let checks = async {
        match transport.query(server, &probe.known_name, RecordKind::A).await {
            Ok(answer) => {
                if answer.ips.is_empty() {
                    debug!("{} 对 {} 返回空应答", server, probe.known_name);
                    return false;
                }
                if !probe.expected.is_empty() && !answer.ips.is_subset(&probe.expected) {
                    debug!("{} 对 {} 返回了错误地址 {:?}", server, probe.known_name, answer.ips);
                    return false;
                }
            }
            Err(e) => {
                debug!("{} 校验查询失败: {}", server, e);
                return false;
            }
        }

        let bogus = format!("{}.{}", random_label(16), probe.nx_parent);
        match transport.query(server, &bogus, RecordKind::A).await {
            Ok(answer) if answer.nxdomain => true,
            Ok(answer) => {
                debug!("{} 劫持了不存在的域名 {}: {:?}", server, bogus, answer.ips);
                false
            }
            Err(e) => {
                debug!("{} 校验查询失败: {}", server, e);
                false
            }
        }
    };

    timeout(probe.timeout, checks).await.unwrap_or(false)
}

/// 并发校验候选解析器，保留最先通过的 `max` 个
///
/// 每个候选一个任务，结果写入容量等于任务数的通道；
/// 收满 `max` 个后中止其余任务。
pub async fn validate_resolvers(
    transport: Arc<dyn DnsTransport>,
    candidates: Vec<SocketAddr>,
    probe: LivenessProbe,
    max: usize,
) -> Vec<SocketAddr> {
    if candidates.is_empty() || max == 0 {
        return Vec::new();
    }

    let probe = Arc::new(probe);
    let limit = Arc::new(Semaphore::new(max));
    let (tx, mut rx) = mpsc::channel(candidates.len());
    let mut tasks = JoinSet::new();

    for server in candidates {
        let transport = Arc::clone(&transport);
        let probe = Arc::clone(&probe);
        let limit = Arc::clone(&limit);
        let tx = tx.clone();
        tasks.spawn(async move {
            let Ok(_permit) = limit.acquire_owned().await else {
                return;
            };
            let ok = check_resolver(transport.as_ref(), server, &probe).await;
            let _ = tx.send((server, ok)).await;
        });
    }
    drop(tx);

    let mut working = Vec::new();
    while let Some((server, ok)) = rx.recv().await {
        if ok {
            working.push(server);
            if working.len() >= max {
                break;
            }
        }
    }
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}

    info!("校验通过的解析器: {}", working.len());
    working
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::transport::DnsAnswer;
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Honest,
        Hijack,
        WrongAnswer,
        Dead,
    }

    struct FakeTransport {
        servers: HashMap<SocketAddr, Behaviour>,
    }

    #[async_trait]
    impl DnsTransport for FakeTransport {
        async fn query(
            &self,
            server: SocketAddr,
            name: &str,
            _kind: RecordKind,
        ) -> Result<DnsAnswer, QueryError> {
            let behaviour = self.servers.get(&server).copied().unwrap_or(Behaviour::Dead);
            let known = name == "one.one.one.one";
            match behaviour {
                Behaviour::Dead => Err(QueryError::Timeout),
                Behaviour::WrongAnswer if known => {
                    Ok(DnsAnswer::with_ips(vec!["10.0.0.1".parse().unwrap()]))
                }
                _ if known => Ok(DnsAnswer::with_ips(vec!["1.1.1.1".parse().unwrap()])),
                Behaviour::Hijack => Ok(DnsAnswer::with_ips(vec!["6.6.6.6".parse().unwrap()])),
                _ => Ok(DnsAnswer::nxdomain()),
            }
        }
    }

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), 53)
    }

    fn fake(behaviours: &[(u8, Behaviour)]) -> Arc<dyn DnsTransport> {
        Arc::new(FakeTransport {
            servers: behaviours.iter().map(|(n, b)| (addr(*n), *b)).collect(),
        })
    }

    #[tokio::test]
    async fn test_check_resolver() {
        let transport = fake(&[
            (1, Behaviour::Honest),
            (2, Behaviour::Hijack),
            (3, Behaviour::WrongAnswer),
            (4, Behaviour::Dead),
        ]);
        let probe = LivenessProbe::default();
        assert!(check_resolver(transport.as_ref(), addr(1), &probe).await);
        assert!(!check_resolver(transport.as_ref(), addr(2), &probe).await);
        assert!(!check_resolver(transport.as_ref(), addr(3), &probe).await);
        assert!(!check_resolver(transport.as_ref(), addr(4), &probe).await);
    }

    #[tokio::test]
    async fn test_validate_keeps_only_working() {
        let transport = fake(&[
            (1, Behaviour::Honest),
            (2, Behaviour::Hijack),
            (3, Behaviour::Honest),
            (4, Behaviour::Dead),
        ]);
        let candidates = (1..=4).map(addr).collect();
        let mut working =
            validate_resolvers(transport, candidates, LivenessProbe::default(), 10).await;
        working.sort();
        assert_eq!(working, vec![addr(1), addr(3)]);
    }

    #[tokio::test]
    async fn test_validate_caps_at_max() {
        let transport = fake(&(1..=20).map(|n| (n, Behaviour::Honest)).collect::<Vec<_>>());
        let candidates = (1..=20).map(addr).collect();
        let working = validate_resolvers(transport, candidates, LivenessProbe::default(), 5).await;
        assert_eq!(working.len(), 5);
    }

    #[tokio::test]
    async fn test_validate_all_fail() {
        let transport = fake(&[(1, Behaviour::Dead), (2, Behaviour::Hijack)]);
        let candidates = vec![addr(1), addr(2)];
        let working = validate_resolvers(transport, candidates, LivenessProbe::default(), 5).await;
        assert!(working.is_empty());
    }
}

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use crate::error::{Error, QueryError, Result};
use crate::model::{ClassificationJob, ClassificationResult};
use crate::pool::ResolverPool;
use crate::transport::{DnsAnswer, RecordKind};
use crate::util::random_label;

/// 泛解析签名：随机不存在子域名的共同应答
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardSignature {
    pub domain: String,
    pub ips: BTreeSet<IpAddr>,
    pub cname: Option<String>,
    pub built_at: DateTime<Utc>,
}

impl WildcardSignature {
    /// 没有泛解析的空签名
    pub fn empty(domain: &str) -> Self {
        WildcardSignature {
            domain: domain.to_string(),
            ips: BTreeSet::new(),
            cname: None,
            built_at: Utc::now(),
        }
    }

    /// 由探测应答构建签名，所有应答必须一致
    pub fn from_probes(domain: &str, answers: &[DnsAnswer]) -> Self {
        let mut signature = Self::empty(domain);
        let Some(first) = answers.first() else {
            return signature;
        };
        if answers.iter().any(|a| a.nxdomain) {
            return signature;
        }
        if !first.ips.is_empty() && answers.iter().all(|a| a.ips == first.ips) {
            signature.ips = first.ips.clone();
        }
        if first.cname.is_some() && answers.iter().all(|a| a.cname == first.cname) {
            signature.cname = first.cname.clone();
        }
        signature
    }

    /// 是否存在泛解析
    pub fn is_wildcard(&self) -> bool {
        !self.ips.is_empty() || self.cname.is_some()
    }

    /// 应答是否与签名一致：地址集合完全相同，或 CNAME 目标相同
    pub fn matches(&self, answer: &DnsAnswer) -> bool {
        if answer.nxdomain {
            return false;
        }
        let ip_match = !self.ips.is_empty() && answer.ips == self.ips;
        let cname_match = self.cname.is_some() && answer.cname == self.cname;
        ip_match || cname_match
    }
}

/// 分类器配置
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// 每个主域名的随机探测数量
    pub probe_count: usize,
    /// 随机标签长度
    pub label_len: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            probe_count: 3,
            label_len: 16,
        }
    }
}

type SignatureCell = Arc<OnceCell<Arc<WildcardSignature>>>;

/// 泛解析分类器
///
/// 每个主域名的签名只构建一次，并发请求同一域名的调用方等待同一次构建。
pub struct WildcardClassifier {
    pool: Arc<ResolverPool>,
    config: ClassifierConfig,
    signatures: Mutex<HashMap<String, SignatureCell>>,
    builds: AtomicUsize,
}

impl WildcardClassifier {
    pub fn new(pool: Arc<ResolverPool>, config: ClassifierConfig) -> Self {
        WildcardClassifier {
            pool,
            config,
            signatures: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// 已执行的签名构建次数
    pub fn signature_builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// 已知存在泛解析的主域名
    pub fn wildcard_domains(&self) -> Vec<String> {
        let signatures = self.signatures.lock().unwrap_or_else(|e| e.into_inner());
        let mut domains: Vec<String> = signatures
            .values()
            .filter_map(|cell| cell.get())
            .filter(|sig| sig.is_wildcard())
            .map(|sig| sig.domain.clone())
            .collect();
        domains.sort();
        domains
    }

    /// 获取主域名的签名，必要时构建
    pub async fn signature(&self, domain: &str) -> Result<Arc<WildcardSignature>> {
        let cell = {
            // 锁只用于决定谁来构建
            let mut signatures = self.signatures.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(signatures.entry(domain.to_string()).or_default())
        };
        let signature = cell
            .get_or_try_init(|| async {
                self.builds.fetch_add(1, Ordering::SeqCst);
                self.build_signature(domain).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(signature))
    }

    async fn build_signature(&self, domain: &str) -> Result<WildcardSignature> {
        let mut answers = Vec::with_capacity(self.config.probe_count);
        for _ in 0..self.config.probe_count {
            let probe = format!("{}.{}", random_label(self.config.label_len), domain);
            match self.resolve(&probe, true).await {
                Ok(answer) => answers.push(answer),
                Err(QueryError::PoolExhausted) => return Err(Error::PoolExhausted),
                Err(e) => warn!("泛解析探测 {} 失败: {}", probe, e),
            }
        }

        if answers.len() < self.config.probe_count.min(2) {
            warn!("{} 的有效探测不足，按无泛解析处理", domain);
            return Ok(WildcardSignature::empty(domain));
        }

        let signature = WildcardSignature::from_probes(domain, &answers);
        if signature.is_wildcard() {
            info!("检测到泛解析域名: {} {:?} {:?}", domain, signature.ips, signature.cname);
        } else {
            debug!("{} 不存在泛解析", domain);
        }
        Ok(signature)
    }

    /// 查询地址与别名：先查 A，应答为空且非 NXDOMAIN 时再查 CNAME
    async fn resolve(&self, name: &str, trusted: bool) -> std::result::Result<DnsAnswer, QueryError> {
        let answer = self.ask(name, RecordKind::A, trusted).await?;
        if answer.is_empty() && !answer.nxdomain {
            let alias = self.ask(name, RecordKind::Cname, trusted).await?;
            if alias.cname.is_some() {
                return Ok(alias);
            }
        }
        Ok(answer)
    }

    async fn ask(
        &self,
        name: &str,
        kind: RecordKind,
        trusted: bool,
    ) -> std::result::Result<DnsAnswer, QueryError> {
        if trusted {
            self.pool.query_trusted(name, kind).await
        } else {
            self.pool.query(name, kind).await
        }
    }

    /// 判断一个名称是否为泛解析产物
    ///
    /// 只有解析器池耗尽时返回错误，其余查询失败都按非泛解析处理。
    pub async fn classify(&self, name: &str, domain: &str) -> Result<ClassificationResult> {
        let signature = self.signature(domain).await?;

        let answer = match self.resolve(name, false).await {
            Ok(answer) => answer,
            Err(QueryError::PoolExhausted) => return Err(Error::PoolExhausted),
            Err(e) => {
                debug!("{} 查询失败: {}，按非泛解析处理", name, e);
                return Ok(ClassificationResult::new(name, domain, false, Vec::new()));
            }
        };

        let is_wildcard = signature.is_wildcard() && signature.matches(&answer);
        Ok(ClassificationResult::new(
            name,
            domain,
            is_wildcard,
            answer.ips.into_iter().collect(),
        ))
    }

    /// 分类一个任务
    pub async fn classify_job(&self, job: &ClassificationJob) -> Result<ClassificationResult> {
        self.classify(&job.name, &job.domain).await
    }
}

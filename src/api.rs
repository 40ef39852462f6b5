use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::dispatch::DispatchPipeline;
use crate::error::{Error, Result};
use crate::grouper::DomainGrouper;
use crate::input::read_resolver_file;
use crate::model::ClassificationResult;
use crate::output::OutputMode;
use crate::pool::{PoolConfig, ResolverPool, DEFAULT_RESOLVERS};
use crate::stats::{RunStats, RunSummary};
use crate::transport::{DnsTransport, TrustDnsTransport};
use crate::wildcard::{ClassifierConfig, WildcardClassifier};

/// 泛解析过滤配置
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// 工作者数量
    pub threads: usize,
    /// 结果输出方式
    pub output_mode: OutputMode,
    /// 单个名称的分类时限，超时按非泛解析处理
    pub job_timeout: Option<Duration>,
    /// 只处理该域名下的名称
    pub target_domain: Option<String>,
    /// 解析器池配置
    pub pool: PoolConfig,
    /// 泛解析签名配置
    pub classifier: ClassifierConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            threads: 10,
            output_mode: OutputMode::Tagged,
            job_timeout: None,
            target_domain: None,
            pool: PoolConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// 解析器来源
#[derive(Debug, Clone)]
pub struct ResolverSources {
    /// 是否从 public-dns.info 获取
    pub public_dns: bool,
    /// 用户提供的解析器列表文件
    pub resolver_file: Option<PathBuf>,
    /// 获取公共列表的 HTTP 超时
    pub http_timeout: Duration,
    /// 地理位置查询地址
    pub geo_url: String,
    /// 公共列表地址前缀
    pub list_url_base: String,
}

impl Default for ResolverSources {
    fn default() -> Self {
        ResolverSources {
            public_dns: false,
            resolver_file: None,
            http_timeout: Duration::from_secs(10),
            geo_url: "https://ipapi.co/json".to_string(),
            list_url_base: "https://public-dns.info/nameserver/".to_string(),
        }
    }
}

/// 解析器加载结果
#[derive(Debug)]
pub struct ResolverSetup {
    /// `host:port` 形式的候选解析器
    pub resolvers: Vec<String>,
    /// 获取公共列表时的错误，不影响运行
    pub fetch_error: Option<Error>,
    /// 是否退回了内置列表
    pub used_defaults: bool,
}

/// 汇总候选解析器：公共列表 + 用户文件，结果为空时使用内置列表
///
/// 用户文件读取失败是致命错误；公共列表获取失败只记录在 `fetch_error` 中。
pub async fn load_resolvers(sources: &ResolverSources) -> Result<ResolverSetup> {
    let mut resolvers = Vec::new();
    let mut fetch_error = None;

    if sources.public_dns {
        match fetch_public(sources).await {
            Ok(list) => {
                info!("获取到 {} 个公共解析器", list.len());
                resolvers.extend(list);
            }
            Err(e) => {
                warn!("获取公共解析器列表失败: {}", e);
                fetch_error = Some(e);
            }
        }
    }

    if let Some(path) = &sources.resolver_file {
        let list = read_resolver_file(path).await?;
        info!("从 {} 读取到 {} 个解析器", path.display(), list.len());
        resolvers.extend(list);
    }

    let used_defaults = resolvers.is_empty();
    if used_defaults {
        debug!("使用内置解析器列表");
        resolvers = DEFAULT_RESOLVERS.iter().map(|s| s.to_string()).collect();
    }

    Ok(ResolverSetup {
        resolvers,
        fetch_error,
        used_defaults,
    })
}

#[cfg(feature = "public-dns")]
async fn fetch_public(sources: &ResolverSources) -> Result<Vec<String>> {
    let source = crate::public_dns::PublicDnsSource::with_urls(
        sources.http_timeout,
        &sources.geo_url,
        &sources.list_url_base,
    )?;
    source.fetch().await
}

#[cfg(not(feature = "public-dns"))]
async fn fetch_public(_sources: &ResolverSources) -> Result<Vec<String>> {
    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "built without the public-dns feature",
    )))
}

/// 泛解析过滤引擎
pub struct WildcardFilter {
    config: FilterConfig,
    pool: Arc<ResolverPool>,
    classifier: Arc<WildcardClassifier>,
}

impl WildcardFilter {
    /// 使用 trust-dns 传输层创建引擎
    pub async fn new(config: FilterConfig, resolvers: Vec<String>) -> Result<Self> {
        let transport = Arc::new(TrustDnsTransport::new(config.pool.query_timeout));
        Self::with_transport(config, resolvers, transport).await
    }

    /// 使用指定的传输层创建引擎
    pub async fn with_transport(
        config: FilterConfig,
        resolvers: Vec<String>,
        transport: Arc<dyn DnsTransport>,
    ) -> Result<Self> {
        let pool = Arc::new(ResolverPool::setup(resolvers, config.pool.clone(), transport).await?);
        let classifier = Arc::new(WildcardClassifier::new(
            Arc::clone(&pool),
            config.classifier.clone(),
        ));

        Ok(WildcardFilter {
            config,
            pool,
            classifier,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ResolverPool> {
        &self.pool
    }

    pub fn classifier(&self) -> &Arc<WildcardClassifier> {
        &self.classifier
    }

    /// 逐行读取输入并分类，结果在完成时发送到 `results`
    ///
    /// 无法识别或不在目标域名下的行会被跳过；解析器池耗尽时返回错误。
    pub async fn run<R>(&self, mut input: R, results: mpsc::Sender<ClassificationResult>) -> Result<RunSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let stats = Arc::new(RunStats::new());
        let (tx, mut rx) = mpsc::channel::<ClassificationResult>(self.config.threads.max(1) * 4);

        let forward_stats = Arc::clone(&stats);
        let forwarder = tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                forward_stats.record(&result);
                if results.send(result).await.is_err() {
                    debug!("结果接收方已关闭");
                }
            }
        });

        let pipeline = DispatchPipeline::spawn(
            self.config.threads,
            Arc::clone(&self.classifier),
            tx,
            self.config.job_timeout,
        );

        let mut grouper = match &self.config.target_domain {
            Some(domain) => DomainGrouper::new().restrict_to(domain),
            None => DomainGrouper::new(),
        };

        let mut buf = Vec::new();
        let mut line_no = 0usize;
        let mut read_error = None;
        loop {
            buf.clear();
            match input.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    read_error = Some(Error::Io(e));
                    break;
                }
            }
            line_no += 1;
            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                buf.pop();
            }

            // 非 UTF-8 的行无法可靠提取主机名，跳过
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!("第 {} 行不是有效的 UTF-8，已跳过: {}", line_no, e);
                    stats.skip();
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let job = match grouper.group(line) {
                Ok(job) => job,
                Err(e @ Error::OutOfScope { .. }) => {
                    debug!("{}", e);
                    stats.skip();
                    continue;
                }
                Err(e) => {
                    warn!("{}", e);
                    stats.skip();
                    continue;
                }
            };

            if pipeline.submit(job).await.is_err() {
                break;
            }
        }

        let finished = pipeline.finish().await;
        if let Err(e) = forwarder.await {
            warn!("结果转发任务异常退出: {}", e);
        }
        finished?;
        if let Some(e) = read_error {
            return Err(e);
        }

        Ok(stats.summary(self.classifier.wildcard_domains()))
    }
}

/// 便捷的过滤函数，返回全部分类结果
pub async fn filter_wildcards(
    names: Vec<String>,
    resolvers: Vec<String>,
) -> Result<Vec<ClassificationResult>> {
    let filter = WildcardFilter::new(FilterConfig::default(), resolvers).await?;
    collect_results(&filter, names).await
}

/// 运行引擎并收集所有结果
pub async fn collect_results(
    filter: &WildcardFilter,
    names: Vec<String>,
) -> Result<Vec<ClassificationResult>> {
    let input = names.join("\n");
    let (tx, mut rx) = mpsc::channel(64);
    let collector = tokio::spawn(async move {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    });

    filter.run(input.as_bytes(), tx).await?;
    collector
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
}

//! # rwildcard
//!
//! 一个基于Rust实现的子域名泛解析过滤工具库。
//!
//! ## 特性
//!
//! - 🎯 **泛解析识别**: 为每个主域名构建一次泛解析签名，逐个比对候选名称
//! - 🛡️ **解析器校验**: 剔除劫持 NXDOMAIN 或返回错误应答的解析器
//! - ⚖️ **两级解析器池**: 候选解析器承担主要流量，知名公共解析器兜底
//! - 🚦 **速率控制**: 全局与单个解析器两级限速
//! - 📊 **多格式输出**: 支持JSON、CSV、TXT三种导出格式
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use rwildcard::filter_wildcards;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let names = vec![
//!         "www.example.com".to_string(),
//!         "random-name.example.com".to_string(),
//!     ];
//!     let resolvers = vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()];
//!     let results = filter_wildcards(names, resolvers).await?;
//!
//!     for result in results.iter().filter(|r| !r.is_wildcard) {
//!         println!("{}", result.name);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## 高级配置
//!
//! ```rust,no_run
//! use rwildcard::{ClassificationResult, FilterConfig, WildcardFilter};
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = FilterConfig {
//!         threads: 50,
//!         target_domain: Some("example.com".to_string()),
//!         ..Default::default()
//!     };
//!     config.pool.rate_limit = Some(500);
//!     config.pool.query_timeout = Duration::from_secs(2);
//!
//!     let filter = WildcardFilter::new(config, vec!["9.9.9.9".to_string()]).await?;
//!     let (tx, mut rx) = mpsc::channel::<ClassificationResult>(64);
//!     let printer = tokio::spawn(async move {
//!         while let Some(result) = rx.recv().await {
//!             println!("{} {}", result.name, result.is_wildcard);
//!         }
//!     });
//!
//!     let input = tokio::io::BufReader::new(tokio::io::stdin());
//!     let summary = filter.run(input, tx).await?;
//!     printer.await?;
//!     println!("泛解析名称: {}", summary.wildcard);
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod api;
pub mod dispatch;
pub mod error;
pub mod grouper;
pub mod input;
pub mod logger;
pub mod model;
pub mod output;
pub mod pool;
#[cfg(feature = "public-dns")]
#[cfg_attr(docsrs, doc(cfg(feature = "public-dns")))]
pub mod public_dns;
pub mod ratelimit;
pub mod resolver;
pub mod stats;
pub mod transport;
pub mod util;
pub mod validate;
pub mod wildcard;

// 重新导出主要的公共API
pub use api::{
    collect_results, filter_wildcards, load_resolvers, FilterConfig, ResolverSetup,
    ResolverSources, WildcardFilter,
};

// 导出其他有用的类型
pub use error::{Error, QueryError, Result};
pub use grouper::{BaseDomainLookup, DomainGrouper, PublicSuffixLookup};
pub use model::{ClassificationJob, ClassificationResult};
pub use output::{export_results, format_line, OutputFormat, OutputMode};
pub use pool::{PoolConfig, ResolverPool, DEFAULT_RESOLVERS};
pub use stats::{RunStats, RunSummary};
pub use transport::{DnsAnswer, DnsTransport, RecordKind, TrustDnsTransport};
pub use wildcard::{ClassifierConfig, WildcardClassifier, WildcardSignature};

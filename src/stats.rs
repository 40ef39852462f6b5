//! 运行统计
//!
//! 计数器都是原子的，工作者和输出任务可以在不加锁的情况下并发更新；
//! 结束时通过 [`RunStats::summary`] 取一份快照用于日志和导出。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::model::ClassificationResult;

/// 一次运行的统计信息
#[derive(Debug, Default)]
pub struct RunStats {
    processed: AtomicUsize,
    wildcard: AtomicUsize,
    non_wildcard: AtomicUsize,
    skipped: AtomicUsize,
    domains: Mutex<BTreeSet<String>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条分类结果
    pub fn record(&self, result: &ClassificationResult) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if result.is_wildcard {
            self.wildcard.fetch_add(1, Ordering::Relaxed);
        } else {
            self.non_wildcard.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut domains) = self.domains.lock() {
            if !domains.contains(&result.domain) {
                domains.insert(result.domain.clone());
            }
        }
    }

    /// 记录一条被跳过的输入
    pub fn skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn wildcard(&self) -> usize {
        self.wildcard.load(Ordering::Relaxed)
    }

    pub fn non_wildcard(&self) -> usize {
        self.non_wildcard.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    /// 生成统计快照
    pub fn summary(&self, wildcard_domains: Vec<String>) -> RunSummary {
        let domains = match self.domains.lock() {
            Ok(domains) => domains.len(),
            Err(e) => e.into_inner().len(),
        };
        RunSummary {
            processed: self.processed(),
            wildcard: self.wildcard(),
            non_wildcard: self.non_wildcard(),
            skipped: self.skipped(),
            domains,
            wildcard_domains,
        }
    }
}

/// 统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub wildcard: usize,
    pub non_wildcard: usize,
    pub skipped: usize,
    /// 出现过的主域名数量
    pub domains: usize,
    /// 存在泛解析的主域名
    pub wildcard_domains: Vec<String>,
}

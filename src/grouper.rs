use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::error::{Error, Result};
use crate::model::ClassificationJob;

lazy_static! {
    static ref SUBDOMAIN_RE: Regex = Regex::new(
        r"(?:[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9_])?\.)+[a-z][a-z0-9-]{0,61}[a-z0-9]"
    )
    .expect("valid subdomain regex");
}

/// 由名称计算可注册主域名
pub trait BaseDomainLookup: Send + Sync {
    fn base_domain(&self, name: &str) -> Option<String>;
}

/// 基于公共后缀列表的主域名计算
#[derive(Debug, Default, Clone, Copy)]
pub struct PublicSuffixLookup;

impl BaseDomainLookup for PublicSuffixLookup {
    fn base_domain(&self, name: &str) -> Option<String> {
        psl::domain_str(name).map(str::to_string)
    }
}

/// `name` 是否等于 `domain` 或是其子域名（按标签边界匹配）
pub fn is_subdomain_of(name: &str, domain: &str) -> bool {
    name == domain
        || (name.len() > domain.len()
            && name.ends_with(domain)
            && name.as_bytes()[name.len() - domain.len() - 1] == b'.')
}

/// 规范化一行输入
///
/// URL 取其主机名，转小写，去掉开头的 `*.` 标签和首尾的点，
/// 再从中提取第一个合法的域名。
pub fn normalize_name(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }

    let host = if line.contains("://") {
        let url = reqwest::Url::parse(line).ok()?;
        url.host_str()?.to_string()
    } else {
        line.to_string()
    };

    let mut name = host.to_ascii_lowercase();
    while let Some(rest) = name.strip_prefix("*.") {
        name = rest.to_string();
    }
    let name = name.trim_matches('.');

    SUBDOMAIN_RE.find(name).map(|m| m.as_str().to_string())
}

/// 按主域名分组输入名称
///
/// 已知主域名按出现顺序保存，先做后缀匹配，匹配不到再查询公共后缀列表。
pub struct DomainGrouper {
    known: Vec<String>,
    lookup: Box<dyn BaseDomainLookup>,
    target: Option<String>,
}

impl DomainGrouper {
    pub fn new() -> Self {
        Self::with_lookup(Box::new(PublicSuffixLookup))
    }

    pub fn with_lookup(lookup: Box<dyn BaseDomainLookup>) -> Self {
        DomainGrouper {
            known: Vec::new(),
            lookup,
            target: None,
        }
    }

    /// 只接受目标域名下的名称
    pub fn restrict_to(mut self, domain: &str) -> Self {
        let domain = domain.trim().trim_matches('.').to_ascii_lowercase();
        self.known = vec![domain.clone()];
        self.target = Some(domain);
        self
    }

    /// 已知主域名
    pub fn known_domains(&self) -> &[String] {
        &self.known
    }

    /// 计算一行输入对应的分类任务
    pub fn group(&mut self, raw: &str) -> Result<ClassificationJob> {
        let name = normalize_name(raw).ok_or_else(|| Error::InvalidName(raw.trim().to_string()))?;

        if let Some(target) = &self.target {
            if !is_subdomain_of(&name, target) {
                return Err(Error::OutOfScope {
                    name,
                    domain: target.clone(),
                });
            }
            return Ok(ClassificationJob {
                name,
                domain: target.clone(),
            });
        }

        if let Some(domain) = self.known.iter().find(|d| is_subdomain_of(&name, d)) {
            return Ok(ClassificationJob {
                domain: domain.clone(),
                name,
            });
        }

        let domain = self
            .lookup
            .base_domain(&name)
            .ok_or_else(|| Error::NoBaseDomain(name.clone()))?;
        debug!("新的主域名: {}", domain);
        self.known.push(domain.clone());
        Ok(ClassificationJob { name, domain })
    }
}

impl Default for DomainGrouper {
    fn default() -> Self {
        Self::new()
    }
}

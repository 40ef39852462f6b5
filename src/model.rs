use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// 待分类的名称及其主域名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationJob {
    pub name: String,   // 子域名
    pub domain: String, // 主域名
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub name: String,
    pub domain: String,
    pub is_wildcard: bool,
    pub ips: Vec<IpAddr>, // 名称自身的解析结果
}

impl ClassificationResult {
    pub fn new(name: &str, domain: &str, is_wildcard: bool, ips: Vec<IpAddr>) -> Self {
        ClassificationResult {
            name: name.to_string(),
            domain: domain.to_string(),
            is_wildcard,
            ips,
        }
    }
}

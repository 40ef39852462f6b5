use thiserror::Error;

/// 单次DNS查询的失败原因
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// 查询超时
    #[error("query timed out")]
    Timeout,
    /// 应答无法解析
    #[error("malformed answer: {0}")]
    Malformed(String),
    /// 服务器返回 SERVFAIL / REFUSED 等错误响应码
    #[error("server failure: {0}")]
    ServerFailure(String),
    /// 底层传输错误
    #[error("transport error: {0}")]
    Transport(String),
    /// 两级解析器池中已没有存活的解析器
    #[error("no healthy resolver left in the pool")]
    PoolExhausted,
}

/// 库级错误
#[derive(Debug, Error)]
pub enum Error {
    /// 校验后候选池与基线池均为空
    #[error("resolver pool is empty after validation")]
    EmptyPool,

    /// 运行期间所有解析器都被剔除
    #[error("all resolvers were evicted during the run")]
    PoolExhausted,

    /// 无法识别的输入行
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// 无法获取主域名
    #[error("failed to get main domain from {0}")]
    NoBaseDomain(String),

    /// 不属于目标域名
    #[error("{name} is not under target domain {domain}")]
    OutOfScope { name: String, domain: String },

    /// 分发管道已停止
    #[error("dispatch pipeline is closed")]
    PipelineClosed,

    #[error("dns query failed: {0}")]
    Query(#[from] QueryError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http status {0}")]
    HttpStatus(u16),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// 是否为致命错误（需要终止整个运行）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::EmptyPool | Error::PoolExhausted | Error::Query(QueryError::PoolExhausted)
        )
    }
}

/// 库级 Result
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::EmptyPool.is_fatal());
        assert!(Error::PoolExhausted.is_fatal());
        assert!(Error::from(QueryError::PoolExhausted).is_fatal());
        assert!(!Error::from(QueryError::Timeout).is_fatal());
        assert!(!Error::InvalidName("???".to_string()).is_fatal());
    }
}

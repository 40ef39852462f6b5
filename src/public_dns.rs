//! 从 public-dns.info 获取公共解析器列表
//!
//! 先通过 ipapi.co 查询本机所在国家，再下载该国家的解析器列表。
//! 任何网络错误都不是致命的，调用方拿到错误后可以退回内置列表。

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::resolver::parse_resolver_list;

/// 地理位置查询地址
pub const GEO_URL: &str = "https://ipapi.co/json";

/// 公共解析器列表地址前缀，后接 `<国家代码>.txt`
pub const LIST_URL_BASE: &str = "https://public-dns.info/nameserver/";

/// 无法确定国家时使用的国家代码
pub const DEFAULT_COUNTRY: &str = "us";

#[derive(Debug, Deserialize)]
struct GeoInfo {
    #[serde(default)]
    country: Option<String>,
}

/// 公共解析器列表来源
pub struct PublicDnsSource {
    client: Client,
    geo_url: String,
    list_url_base: String,
    default_country: String,
}

impl PublicDnsSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_urls(timeout, GEO_URL, LIST_URL_BASE)
    }

    /// 使用自定义地址，主要用于测试
    pub fn with_urls(timeout: Duration, geo_url: &str, list_url_base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(PublicDnsSource {
            client,
            geo_url: geo_url.to_string(),
            list_url_base: list_url_base.to_string(),
            default_country: DEFAULT_COUNTRY.to_string(),
        })
    }

    /// 本机所在国家的两位小写代码，失败时返回默认值
    pub async fn country_code(&self) -> String {
        match self.lookup_country().await {
            Ok(Some(cc)) if !cc.is_empty() => cc.to_ascii_lowercase(),
            Ok(_) => self.default_country.clone(),
            Err(e) => {
                debug!("获取国家代码失败: {}", e);
                self.default_country.clone()
            }
        }
    }

    async fn lookup_country(&self) -> Result<Option<String>> {
        let response = self.client.get(&self.geo_url).send().await?;
        if !response.status().is_success() {
            return Err(Error::HttpStatus(response.status().as_u16()));
        }
        let info: GeoInfo = response.json().await?;
        Ok(info.country)
    }

    /// 下载公共解析器列表
    pub async fn fetch(&self) -> Result<Vec<String>> {
        let cc = self.country_code().await;
        let url = format!("{}{}.txt", self.list_url_base, cc);
        info!("获取公共解析器列表: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("获取公共解析器列表失败: HTTP {}", status.as_u16());
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(parse_resolver_list(&body))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// 启动一个对每个请求按路径返回固定应答的 HTTP 服务，返回 `http://addr`
    pub async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                    let (status, body) = routes
                        .iter()
                        .find(|(route, _, _)| *route == path)
                        .map(|(_, status, body)| (*status, *body))
                        .unwrap_or((404, ""));
                    let response = format!(
                        "HTTP/1.1 {} X\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::serve;
    use super::*;

    #[tokio::test]
    async fn test_fetch_uses_country_list() {
        let base = serve(vec![
            ("/json", 200, r#"{"ip":"203.0.113.9","country":"DE"}"#),
            ("/nameserver/de.txt", 200, "9.9.9.9\n149.112.112.112\n\nbogus\n"),
        ])
        .await;
        let source = PublicDnsSource::with_urls(
            Duration::from_secs(5),
            &format!("{}/json", base),
            &format!("{}/nameserver/", base),
        )
        .unwrap();

        assert_eq!(source.country_code().await, "de");
        let list = source.fetch().await.unwrap();
        assert_eq!(list, vec!["9.9.9.9:53", "149.112.112.112:53"]);
    }

    #[tokio::test]
    async fn test_country_falls_back_to_default() {
        let base = serve(vec![
            ("/json", 500, ""),
            ("/nameserver/us.txt", 200, "8.8.8.8\n"),
        ])
        .await;
        let source = PublicDnsSource::with_urls(
            Duration::from_secs(5),
            &format!("{}/json", base),
            &format!("{}/nameserver/", base),
        )
        .unwrap();

        assert_eq!(source.country_code().await, "us");
        assert_eq!(source.fetch().await.unwrap(), vec!["8.8.8.8:53"]);
    }

    #[tokio::test]
    async fn test_unavailable_list_reports_status() {
        let base = serve(vec![
            ("/json", 200, r#"{"country":"us"}"#),
            ("/nameserver/us.txt", 503, "busy"),
        ])
        .await;
        let source = PublicDnsSource::with_urls(
            Duration::from_secs(5),
            &format!("{}/json", base),
            &format!("{}/nameserver/", base),
        )
        .unwrap();

        assert!(matches!(source.fetch().await, Err(Error::HttpStatus(503))));
    }
}

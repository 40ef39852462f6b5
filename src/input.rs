use clap::Parser;
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, BufReader};

use crate::error::Result;
use crate::output::{OutputFormat, OutputMode};
use crate::resolver::parse_resolver_list;

#[derive(Parser, Debug)]
#[command(name = "rwildcard")]
#[command(author = "o0x1024")]
#[command(version = "1.0")]
#[command(about = "Filter wildcard DNS artifacts out of subdomain lists", long_about = None)]
pub struct Opts {
    /// candidate names, one per line ("-" for stdin)
    #[arg(short, long, default_value = "-")]
    pub input: String,

    /// number of workers
    #[arg(short, long, default_value_t = 10)]
    pub threads: usize,

    /// fetch resolvers from public-dns.info
    #[arg(short, long)]
    pub public_dns: bool,

    /// resolvers list file, one host or host:port per line
    #[arg(short, long)]
    pub resolvers: Option<PathBuf>,

    /// only keep names under this domain
    #[arg(short, long)]
    pub domain: Option<String>,

    /// maximum queries per second
    #[arg(long)]
    pub rate: Option<u64>,

    /// per query timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub timeout: u64,

    /// output mode
    #[arg(short, long, value_enum, default_value_t = OutputMode::Tagged)]
    pub mode: OutputMode,

    /// do not use the built-in trusted resolvers
    #[arg(long)]
    pub no_baseline: bool,

    /// export results to a file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// export format (json, csv, txt)
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// only print errors
    #[arg(short, long)]
    pub silent: bool,

    /// print debug logs
    #[arg(short, long)]
    pub verbose: bool,

    /// colorize output tags
    #[arg(long)]
    pub color: bool,
}

impl Opts {
    /// 日志级别
    pub fn log_level(&self) -> LevelFilter {
        if self.silent {
            LevelFilter::Error
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    /// 单次查询超时
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.max(1))
    }
}

/// 打开输入源，`-` 表示标准输入
pub async fn open_input(path: &str) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(path).await?;
    Ok(Box::new(BufReader::new(file)))
}

/// 读取解析器列表文件
pub async fn read_resolver_file(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_resolver_list(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn test_default_opts() {
        let opts = Opts::parse_from(["rwildcard"]);
        assert_eq!(opts.input, "-");
        assert_eq!(opts.threads, 10);
        assert_eq!(opts.timeout, 3000);
        assert_eq!(opts.mode, OutputMode::Tagged);
        assert_eq!(opts.format, OutputFormat::Json);
        assert!(opts.domain.is_none());
        assert_eq!(opts.log_level(), LevelFilter::Info);
    }

    #[test]
    fn test_opts_flags() {
        let opts = Opts::parse_from([
            "rwildcard", "-i", "names.txt", "-t", "50", "-p", "-r", "resolvers.txt", "-d",
            "example.com", "--rate", "200", "--timeout", "1500", "-m", "non-wildcard",
            "--no-baseline", "-o", "out.csv", "--format", "csv", "-s",
        ]);
        assert_eq!(opts.input, "names.txt");
        assert_eq!(opts.threads, 50);
        assert!(opts.public_dns);
        assert_eq!(opts.resolvers, Some(PathBuf::from("resolvers.txt")));
        assert_eq!(opts.domain.as_deref(), Some("example.com"));
        assert_eq!(opts.rate, Some(200));
        assert_eq!(opts.query_timeout(), Duration::from_millis(1500));
        assert_eq!(opts.mode, OutputMode::NonWildcard);
        assert!(opts.no_baseline);
        assert_eq!(opts.format, OutputFormat::Csv);
        assert_eq!(opts.log_level(), LevelFilter::Error);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(Opts::try_parse_from(["rwildcard", "-m", "everything"]).is_err());
    }

    #[tokio::test]
    async fn test_read_resolver_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1.1.1.1\n\n8.8.8.8:5353\ngarbage").unwrap();
        let resolvers = read_resolver_file(file.path()).await.unwrap();
        assert_eq!(resolvers, vec!["1.1.1.1:53", "8.8.8.8:5353"]);
    }

    #[tokio::test]
    async fn test_open_input_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a.example.com\nb.example.com").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let mut lines = open_input(&path).await.unwrap().lines();
        let mut names = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            names.push(line);
        }
        assert_eq!(names, vec!["a.example.com", "b.example.com"]);
    }

    #[tokio::test]
    async fn test_open_missing_input_fails() {
        assert!(open_input("/nonexistent/names.txt").await.is_err());
    }
}

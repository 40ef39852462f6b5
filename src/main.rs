use std::process;

use clap::Parser;
use log::{error, info, warn};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

use rwildcard::input::{open_input, Opts};
use rwildcard::logger::init_logger;
use rwildcard::output::{export_results, format_line};
use rwildcard::{load_resolvers, Error, FilterConfig, ResolverSources, WildcardFilter};

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    init_logger(opts.log_level());

    if let Err(e) = run(opts).await {
        error!("{}", e);
        process::exit(1);
    }
}

/// 由命令行参数构造过滤配置
fn build_config(opts: &Opts) -> FilterConfig {
    let mut config = FilterConfig {
        threads: opts.threads.max(1),
        output_mode: opts.mode,
        target_domain: opts.domain.clone(),
        ..Default::default()
    };
    config.pool.rate_limit = opts.rate;
    config.pool.query_timeout = opts.query_timeout();
    if opts.no_baseline {
        config.pool.baseline.clear();
    }
    config
}

async fn run(opts: Opts) -> Result<(), Error> {
    let input = open_input(&opts.input).await?;

    let sources = ResolverSources {
        public_dns: opts.public_dns,
        resolver_file: opts.resolvers.clone(),
        ..Default::default()
    };
    let setup = load_resolvers(&sources).await?;
    if setup.fetch_error.is_some() {
        warn!("公共解析器列表不可用");
    }
    if setup.used_defaults {
        info!("未提供解析器，使用内置解析器列表");
    }

    let config = build_config(&opts);
    let filter = WildcardFilter::new(config, setup.resolvers).await?;
    info!(
        "可用解析器: 候选 {} 个, 基线 {} 个",
        filter.pool().candidate_count(),
        filter.pool().baseline_count()
    );

    let collect = opts.output.is_some();
    let mode = filter.config().output_mode;
    let color = opts.color;
    let (tx, mut rx) = mpsc::channel(filter.config().threads * 4);
    let printer = tokio::spawn(async move {
        let mut stdout = BufWriter::new(tokio::io::stdout());
        let mut collected = Vec::new();
        while let Some(result) = rx.recv().await {
            if let Some(line) = format_line(&result, mode, color) {
                if stdout.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
            if collect {
                collected.push(result);
            }
        }
        let _ = stdout.flush().await;
        collected
    });

    let summary = filter.run(input, tx).await;
    let collected = printer.await.unwrap_or_default();
    let summary = summary?;

    if let Some(path) = &opts.output {
        export_results(&collected, summary.clone(), path, opts.format)?;
        info!("结果已导出到: {}", path.display());
    }

    info!(
        "完成: 共 {} 个名称, 泛解析 {} 个, 非泛解析 {} 个, 跳过 {} 个, 主域名 {} 个",
        summary.processed, summary.wildcard, summary.non_wildcard, summary.skipped, summary.domains
    );
    if !summary.wildcard_domains.is_empty() {
        info!("泛解析主域名: {}", summary.wildcard_domains.join(", "));
    }
    Ok(())
}

use rwildcard::{collect_results, filter_wildcards, FilterConfig, WildcardFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("rwildcard 库使用快速入门");

    let names = vec![
        "www.example.com".to_string(),
        "mail.example.com".to_string(),
        "qz7x-not-there.example.com".to_string(),
    ];

    // 方法1: 使用便捷函数（最简单）
    println!("\n=== 方法1: 便捷函数 ===");
    let resolvers = vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()];
    match filter_wildcards(names.clone(), resolvers).await {
        Ok(results) => {
            for result in &results {
                let tag = if result.is_wildcard { "wildcard" } else { "ok" };
                println!("  [{}] {}", tag, result.name);
            }
        }
        Err(e) => println!("过滤失败: {}", e),
    }

    // 方法2: 使用配置引擎（推荐）
    println!("\n=== 方法2: 配置引擎 ===");
    let mut config = FilterConfig {
        threads: 20,
        target_domain: Some("example.com".to_string()),
        ..Default::default()
    };
    config.pool.rate_limit = Some(100);

    match WildcardFilter::new(config, vec!["9.9.9.9".to_string()]).await {
        Ok(filter) => {
            println!(
                "可用解析器: 候选 {} 个, 基线 {} 个",
                filter.pool().candidate_count(),
                filter.pool().baseline_count()
            );
            match collect_results(&filter, names).await {
                Ok(results) => {
                    let kept: Vec<_> = results.iter().filter(|r| !r.is_wildcard).collect();
                    println!("保留 {} 个非泛解析名称", kept.len());
                    for result in kept {
                        println!("  {} -> {:?}", result.name, result.ips);
                    }
                }
                Err(e) => println!("过滤失败: {}", e),
            }
        }
        Err(e) => println!("引擎创建失败: {}", e),
    }

    Ok(())
}

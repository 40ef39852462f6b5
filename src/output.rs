use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::model::ClassificationResult;
use crate::stats::RunSummary;

/// 标准输出的结果格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    /// 每个名称都输出，并带上 `[wildcard]` / `[non-wildcard]` 标签
    #[default]
    Tagged,
    /// 只输出非泛解析的名称
    NonWildcard,
}

/// 格式化一条结果，返回 None 表示该结果不输出
pub fn format_line(result: &ClassificationResult, mode: OutputMode, color: bool) -> Option<String> {
    match mode {
        OutputMode::NonWildcard => {
            if result.is_wildcard {
                None
            } else {
                Some(result.name.clone())
            }
        }
        OutputMode::Tagged => {
            let tag = if result.is_wildcard {
                if color {
                    "[wildcard]".red().to_string()
                } else {
                    "[wildcard]".to_string()
                }
            } else if color {
                "[non-wildcard]".green().to_string()
            } else {
                "[non-wildcard]".to_string()
            };
            Some(format!("{} - {}", tag, result.name))
        }
    }
}

/// 导出文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
    Txt,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "txt" => Ok(OutputFormat::Txt),
            _ => Err(format!("不支持的输出格式: {}。支持的格式: json, csv, txt", s)),
        }
    }
}

/// 可序列化的分类结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    pub name: String,
    pub domain: String,
    pub wildcard: bool,
    pub ips: Vec<String>,
}

/// 完整的导出数据结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub results: Vec<ExportRecord>,
    pub summary: RunSummary,
    pub export_time: String,
}

impl From<&ClassificationResult> for ExportRecord {
    fn from(result: &ClassificationResult) -> Self {
        ExportRecord {
            name: result.name.clone(),
            domain: result.domain.clone(),
            wildcard: result.is_wildcard,
            ips: result.ips.iter().map(|ip| ip.to_string()).collect(),
        }
    }
}

/// 导出结果到文件
pub fn export_results(
    results: &[ClassificationResult],
    summary: RunSummary,
    output_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let data = ExportData {
        results: results.iter().map(ExportRecord::from).collect(),
        summary,
        export_time: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    };

    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&data)?,
        OutputFormat::Csv => export_to_csv(&data),
        OutputFormat::Txt => export_to_txt(&data),
    };

    let mut file = File::create(output_path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn export_to_csv(data: &ExportData) -> String {
    let mut csv = String::new();
    csv.push_str("Name,Domain,Wildcard,IPs\n");
    for record in &data.results {
        csv.push_str(&format!(
            "{},{},{},{}\n",
            escape_csv(&record.name),
            escape_csv(&record.domain),
            record.wildcard,
            escape_csv(&record.ips.join(" "))
        ));
    }
    csv
}

fn export_to_txt(data: &ExportData) -> String {
    let mut txt = String::new();

    txt.push_str("rwildcard 过滤结果报告\n");
    txt.push_str(&format!("导出时间: {}\n", data.export_time));
    txt.push_str(&format!("{}\n\n", "=".repeat(60)));

    txt.push_str("汇总统计:\n");
    txt.push_str(&format!("  处理名称总数: {}\n", data.summary.processed));
    txt.push_str(&format!("  泛解析名称: {}\n", data.summary.wildcard));
    txt.push_str(&format!("  非泛解析名称: {}\n", data.summary.non_wildcard));
    txt.push_str(&format!("  跳过的输入: {}\n", data.summary.skipped));
    txt.push_str(&format!("  主域名数量: {}\n", data.summary.domains));
    if !data.summary.wildcard_domains.is_empty() {
        txt.push_str(&format!(
            "  泛解析主域名: {}\n",
            data.summary.wildcard_domains.join(", ")
        ));
    }
    txt.push('\n');

    txt.push_str(&format!("{:<40} {:<20} {:<8} {}\n", "名称", "主域名", "泛解析", "IP地址"));
    txt.push_str(&format!("{}\n", "-".repeat(90)));
    for record in &data.results {
        txt.push_str(&format!(
            "{:<40} {:<20} {:<8} {}\n",
            record.name,
            record.domain,
            if record.wildcard { "YES" } else { "NO" },
            record.ips.join(", ")
        ));
    }
    txt
}

/// CSV转义
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> Vec<ClassificationResult> {
        vec![
            ClassificationResult::new("foo.wild.test", "wild.test", true, vec!["1.2.3.4".parse().unwrap()]),
            ClassificationResult::new(
                "realhost.wild.test",
                "wild.test",
                false,
                vec!["5.6.7.8".parse().unwrap()],
            ),
        ]
    }

    #[test]
    fn test_tagged_lines() {
        let results = results();
        assert_eq!(
            format_line(&results[0], OutputMode::Tagged, false).as_deref(),
            Some("[wildcard] - foo.wild.test")
        );
        assert_eq!(
            format_line(&results[1], OutputMode::Tagged, false).as_deref(),
            Some("[non-wildcard] - realhost.wild.test")
        );
    }

    #[test]
    fn test_non_wildcard_lines() {
        let results = results();
        assert_eq!(format_line(&results[0], OutputMode::NonWildcard, false), None);
        assert_eq!(
            format_line(&results[1], OutputMode::NonWildcard, false).as_deref(),
            Some("realhost.wild.test")
        );
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_export_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let summary = RunSummary {
            processed: 2,
            wildcard: 1,
            non_wildcard: 1,
            domains: 1,
            wildcard_domains: vec!["wild.test".to_string()],
            ..Default::default()
        };

        let json_path = dir.path().join("out.json");
        export_results(&results(), summary.clone(), &json_path, OutputFormat::Json).unwrap();
        let data: ExportData =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(data.results.len(), 2);
        assert_eq!(data.summary, summary);
        assert_eq!(data.results[0].ips, vec!["1.2.3.4"]);

        let csv_path = dir.path().join("out.csv");
        export_results(&results(), summary, &csv_path, OutputFormat::Csv).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("Name,Domain,Wildcard,IPs\n"));
        assert!(csv.contains("foo.wild.test,wild.test,true,1.2.3.4"));
    }
}

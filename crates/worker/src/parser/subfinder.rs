//! subfinder 输出解析

use serde::Deserialize;

use reconflow_domain::entities::Domain;
use reconflow_errors::ReconResult;

use super::{OutputParser, ParseResult};

/// subfinder -json 输出的单行结构
#[derive(Debug, Deserialize)]
struct SubfinderOutputLine {
    #[serde(default)]
    host: String,
    #[serde(default)]
    source: String,
}

/// 解析 subfinder 的 JSON 输出
///
/// 同时接受逐行 JSON 与 JSON 数组两种形式；格式错误的行/元素
/// 跳过，空 host 跳过。
pub struct SubfinderParser;

impl OutputParser for SubfinderParser {
    fn parse(&self, output: &[u8]) -> ReconResult<ParseResult> {
        let text = String::from_utf8_lossy(output);
        let trimmed = text.trim();

        let mut domains = Vec::new();
        if trimmed.starts_with('[') {
            // 规范化后的数组形式
            let values: Vec<serde_json::Value> = serde_json::from_str(trimmed)
                .map_err(|e| reconflow_errors::ReconError::ParseError(format!(
                    "subfinder 输出不是合法的JSON数组: {e}"
                )))?;
            for value in values {
                if let Ok(line) = serde_json::from_value::<SubfinderOutputLine>(value) {
                    push_domain(&mut domains, line);
                }
            }
        } else {
            // 逐行JSON形式
            for line in trimmed.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Ok(parsed) = serde_json::from_str::<SubfinderOutputLine>(line) {
                    push_domain(&mut domains, parsed);
                }
            }
        }

        Ok(ParseResult {
            domains,
            assets: Vec::new(),
        })
    }
}

fn push_domain(domains: &mut Vec<Domain>, line: SubfinderOutputLine) {
    if line.host.is_empty() {
        return;
    }
    domains.push(Domain {
        id: 0,
        project_id: 0,
        fqdn: line.host,
        root_domain: String::new(),
        source: line.source,
        last_seen_at: chrono::Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_newline_delimited() {
        let stdout = concat!(
            r#"{"host":"a.example.com","source":"crtsh"}"#,
            "\n",
            r#"{"host":"b.example.com","source":"dns"}"#,
            "\n",
        );
        let result = SubfinderParser.parse(stdout.as_bytes()).unwrap();
        assert_eq!(result.domains.len(), 2);
        assert_eq!(result.domains[0].fqdn, "a.example.com");
        assert_eq!(result.domains[0].source, "crtsh");
        assert_eq!(result.domains[1].fqdn, "b.example.com");
        assert!(result.assets.is_empty());
    }

    #[test]
    fn test_parse_array_form() {
        let stdout = r#"[{"host":"a.example.com","source":"crtsh"},{"host":"b.example.com","source":"dns"}]"#;
        let result = SubfinderParser.parse(stdout.as_bytes()).unwrap();
        assert_eq!(result.domains.len(), 2);
    }

    #[test]
    fn test_garbage_lines_skipped() {
        let stdout = concat!(
            "WARN: rate limited\n",
            r#"{"host":"ok.example.com","source":"dns"}"#,
            "\n",
            "}{ broken\n",
        );
        let result = SubfinderParser.parse(stdout.as_bytes()).unwrap();
        assert_eq!(result.domains.len(), 1);
        assert_eq!(result.domains[0].fqdn, "ok.example.com");
    }

    #[test]
    fn test_empty_host_skipped() {
        let stdout = r#"{"host":"","source":"dns"}"#;
        let result = SubfinderParser.parse(stdout.as_bytes()).unwrap();
        assert!(result.domains.is_empty());
    }

    #[test]
    fn test_empty_output() {
        let result = SubfinderParser.parse(b"").unwrap();
        assert!(result.domains.is_empty());
    }

    #[test]
    fn test_unreadable_array_is_error() {
        assert!(SubfinderParser.parse(b"[{broken").is_err());
    }
}

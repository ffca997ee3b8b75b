//! httpx 输出解析

use serde::Deserialize;
use url::Url;

use reconflow_domain::entities::Asset;
use reconflow_errors::ReconResult;

use super::{OutputParser, ParseResult};

/// httpx -json 输出的单行结构
#[derive(Debug, Deserialize)]
struct HttpxOutputLine {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    webserver: String,
    #[serde(default)]
    tech: Vec<String>,
    /// IPv4 地址列表
    #[serde(default)]
    a: Vec<String>,
    /// IPv6 地址列表
    #[serde(default)]
    aaaa: Vec<String>,
    #[serde(default)]
    port: PortField,
}

/// httpx 的 port 字段历史上既有字符串也有数字形式
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum PortField {
    #[default]
    Missing,
    Number(i32),
    Text(String),
}

impl PortField {
    fn as_i32(&self) -> i32 {
        match self {
            PortField::Missing => 0,
            PortField::Number(n) => *n,
            PortField::Text(s) => s.parse().unwrap_or(0),
        }
    }
}

/// 解析 httpx 的逐行 JSON 输出
///
/// 为 a ∪ aaaa 中的每个 IP 生成一条资产记录；URL 无法解析或
/// 行格式错误则跳过该行。
pub struct HttpxParser;

impl OutputParser for HttpxParser {
    fn parse(&self, output: &[u8]) -> ReconResult<ParseResult> {
        let text = String::from_utf8_lossy(output);

        let mut assets = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<HttpxOutputLine>(line) else {
                continue;
            };
            let Ok(parsed_url) = Url::parse(&parsed.url) else {
                continue;
            };
            let protocol = parsed_url.scheme().to_string();
            let port = parsed.port.as_i32();

            for ip in parsed.a.iter().chain(parsed.aaaa.iter()) {
                if ip.is_empty() {
                    continue;
                }
                assets.push(Asset {
                    id: 0,
                    project_id: 0,
                    ip: ip.clone(),
                    port,
                    protocol: protocol.clone(),
                    source: "httpx".to_string(),
                    title: parsed.title.clone(),
                    web_server: parsed.webserver.clone(),
                    technologies: parsed.tech.clone(),
                    last_seen_at: chrono::Utc::now(),
                });
            }
        }

        Ok(ParseResult {
            domains: Vec::new(),
            assets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_emits_one_asset_per_ip() {
        let stdout = concat!(
            r#"{"url":"https://a.example.com:8443","title":"登录页","webserver":"nginx","tech":["Nginx","Vue.js"],"a":["1.2.3.4","5.6.7.8"],"aaaa":["2001:db8::1"],"port":"8443"}"#,
            "\n",
        );
        let result = HttpxParser.parse(stdout.as_bytes()).unwrap();
        assert_eq!(result.assets.len(), 3);

        let first = &result.assets[0];
        assert_eq!(first.ip, "1.2.3.4");
        assert_eq!(first.port, 8443);
        assert_eq!(first.protocol, "https");
        assert_eq!(first.source, "httpx");
        assert_eq!(first.title, "登录页");
        assert_eq!(first.web_server, "nginx");
        assert_eq!(first.technologies, vec!["Nginx", "Vue.js"]);
        assert_eq!(result.assets[2].ip, "2001:db8::1");
    }

    #[test]
    fn test_numeric_port_accepted() {
        let stdout = r#"{"url":"http://x.example.com","a":["9.9.9.9"],"port":80}"#;
        let result = HttpxParser.parse(stdout.as_bytes()).unwrap();
        assert_eq!(result.assets[0].port, 80);
        assert_eq!(result.assets[0].protocol, "http");
    }

    #[test]
    fn test_bad_lines_and_bad_urls_skipped() {
        let stdout = concat!(
            "not json at all\n",
            r#"{"url":"::broken::","a":["1.1.1.1"],"port":"80"}"#,
            "\n",
            r#"{"url":"http://good.example.com","a":["2.2.2.2"],"port":"80"}"#,
            "\n",
        );
        let result = HttpxParser.parse(stdout.as_bytes()).unwrap();
        assert_eq!(result.assets.len(), 1);
        assert_eq!(result.assets[0].ip, "2.2.2.2");
    }

    #[test]
    fn test_empty_ips_skipped() {
        let stdout = r#"{"url":"http://x.example.com","a":[""],"aaaa":[],"port":"80"}"#;
        let result = HttpxParser.parse(stdout.as_bytes()).unwrap();
        assert!(result.assets.is_empty());
    }

    #[test]
    fn test_empty_output() {
        let result = HttpxParser.parse(b"").unwrap();
        assert!(result.assets.is_empty());
    }
}

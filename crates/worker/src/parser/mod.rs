//! 输出解析器注册表
//!
//! 解析器把外部工具的原始 stdout 转换为标准化的域名/资产记录。
//! 注册表按名称查找；重复注册是编程错误，直接 panic。

mod httpx;
mod subfinder;

pub use httpx::HttpxParser;
pub use subfinder::SubfinderParser;

use std::collections::HashMap;
use std::sync::Arc;

use reconflow_domain::entities::{Asset, Domain};
use reconflow_errors::ReconResult;

/// subfinder 输出解析器的注册名
pub const PARSER_SUBFINDER_JSON_LIST: &str = "subfinder_json_list";
/// httpx 输出解析器的注册名
pub const PARSER_HTTPX_JSON_LIST: &str = "httpx_json_list";

/// 标准化的解析结果
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub domains: Vec<Domain>,
    pub assets: Vec<Asset>,
}

/// 输出解析器接口
pub trait OutputParser: Send + Sync {
    /// 解析命令的原始输出
    ///
    /// 单行格式错误应跳过该行；仅当输入整体不可读时返回错误。
    fn parse(&self, output: &[u8]) -> ReconResult<ParseResult>;
}

/// 解析器注册表
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn OutputParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// 创建并注册所有内置解析器
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PARSER_SUBFINDER_JSON_LIST, Arc::new(SubfinderParser));
        registry.register(PARSER_HTTPX_JSON_LIST, Arc::new(HttpxParser));
        registry
    }

    /// 注册解析器
    ///
    /// # Panics
    ///
    /// 名称已被注册时 panic。
    pub fn register(&mut self, name: &str, parser: Arc<dyn OutputParser>) {
        if self.parsers.contains_key(name) {
            panic!("解析器名称 '{name}' 已被注册");
        }
        self.parsers.insert(name.to_string(), parser);
    }

    /// 按名称查找解析器，未注册返回 None
    pub fn get(&self, name: &str) -> Option<Arc<dyn OutputParser>> {
        self.parsers.get(name).cloned()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ParserRegistry::with_builtins();
        assert!(registry.get(PARSER_SUBFINDER_JSON_LIST).is_some());
        assert!(registry.get(PARSER_HTTPX_JSON_LIST).is_some());
        assert!(registry.get("nuclei_json_list").is_none());
    }

    #[test]
    #[should_panic(expected = "已被注册")]
    fn test_duplicate_registration_panics() {
        let mut registry = ParserRegistry::with_builtins();
        registry.register(PARSER_SUBFINDER_JSON_LIST, Arc::new(SubfinderParser));
    }
}

//! 命令模板渲染
//!
//! 模板先按 ASCII 空白拆分为参数，再在每个参数内展开 `{{field}}`
//! 占位符，展开结果即使包含空白也保持为单个参数。

use reconflow_domain::messaging::WorkflowPayload;
use reconflow_errors::{ReconError, ReconResult};

/// 渲染命令模板为 argv
///
/// 支持的占位符：`{{input}}`、`{{project_id}}`、`{{parent_task_id}}`、
/// `{{scan_profile_id}}`、`{{current_step_name}}`、`{{domain_id}}`。
/// 未知占位符视为渲染失败。
pub fn render_command(template: &str, payload: &WorkflowPayload) -> ReconResult<Vec<String>> {
    let tokens: Vec<&str> = template.split_ascii_whitespace().collect();
    if tokens.is_empty() {
        return Err(ReconError::TemplateRender("命令模板为空".to_string()));
    }

    tokens
        .into_iter()
        .map(|token| expand_token(token, payload))
        .collect()
}

fn expand_token(token: &str, payload: &WorkflowPayload) -> ReconResult<String> {
    let mut result = String::with_capacity(token.len());
    let mut rest = token;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            ReconError::TemplateRender(format!("占位符未闭合: {token}"))
        })?;
        let field = after[..end].trim();
        result.push_str(&resolve_field(field, payload)?);
        rest = &after[end + 2..];
    }
    result.push_str(rest);
    Ok(result)
}

fn resolve_field(field: &str, payload: &WorkflowPayload) -> ReconResult<String> {
    match field {
        "input" => Ok(payload.input.clone()),
        "project_id" => Ok(payload.project_id.to_string()),
        "parent_task_id" => Ok(payload.parent_task_id.to_string()),
        "scan_profile_id" => Ok(payload.scan_profile_id.to_string()),
        "current_step_name" => Ok(payload.current_step_name.clone()),
        "domain_id" => Ok(payload.domain_id.unwrap_or(0).to_string()),
        other => Err(ReconError::TemplateRender(format!(
            "未知的占位符字段: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(input: &str) -> WorkflowPayload {
        WorkflowPayload {
            project_id: 9,
            parent_task_id: 4,
            scan_profile_id: 2,
            current_step_name: "sub".to_string(),
            input: input.to_string(),
            domain_id: Some(17),
        }
    }

    #[test]
    fn test_basic_substitution() {
        let argv = render_command("subfinder -d {{input}} -json", &payload("example.com")).unwrap();
        assert_eq!(argv, vec!["subfinder", "-d", "example.com", "-json"]);
    }

    #[test]
    fn test_whitespace_in_expansion_stays_one_argument() {
        let argv = render_command("echo {{input}}", &payload("a b c")).unwrap();
        assert_eq!(argv, vec!["echo", "a b c"]);
    }

    #[test]
    fn test_multiple_placeholders_in_one_token() {
        let argv = render_command(
            "probe --tag={{project_id}}-{{domain_id}} {{input}}",
            &payload("example.com"),
        )
        .unwrap();
        assert_eq!(argv, vec!["probe", "--tag=9-17", "example.com"]);
    }

    #[test]
    fn test_spaces_inside_braces_tolerated() {
        let argv = render_command("echo {{ input }}", &payload("example.com")).unwrap();
        assert_eq!(argv, vec!["echo", "example.com"]);
    }

    #[test]
    fn test_unknown_field_is_error() {
        let err = render_command("echo {{bogus}}", &payload("x")).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_unclosed_placeholder_is_error() {
        assert!(render_command("echo {{input", &payload("x")).is_err());
    }

    #[test]
    fn test_empty_template_is_error() {
        assert!(render_command("   ", &payload("x")).is_err());
    }

    #[test]
    fn test_missing_domain_id_renders_zero() {
        let mut p = payload("x");
        p.domain_id = None;
        let argv = render_command("tool --domain-id {{domain_id}}", &p).unwrap();
        assert_eq!(argv, vec!["tool", "--domain-id", "0"]);
    }
}

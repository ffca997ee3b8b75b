//! 核心领域实体定义
//!
//! 包含项目、扫描目标、扫描模板（工作流）、任务、任务输出以及
//! 发现结果（域名、资产）等业务核心概念。实体字段与数据库表
//! 一一对应，JSON 序列化形式即对外接口形式。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 顶级工作流任务的任务类型
pub const TASK_TYPE_WORKFLOW: &str = "workflow";

/// 项目
///
/// 侦察扫描的组织单元，所有目标、任务和发现结果都归属于某个项目。
///
/// # 字段说明
///
/// - `id`: 项目唯一标识
/// - `name`: 项目名称，全局唯一
/// - `description`: 项目描述
/// - `status`: 项目状态（active/archived）
/// - `deleted_at`: 软删除时间，引擎不依赖此字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 项目状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
        }
    }
}

/// 扫描目标
///
/// 用户在项目下登记的待扫描对象，类型为域名、IP 或 CIDR 网段。
/// 同一项目内 `value` 唯一。引擎只读，不修改目标。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTarget {
    pub id: i64,
    pub project_id: i64,
    pub value: String,
    pub target_type: TargetType,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 目标类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Domain,
    Ip,
    Cidr,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Domain => "domain",
            TargetType::Ip => "ip",
            TargetType::Cidr => "cidr",
        }
    }
}

/// 工作流步骤的执行模式
///
/// 空字符串（或缺省）表示线性执行；`parallel` 表示对上一步输出的
/// 每个元素扇出一个并行子任务。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    #[serde(rename = "", alias = "linear")]
    Linear,
    #[serde(rename = "parallel")]
    Parallel,
}

impl ExecutionMode {
    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecutionMode::Parallel)
    }
}

/// 工作流步骤
///
/// 扫描模板中的一个节点。`input_from` 定义数据依赖边：
/// `"initial"` 表示接收扫描启动时的初始输入，否则为上游步骤的名称。
///
/// # 字段说明
///
/// - `name`: 步骤名，模板内唯一
/// - `task_type`: 队列路由键，例如 "discovery:subdomain:subfinder"
/// - `command_template`: 命令模板，例如 "subfinder -d {{input}} -json"
/// - `input_from`: 输入来源（"initial" 或上游步骤名）
/// - `output_parser_type`: 输出解析器名称，可为空
/// - `execution_mode`: 执行模式，缺省为线性
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowStep {
    pub name: String,
    pub task_type: String,
    pub command_template: String,
    pub input_from: String,
    #[serde(default)]
    pub output_parser_type: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
}

/// 初始步骤的输入来源标记
pub const INPUT_FROM_INITIAL: &str = "initial";

/// 扫描模板
///
/// 可复用的扫描工作流定义，步骤数组以 JSONB 形式存储。
/// 运行中的工作流按步骤名称从当前模板行解析步骤。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProfile {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub workflow_steps: Vec<WorkflowStep>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanProfile {
    /// 按名称查找步骤
    pub fn find_step(&self, name: &str) -> Option<&WorkflowStep> {
        self.workflow_steps.iter().find(|s| s.name == name)
    }

    /// 查找第一个初始步骤（扫描启动入口）
    pub fn first_step(&self) -> Option<&WorkflowStep> {
        self.workflow_steps
            .iter()
            .find(|s| s.input_from == INPUT_FROM_INITIAL)
    }

    /// 查找以指定步骤为输入来源的后继步骤
    pub fn next_step_after(&self, step_name: &str) -> Option<&WorkflowStep> {
        if step_name.is_empty() {
            return None;
        }
        self.workflow_steps
            .iter()
            .find(|s| s.input_from == step_name)
    }

    /// 校验步骤图的合法性
    ///
    /// 要求：步骤名唯一；至少一个初始步骤；每个非初始步骤的
    /// `input_from` 指向已存在的步骤名；依赖边不成环。
    pub fn validate_steps(&self) -> Result<(), String> {
        if self.workflow_steps.is_empty() {
            return Err("工作流步骤不能为空".to_string());
        }

        let mut names = std::collections::HashSet::new();
        for step in &self.workflow_steps {
            if step.name.is_empty() {
                return Err("步骤名不能为空".to_string());
            }
            if !names.insert(step.name.as_str()) {
                return Err(format!("步骤名 '{}' 重复", step.name));
            }
            if step.task_type.is_empty() {
                return Err(format!("步骤 '{}' 缺少 task_type", step.name));
            }
            if step.command_template.is_empty() {
                return Err(format!("步骤 '{}' 缺少 command_template", step.name));
            }
        }

        if self.first_step().is_none() {
            return Err("工作流中缺少起始步骤 (input_from: \"initial\")".to_string());
        }

        for step in &self.workflow_steps {
            if step.input_from != INPUT_FROM_INITIAL && !names.contains(step.input_from.as_str()) {
                return Err(format!(
                    "步骤 '{}' 的输入来源 '{}' 不存在",
                    step.name, step.input_from
                ));
            }
        }

        // 沿 input_from 边回溯，步数超过步骤总数即说明成环
        for step in &self.workflow_steps {
            let mut current = step;
            let mut hops = 0;
            while current.input_from != INPUT_FROM_INITIAL {
                hops += 1;
                if hops > self.workflow_steps.len() {
                    return Err(format!("步骤 '{}' 所在的依赖链成环", step.name));
                }
                match self.find_step(&current.input_from) {
                    Some(prev) => current = prev,
                    None => break,
                }
            }
        }

        Ok(())
    }
}

/// 任务状态
///
/// 状态机：pending →(出队)→ running →(成功)→ success；
/// running →(失败)→ failed；顶级工作流任务在最后一个分支结束时
/// 由扇入逻辑置为 completed。success/failed/completed 均为终态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Completed
        )
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("无效的任务状态: {other}")),
        }
    }
}

/// 任务
///
/// 工作流的持久化执行记录。顶级任务（`parent_task_id == 0`，
/// `task_type == "workflow"`）代表整个工作流；其余任务记录单个
/// 步骤的一次执行。
///
/// # 字段说明
///
/// - `payload`: 任务载荷（JSON），顶级任务存启动请求
/// - `queue`: 入队时使用的队列名
/// - `result`: 执行结果或失败原因
/// - `parent_task_id`: 父任务ID，0 表示顶级
/// - `workflow_step`: 本任务执行的步骤名，顶级任务为空
/// - `pending_subtasks`: 扇出计数器，子任务到达终态时单调递减到 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub scan_profile_id: i64,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub queue: String,
    pub status: TaskStatus,
    pub result: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub parent_task_id: i64,
    pub workflow_step: String,
    pub pending_subtasks: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 是否为顶级工作流任务
    pub fn is_workflow_root(&self) -> bool {
        self.parent_task_id == 0
    }
}

/// 任务输出
///
/// 单个步骤执行完毕后的结构化输出，是步骤之间传递数据的载体。
/// 每个非顶级任务至多一条。非 JSON 的原始 stdout 以 JSON 字符串
/// 值的形式存储，保证 JSONB 列始终可写。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub id: i64,
    pub task_id: i64,
    pub parent_task_id: i64,
    pub output_type: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 域名
///
/// 去重后的子域名发现结果，同一项目内 `fqdn` 唯一。
/// 序列化后的 `id`/`fqdn` 字段被扇出逻辑用来构造子任务载荷。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub project_id: i64,
    pub fqdn: String,
    #[serde(default)]
    pub root_domain: String,
    #[serde(default)]
    pub source: String,
    #[serde(default = "Utc::now")]
    pub last_seen_at: DateTime<Utc>,
}

/// 资产
///
/// 去重后的服务发现结果，同一项目内 `(ip, port)` 唯一。
/// 重复发现只更新快照列（last_seen_at、title、web_server、
/// technologies、updated_at）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub project_id: i64,
    pub ip: String,
    pub port: i32,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub web_server: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default = "Utc::now")]
    pub last_seen_at: DateTime<Utc>,
}

/// 资产与域名的关联，幂等插入
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetDomainMapping {
    pub asset_id: i64,
    pub domain_id: i64,
}

/// 分页查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_profile() -> ScanProfile {
        ScanProfile {
            id: 1,
            name: "sub-then-probe".to_string(),
            description: String::new(),
            workflow_steps: vec![
                WorkflowStep {
                    name: "sub".to_string(),
                    task_type: "discovery:subdomain:subfinder".to_string(),
                    command_template: "subfinder -d {{input}} -json".to_string(),
                    input_from: "initial".to_string(),
                    output_parser_type: "subfinder_json_list".to_string(),
                    execution_mode: ExecutionMode::Linear,
                },
                WorkflowStep {
                    name: "probe".to_string(),
                    task_type: "discovery:http:httpx".to_string(),
                    command_template: "httpx -u {{input}} -json".to_string(),
                    input_from: "sub".to_string(),
                    output_parser_type: "httpx_json_list".to_string(),
                    execution_mode: ExecutionMode::Parallel,
                },
            ],
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_step_lookup() {
        let profile = probe_profile();
        assert_eq!(profile.first_step().unwrap().name, "sub");
        assert_eq!(profile.next_step_after("sub").unwrap().name, "probe");
        assert!(profile.next_step_after("probe").is_none());
        assert!(profile.next_step_after("").is_none());
        assert!(profile.find_step("missing").is_none());
    }

    #[test]
    fn test_validate_steps_accepts_valid_profile() {
        assert!(probe_profile().validate_steps().is_ok());
    }

    #[test]
    fn test_validate_steps_rejects_missing_initial() {
        let mut profile = probe_profile();
        profile.workflow_steps[0].input_from = "probe".to_string();
        let err = profile.validate_steps().unwrap_err();
        assert!(err.contains("起始步骤"));
    }

    #[test]
    fn test_validate_steps_rejects_duplicate_names() {
        let mut profile = probe_profile();
        profile.workflow_steps[1].name = "sub".to_string();
        assert!(profile.validate_steps().unwrap_err().contains("重复"));
    }

    #[test]
    fn test_validate_steps_rejects_unknown_input_from() {
        let mut profile = probe_profile();
        profile.workflow_steps[1].input_from = "ghost".to_string();
        assert!(profile.validate_steps().unwrap_err().contains("不存在"));
    }

    #[test]
    fn test_execution_mode_serde() {
        // 空字符串与缺省都表示线性
        let step: WorkflowStep = serde_json::from_str(
            r#"{"name":"s","task_type":"t","command_template":"c","input_from":"initial","output_parser_type":"","execution_mode":""}"#,
        )
        .unwrap();
        assert_eq!(step.execution_mode, ExecutionMode::Linear);

        let step: WorkflowStep = serde_json::from_str(
            r#"{"name":"s","task_type":"t","command_template":"c","input_from":"initial"}"#,
        )
        .unwrap();
        assert_eq!(step.execution_mode, ExecutionMode::Linear);
        assert!(step.output_parser_type.is_empty());

        let step: WorkflowStep = serde_json::from_str(
            r#"{"name":"s","task_type":"t","command_template":"c","input_from":"sub","execution_mode":"parallel"}"#,
        )
        .unwrap();
        assert!(step.execution_mode.is_parallel());
    }

    #[test]
    fn test_task_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Success,
            TaskStatus::Failed,
            TaskStatus::Completed,
        ] {
            assert_eq!(TaskStatus::try_from(status.as_str()).unwrap(), status);
        }
        assert!(TaskStatus::try_from("unknown").is_err());
        assert!(TaskStatus::Success.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_domain_deserializes_parser_output() {
        // 解析器产出的域名记录可以没有 id/project_id 字段
        let domain: Domain =
            serde_json::from_str(r#"{"fqdn":"a.example.com","source":"crtsh"}"#).unwrap();
        assert_eq!(domain.id, 0);
        assert_eq!(domain.fqdn, "a.example.com");
    }
}

//! 工作流处理器
//!
//! 队列任务的唯一入口：解析载荷、定位模板与步骤、落库子任务、
//! 解析输入、渲染并执行命令、规范化与持久化输出、触发后继步骤，
//! 最后执行扇入终结逻辑。每一步都可在队列重投递后恢复。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use reconflow_domain::entities::{
    AssetDomainMapping, ScanProfile, Task, TaskOutput, TaskStatus, WorkflowStep,
    INPUT_FROM_INITIAL,
};
use reconflow_domain::messaging::{Message, MessageQueue, WorkflowPayload};
use reconflow_domain::repositories::{
    AssetRepository, DomainRepository, ScanProfileRepository, TaskOutputRepository,
    TaskRepository,
};
use reconflow_errors::{ReconError, ReconResult};

use crate::executors::CommandExecutor;
use crate::parser::{ParserRegistry, PARSER_SUBFINDER_JSON_LIST};
use crate::template::render_command;

/// 父任务链上溯的深度上限（正常工作流树深度不超过个位数）
const MAX_WALK_DEPTH: usize = 16;

/// 队列任务处理器接口
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> ReconResult<()>;
}

/// 后继触发的结果
#[derive(Debug, Clone, Copy, Default)]
struct TriggerOutcome {
    /// 是否对输出数组执行了扇出
    fanned_out: bool,
    /// 是否派发了任何后继任务
    triggered: bool,
}

/// 工作流处理器
///
/// 所有协作方通过构造函数注入，处理器自身无全局状态。
pub struct WorkflowProcessor {
    profile_repo: Arc<dyn ScanProfileRepository>,
    task_repo: Arc<dyn TaskRepository>,
    output_repo: Arc<dyn TaskOutputRepository>,
    domain_repo: Arc<dyn DomainRepository>,
    asset_repo: Arc<dyn AssetRepository>,
    queue: Arc<dyn MessageQueue>,
    executor: Arc<dyn CommandExecutor>,
    parsers: Arc<ParserRegistry>,
    default_queue: String,
    command_timeout: Duration,
}

impl WorkflowProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profile_repo: Arc<dyn ScanProfileRepository>,
        task_repo: Arc<dyn TaskRepository>,
        output_repo: Arc<dyn TaskOutputRepository>,
        domain_repo: Arc<dyn DomainRepository>,
        asset_repo: Arc<dyn AssetRepository>,
        queue: Arc<dyn MessageQueue>,
        executor: Arc<dyn CommandExecutor>,
        parsers: Arc<ParserRegistry>,
    ) -> Self {
        Self {
            profile_repo,
            task_repo,
            output_repo,
            domain_repo,
            asset_repo,
            queue,
            executor,
            parsers,
            default_queue: "default".to_string(),
            command_timeout: Duration::from_secs(300),
        }
    }

    /// 设置后继任务的入队队列
    pub fn with_default_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.default_queue = queue_name.into();
        self
    }

    /// 设置单条命令的超时
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// 标记任务失败并返回原始错误
    ///
    /// 状态写入是尽力而为：失败原因已在 result 中留痕，错误本身
    /// 交由队列按可重试性决定是否重投递。
    async fn fail_task(&self, task_id: i64, reason: String, source: ReconError) -> ReconError {
        error!(task_id, %reason, "任务失败");
        if let Err(e) = self
            .task_repo
            .update_status(task_id, TaskStatus::Failed, &reason)
            .await
        {
            error!(task_id, error = %e, "写入任务失败状态时出错");
        }
        source
    }

    /// 解析任务输入（§步骤输入解析）
    ///
    /// 初始步骤或载荷已携带输入时原样使用；否则查询同一父任务下
    /// 上游步骤的任务记录及其输出，填入载荷。
    async fn resolve_input(
        &self,
        payload: &mut WorkflowPayload,
        step: &WorkflowStep,
    ) -> ReconResult<()> {
        if step.input_from == INPUT_FROM_INITIAL || !payload.input.is_empty() {
            return Ok(());
        }

        let source_task = self
            .task_repo
            .find_by_parent_and_step(payload.parent_task_id, &step.input_from)
            .await?
            .ok_or_else(|| ReconError::UpstreamTaskNotFound {
                step: step.input_from.clone(),
            })?;

        let source_output = self
            .output_repo
            .find_by_task_id(source_task.id)
            .await?
            .ok_or(ReconError::TaskOutputNotFound {
                task_id: source_task.id,
            })?;

        payload.input = match &source_output.data {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(())
    }

    /// 规范化命令输出用于存储
    ///
    /// subfinder 类输出统一为 JSON 数组（能解析为 JSON 的行进入
    /// 数组，杂音行丢弃）；其余输出整体可解析为 JSON 时原样存储，
    /// 否则作为 JSON 字符串值存储。
    fn normalize_output(parser_type: &str, stdout: &[u8]) -> serde_json::Value {
        let text = String::from_utf8_lossy(stdout);
        if parser_type == PARSER_SUBFINDER_JSON_LIST {
            let values: Vec<serde_json::Value> = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect();
            return serde_json::Value::Array(values);
        }
        serde_json::from_str(text.trim())
            .unwrap_or_else(|_| serde_json::Value::String(text.into_owned()))
    }

    /// 解析输出并持久化域名/资产记录（§输出持久化）
    ///
    /// 返回持久化后应写回任务输出的新数据（域名列表回填了数据库
    /// 分配的 ID，供下一步扇出引用）。
    async fn persist_parse_result(
        &self,
        child_task: &Task,
        payload: &WorkflowPayload,
        step: &WorkflowStep,
        stdout: &[u8],
    ) -> ReconResult<Option<serde_json::Value>> {
        let Some(parser) = self.parsers.get(&step.output_parser_type) else {
            // 未注册的解析器不致命：留痕后继续
            warn!(parser = %step.output_parser_type, "找不到解析器，跳过结果解析");
            self.task_repo
                .update_status(
                    child_task.id,
                    TaskStatus::Running,
                    &format!("警告：找不到解析器 {}", step.output_parser_type),
                )
                .await?;
            return Ok(None);
        };

        let mut parse_result = parser.parse(stdout)?;
        let now = Utc::now();
        let mut updated_data = None;

        if !parse_result.domains.is_empty() {
            for domain in &mut parse_result.domains {
                domain.project_id = child_task.project_id;
                domain.last_seen_at = now;
                if step.input_from == INPUT_FROM_INITIAL {
                    domain.root_domain = payload.input.clone();
                }
            }
            self.domain_repo.upsert_many(&parse_result.domains).await?;

            // 回查以取得数据库分配的ID，并作为下一步的输入写回
            let fqdns: Vec<String> = parse_result
                .domains
                .iter()
                .map(|d| d.fqdn.clone())
                .collect();
            let persisted = self
                .domain_repo
                .find_by_fqdns(child_task.project_id, &fqdns)
                .await?;
            info!(
                task_id = child_task.id,
                count = persisted.len(),
                "域名记录已持久化"
            );
            updated_data = Some(serde_json::to_value(&persisted)?);
        }

        if !parse_result.assets.is_empty() {
            for asset in &mut parse_result.assets {
                asset.project_id = child_task.project_id;
                asset.last_seen_at = now;
            }
            self.asset_repo.upsert_many(&parse_result.assets).await?;
            info!(
                task_id = child_task.id,
                count = parse_result.assets.len(),
                "资产记录已持久化"
            );

            // 载荷携带域名ID时建立资产与域名的关联
            if let Some(domain_id) = payload.domain_id.filter(|id| *id > 0) {
                let mut ips: Vec<String> =
                    parse_result.assets.iter().map(|a| a.ip.clone()).collect();
                ips.dedup();
                let persisted = self
                    .asset_repo
                    .find_by_ips(child_task.project_id, &ips)
                    .await?;
                let mappings: Vec<AssetDomainMapping> = persisted
                    .iter()
                    .map(|asset| AssetDomainMapping {
                        asset_id: asset.id,
                        domain_id,
                    })
                    .collect();
                if !mappings.is_empty() {
                    self.asset_repo.link_domains(&mappings).await?;
                }
            }
        }

        Ok(updated_data)
    }

    /// 当前任务是否为扇出组成员
    ///
    /// 扇出子任务的父指针指向扇出节点（一个普通步骤任务）；
    /// 线性链任务的父指针指向顶级工作流任务。
    async fn is_fan_out_member(&self, payload: &WorkflowPayload) -> ReconResult<bool> {
        if payload.parent_task_id == 0 {
            return Ok(false);
        }
        let parent = self.task_repo.find_by_id(payload.parent_task_id).await?;
        Ok(parent
            .map(|p| !p.is_workflow_root() && p.pending_subtasks > 0)
            .unwrap_or(false))
    }

    /// 对输出数组扇出并行子任务
    ///
    /// 扇出把父指针改写为当前任务，使扇入能以它为计数锚点。
    /// 返回实际派发的子任务数；计数器在入队前按可用元素数原子设置。
    async fn fan_out(
        &self,
        anchor_task: &Task,
        next_step: &WorkflowStep,
        data: &serde_json::Value,
    ) -> ReconResult<usize> {
        let Some(items) = data.as_array() else {
            return Ok(0);
        };

        // 先筛出可用元素再设置计数，保证计数与入队数一致
        let eligible: Vec<(String, Option<i64>)> = items
            .iter()
            .filter_map(|item| {
                let host = item
                    .get("fqdn")
                    .and_then(|v| v.as_str())
                    .or_else(|| item.get("host").and_then(|v| v.as_str()))
                    .unwrap_or_default();
                if host.is_empty() {
                    return None;
                }
                let domain_id = item.get("id").and_then(|v| v.as_i64()).filter(|id| *id > 0);
                Some((host.to_string(), domain_id))
            })
            .collect();

        if eligible.is_empty() {
            return Ok(0);
        }

        self.task_repo
            .set_pending_subtasks(anchor_task.id, eligible.len() as i32)
            .await?;

        for (host, domain_id) in &eligible {
            let next_payload = WorkflowPayload {
                project_id: anchor_task.project_id,
                parent_task_id: anchor_task.id,
                scan_profile_id: anchor_task.scan_profile_id,
                current_step_name: next_step.name.clone(),
                input: host.clone(),
                domain_id: *domain_id,
            };
            let message = Message::workflow(&next_step.task_type, &next_payload)?;
            self.queue
                .publish_message(&self.default_queue, &message)
                .await?;
        }

        info!(
            task_id = anchor_task.id,
            step = %next_step.name,
            count = eligible.len(),
            "已扇出并行子任务"
        );
        Ok(eligible.len())
    }

    /// 触发后继步骤（§后继触发）
    async fn trigger_next_step(
        &self,
        current_task: &Task,
        payload: &WorkflowPayload,
        profile: &ScanProfile,
        output_data: &serde_json::Value,
    ) -> ReconResult<TriggerOutcome> {
        let Some(next_step) = profile.next_step_after(&payload.current_step_name) else {
            return Ok(TriggerOutcome::default());
        };

        if next_step.execution_mode.is_parallel() {
            let count = self.fan_out(current_task, next_step, output_data).await?;
            return Ok(TriggerOutcome {
                fanned_out: count > 0,
                triggered: count > 0,
            });
        }

        // 扇出组成员不各自触发组的线性后继：扇入终结器统一触发一次
        if self.is_fan_out_member(payload).await? {
            debug!(
                task_id = current_task.id,
                "扇出组成员，线性后继由扇入触发"
            );
            return Ok(TriggerOutcome::default());
        }

        let next_payload = WorkflowPayload {
            project_id: payload.project_id,
            parent_task_id: payload.parent_task_id,
            scan_profile_id: profile.id,
            current_step_name: next_step.name.clone(),
            // 线性任务的输入由下一步从上游任务输出解析
            input: String::new(),
            domain_id: None,
        };
        let message = Message::workflow(&next_step.task_type, &next_payload)?;
        self.queue
            .publish_message(&self.default_queue, &message)
            .await?;

        debug!(
            task_id = current_task.id,
            next = %next_step.name,
            "已派发线性后继任务"
        );
        Ok(TriggerOutcome {
            fanned_out: false,
            triggered: true,
        })
    }

    /// 聚合扇出组所有子任务的输出
    ///
    /// 数组输出展开合并，标量输出原样收集，得到一个扁平 JSON 数组。
    async fn aggregate_child_outputs(
        &self,
        parent_task_id: i64,
        workflow_step: &str,
    ) -> ReconResult<serde_json::Value> {
        let outputs = self
            .output_repo
            .find_child_outputs(parent_task_id, workflow_step)
            .await?;

        let mut items = Vec::new();
        for output in outputs {
            match output.data {
                serde_json::Value::Array(values) => items.extend(values),
                serde_json::Value::Null => {}
                other => items.push(other),
            }
        }
        Ok(serde_json::Value::Array(items))
    }

    /// 扇入完成后触发扇出节点的后继步骤
    ///
    /// 线性后继把聚合结果放入载荷 input 一次性派发；并行后继对
    /// 聚合数组再次扇出（计数锚点复用同一扇出节点）。
    /// 返回是否派发了后继。
    async fn trigger_aggregated_successor(
        &self,
        fan_out_node: &Task,
        completed_step: &str,
        next_step: &WorkflowStep,
    ) -> ReconResult<bool> {
        let aggregate = self
            .aggregate_child_outputs(fan_out_node.id, completed_step)
            .await?;

        if next_step.execution_mode.is_parallel() {
            let count = self.fan_out(fan_out_node, next_step, &aggregate).await?;
            return Ok(count > 0);
        }

        let next_payload = WorkflowPayload {
            project_id: fan_out_node.project_id,
            parent_task_id: fan_out_node.parent_task_id,
            scan_profile_id: fan_out_node.scan_profile_id,
            current_step_name: next_step.name.clone(),
            input: aggregate.to_string(),
            domain_id: None,
        };
        let message = Message::workflow(&next_step.task_type, &next_payload)?;
        self.queue
            .publish_message(&self.default_queue, &message)
            .await?;

        info!(
            fan_out_task_id = fan_out_node.id,
            next = %next_step.name,
            "扇入完成，已以聚合输入触发后继步骤"
        );
        Ok(true)
    }

    /// 分支终结后向上传播完成事件（§扇入终结）
    ///
    /// 沿父指针上溯：对每个祖先行锁递减计数；恰好观察到归零的
    /// 调用方负责标记扇出节点成功并触发其后继（或继续上溯）。
    /// 上溯有深度上限并防御父链成环。
    async fn ascend(
        &self,
        start_parent_id: i64,
        completed_step: &str,
        profile: &ScanProfile,
    ) -> ReconResult<()> {
        let mut current_id = start_parent_id;
        let mut completed_step = completed_step.to_string();
        let mut visited = HashSet::new();

        for _ in 0..MAX_WALK_DEPTH {
            if current_id == 0 {
                return Ok(());
            }
            if !visited.insert(current_id) {
                return Err(ReconError::Internal(format!(
                    "父任务链成环: 任务 {current_id} 重复出现"
                )));
            }

            let parent = self
                .task_repo
                .find_by_id(current_id)
                .await?
                .ok_or(ReconError::TaskNotFound { id: current_id })?;

            if parent.is_workflow_root() {
                match self.task_repo.decrement_pending_subtasks(parent.id).await? {
                    Some(remaining) if remaining > 0 => {
                        debug!(
                            workflow_task_id = parent.id,
                            remaining, "初始输入链尚未全部完成"
                        );
                        return Ok(());
                    }
                    _ => {
                        info!(workflow_task_id = parent.id, "工作流已成功完成");
                        self.task_repo
                            .update_status(parent.id, TaskStatus::Completed, "工作流成功完成")
                            .await?;
                        return Ok(());
                    }
                }
            }

            match self.task_repo.decrement_pending_subtasks(parent.id).await? {
                Some(remaining) if remaining > 0 => {
                    debug!(
                        fan_out_task_id = parent.id,
                        remaining, "扇出组仍有子任务未完成"
                    );
                    return Ok(());
                }
                Some(_) => {
                    info!(fan_out_task_id = parent.id, "扇出组全部子任务已完成");
                    self.task_repo
                        .update_status(parent.id, TaskStatus::Success, "所有并行子任务已完成")
                        .await?;

                    if let Some(next_step) = profile.next_step_after(&completed_step) {
                        let triggered = self
                            .trigger_aggregated_successor(&parent, &completed_step, next_step)
                            .await?;
                        if triggered {
                            return Ok(());
                        }
                        // 后继无事可做（聚合为空），分支就此终结，继续上溯
                    }

                    completed_step = parent.workflow_step.clone();
                    current_id = parent.parent_task_id;
                }
                None => {
                    // 父任务不是扇出节点：计数从未设置，不参与扇入
                    warn!(
                        task_id = parent.id,
                        "父任务无扇出计数，跳过扇入传播"
                    );
                    return Ok(());
                }
            }
        }

        Err(ReconError::Internal(format!(
            "父任务链过深 (超过 {MAX_WALK_DEPTH} 层)"
        )))
    }

    /// 非扇出任务的终结（§任务终结）
    async fn finalize_task(
        &self,
        child_task: &Task,
        payload: &WorkflowPayload,
        profile: &ScanProfile,
        triggered_successor: bool,
    ) -> ReconResult<()> {
        if triggered_successor {
            // 链条由后继延续，自身到达终态即可
            self.task_repo
                .update_status(child_task.id, TaskStatus::Success, "步骤完成，已触发后续步骤")
                .await?;
            return Ok(());
        }

        // 本任务没有后继：扇出组成员等待扇入，或线性链终点
        self.task_repo
            .update_status(child_task.id, TaskStatus::Success, "步骤完成")
            .await?;
        self.ascend(payload.parent_task_id, &payload.current_step_name, profile)
            .await
    }
}

#[async_trait]
impl TaskHandler for WorkflowProcessor {
    #[instrument(skip(self, message), fields(task_type = %message.task_type, message_id = %message.id))]
    async fn handle(&self, message: &Message) -> ReconResult<()> {
        info!("开始处理工作流任务");

        // 1. 解码载荷
        let mut payload = message.workflow_payload().map_err(|e| {
            error!(error = %e, "解析任务载荷失败");
            e
        })?;

        // 2. 定位模板与步骤
        let profile = self
            .profile_repo
            .find_by_id(payload.scan_profile_id)
            .await?
            .ok_or(ReconError::ProfileNotFound {
                id: payload.scan_profile_id,
            })?;
        let step = profile
            .find_step(&payload.current_step_name)
            .cloned()
            .ok_or_else(|| ReconError::StepNotFound {
                profile: profile.name.clone(),
                step: payload.current_step_name.clone(),
            })?;

        // 3. 落库子任务记录（本次执行的持久化凭据）
        let child_task = self
            .task_repo
            .create(&Task {
                id: 0,
                project_id: payload.project_id,
                scan_profile_id: payload.scan_profile_id,
                task_type: message.task_type.clone(),
                payload: message.payload.clone(),
                queue: self.default_queue.clone(),
                status: TaskStatus::Running,
                result: String::new(),
                started_at: Some(Utc::now()),
                finished_at: None,
                parent_task_id: payload.parent_task_id,
                workflow_step: payload.current_step_name.clone(),
                pending_subtasks: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await?;

        // 4. 解析输入
        if let Err(e) = self.resolve_input(&mut payload, &step).await {
            let reason = format!("获取任务输入失败: {e}");
            return Err(self.fail_task(child_task.id, reason, e).await);
        }

        // 5. 渲染命令
        let argv = match render_command(&step.command_template, &payload) {
            Ok(argv) => argv,
            Err(e) => {
                let reason = format!("渲染命令模板失败: {e}");
                return Err(self.fail_task(child_task.id, reason, e).await);
            }
        };

        info!(
            task_id = child_task.id,
            step = %step.name,
            command = %argv.join(" "),
            "即将执行任务命令"
        );

        // 6. 执行命令
        let output = match self.executor.run(&argv, self.command_timeout).await {
            Ok(output) => output,
            Err(e) => {
                let reason = format!("执行步骤 '{}' 失败: {e}", step.name);
                return Err(self.fail_task(child_task.id, reason, e).await);
            }
        };
        if !output.success() {
            let reason = format!(
                "failed: 执行步骤 '{}' 退出码 {}. Stderr: {}",
                step.name,
                output.exit_code,
                output.stderr_snippet(512)
            );
            let e = ReconError::ExecutionFailed(reason.clone());
            return Err(self.fail_task(child_task.id, reason, e).await);
        }

        // 7. 规范化并保存任务输出
        let normalized = Self::normalize_output(&step.output_parser_type, &output.stdout);
        let mut task_output = match self
            .output_repo
            .create(&TaskOutput {
                id: 0,
                task_id: child_task.id,
                parent_task_id: payload.parent_task_id,
                output_type: step.output_parser_type.clone(),
                data: normalized,
                created_at: Utc::now(),
            })
            .await
        {
            Ok(task_output) => task_output,
            Err(e) => {
                let reason = format!("保存任务输出结果失败: {e}");
                return Err(self.fail_task(child_task.id, reason, e).await);
            }
        };

        // 8. 解析并持久化域名/资产
        if !step.output_parser_type.is_empty() {
            match self
                .persist_parse_result(&child_task, &payload, &step, &output.stdout)
                .await
            {
                Ok(Some(updated_data)) => {
                    // 带ID的记录列表覆盖原输出，供下一步引用
                    if let Err(e) = self.output_repo.update_data(child_task.id, &updated_data).await
                    {
                        let reason = format!("回写任务输出失败: {e}");
                        return Err(self.fail_task(child_task.id, reason, e).await);
                    }
                    task_output.data = updated_data;
                }
                Ok(None) => {}
                Err(e) => {
                    let reason = format!(
                        "使用解析器 '{}' 处理输出失败: {e}",
                        step.output_parser_type
                    );
                    return Err(self.fail_task(child_task.id, reason, e).await);
                }
            }
        }

        // 9. 触发后继步骤
        let outcome = match self
            .trigger_next_step(&child_task, &payload, &profile, &task_output.data)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = format!("触发下一步任务失败: {e}");
                return Err(self.fail_task(child_task.id, reason, e).await);
            }
        };

        // 10. 终结本任务
        if outcome.fanned_out {
            self.task_repo
                .update_status(
                    child_task.id,
                    TaskStatus::Success,
                    "已成功派发所有并行子任务",
                )
                .await?;
            return Ok(());
        }

        if let Err(e) = self
            .finalize_task(&child_task, &payload, &profile, outcome.triggered)
            .await
        {
            let reason = format!("终结任务失败: {e}");
            return Err(self.fail_task(child_task.id, reason, e).await);
        }

        Ok(())
    }
}

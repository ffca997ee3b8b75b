//! 工作流处理器的端到端场景测试
//!
//! 用内存仓储、内存队列和脚本化执行器驱动完整工作流：
//! 消息泵循环消费队列并调用处理器，直到队列排空。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reconflow_domain::entities::{ScanProfile, TaskStatus};
use reconflow_domain::messaging::{Message, MessageQueue, WorkflowPayload};
use reconflow_domain::{TaskOutputRepository, TaskRepository};
use reconflow_errors::{ReconError, ReconResult};
use reconflow_infrastructure::InMemoryMessageQueue;
use reconflow_testing_utils::{
    MockAssetRepository, MockDomainRepository, MockScanProfileRepository,
    MockTaskOutputRepository, MockTaskRepository, ScanProfileBuilder, TaskBuilder,
    WorkflowStepBuilder,
};
use reconflow_worker::executors::{CommandExecutor, ExecutionOutput};
use reconflow_worker::processor::{TaskHandler, WorkflowProcessor};
use reconflow_worker::ParserRegistry;

type ScriptFn = dyn Fn(&[String]) -> ReconResult<ExecutionOutput> + Send + Sync;

/// 按程序名返回脚本化输出的执行器
struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Arc<ScriptFn>>>,
}

impl ScriptedExecutor {
    fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
        }
    }

    fn script<F>(&self, program: &str, f: F)
    where
        F: Fn(&[String]) -> ReconResult<ExecutionOutput> + Send + Sync + 'static,
    {
        self.scripts
            .lock()
            .unwrap()
            .insert(program.to_string(), Arc::new(f));
    }

    fn stdout(text: &str) -> ReconResult<ExecutionOutput> {
        Ok(ExecutionOutput {
            stdout: text.as_bytes().to_vec(),
            stderr: Vec::new(),
            exit_code: 0,
        })
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, argv: &[String], _timeout: Duration) -> ReconResult<ExecutionOutput> {
        let program = argv
            .first()
            .ok_or_else(|| ReconError::ExecutionFailed("命令为空".to_string()))?;
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(program)
            .cloned()
            .ok_or_else(|| ReconError::ExecutionFailed(format!("未脚本化的命令: {program}")))?;
        script(argv)
    }
}

struct Harness {
    task_repo: Arc<MockTaskRepository>,
    output_repo: Arc<MockTaskOutputRepository>,
    domain_repo: Arc<MockDomainRepository>,
    asset_repo: Arc<MockAssetRepository>,
    queue: Arc<InMemoryMessageQueue>,
    executor: Arc<ScriptedExecutor>,
    processor: WorkflowProcessor,
}

fn harness(profile: ScanProfile) -> Harness {
    let profile_repo = Arc::new(MockScanProfileRepository::with_profiles(vec![profile]));
    let task_repo = Arc::new(MockTaskRepository::new());
    let output_repo = Arc::new(MockTaskOutputRepository::new(task_repo.tasks_handle()));
    let domain_repo = Arc::new(MockDomainRepository::new());
    let asset_repo = Arc::new(MockAssetRepository::new());
    let queue = Arc::new(InMemoryMessageQueue::new());
    let executor = Arc::new(ScriptedExecutor::new());

    let processor = WorkflowProcessor::new(
        profile_repo,
        task_repo.clone(),
        output_repo.clone(),
        domain_repo.clone(),
        asset_repo.clone(),
        queue.clone(),
        executor.clone(),
        Arc::new(ParserRegistry::with_builtins()),
    );

    Harness {
        task_repo,
        output_repo,
        domain_repo,
        asset_repo,
        queue,
        executor,
        processor,
    }
}

/// 创建顶级工作流任务并派发首步消息（对应扫描启动器的语义）
async fn launch(h: &Harness, profile: &ScanProfile, inputs: &[&str]) -> i64 {
    let root = h
        .task_repo
        .create(
            &TaskBuilder::new()
                .scan_profile_id(profile.id)
                .status(TaskStatus::Pending)
                .pending_subtasks(inputs.len() as i32)
                .build(),
        )
        .await
        .unwrap();

    let first_step = profile.first_step().unwrap();
    for input in inputs {
        let payload = WorkflowPayload {
            project_id: 1,
            parent_task_id: root.id,
            scan_profile_id: profile.id,
            current_step_name: first_step.name.clone(),
            input: input.to_string(),
            domain_id: None,
        };
        let message = Message::workflow(&first_step.task_type, &payload).unwrap();
        h.queue.publish_message("default", &message).await.unwrap();
    }
    root.id
}

/// 消费一批消息并处理
async fn pump_batch(h: &Harness) -> usize {
    let messages = h.queue.consume_messages("default").await.unwrap();
    for message in &messages {
        match h.processor.handle(message).await {
            Ok(()) => h.queue.ack_message(&message.id).await.unwrap(),
            Err(_) => h.queue.nack_message(&message.id, false).await.unwrap(),
        }
    }
    messages.len()
}

/// 循环消费直到队列排空
async fn pump(h: &Harness) {
    loop {
        if pump_batch(h).await == 0 {
            break;
        }
    }
}

fn subfinder_profile() -> ScanProfile {
    ScanProfileBuilder::new("single-sub")
        .id(1)
        .step(
            WorkflowStepBuilder::new("sub")
                .task_type("discovery:subdomain:subfinder")
                .command_template("subfinder -d {{input}} -json")
                .input_from("initial")
                .output_parser("subfinder_json_list")
                .build(),
        )
        .build()
}

fn sub_then_probe_profile() -> ScanProfile {
    ScanProfileBuilder::new("sub-then-probe")
        .id(1)
        .step(
            WorkflowStepBuilder::new("sub")
                .task_type("discovery:subdomain:subfinder")
                .command_template("subfinder -d {{input}} -json")
                .input_from("initial")
                .output_parser("subfinder_json_list")
                .build(),
        )
        .step(
            WorkflowStepBuilder::new("probe")
                .task_type("discovery:http:httpx")
                .command_template("httpx -u {{input}} -json")
                .input_from("sub")
                .output_parser("httpx_json_list")
                .parallel()
                .build(),
        )
        .build()
}

const SUBFINDER_THREE_HOSTS: &str = concat!(
    r#"{"host":"a.example.com","source":"crtsh"}"#,
    "\n",
    r#"{"host":"b.example.com","source":"dns"}"#,
    "\n",
    r#"{"host":"c.example.com","source":"crtsh"}"#,
    "\n",
);

fn script_httpx(h: &Harness) {
    h.executor.script("httpx", |argv| {
        let host = argv
            .iter()
            .position(|a| a == "-u")
            .and_then(|i| argv.get(i + 1))
            .cloned()
            .unwrap_or_default();
        let ip = match host.as_str() {
            "a.example.com" => "10.0.0.1",
            "b.example.com" => "10.0.0.2",
            _ => "10.0.0.3",
        };
        ScriptedExecutor::stdout(&format!(
            r#"{{"url":"https://{host}","title":"首页","webserver":"nginx","tech":["Nginx"],"a":["{ip}"],"port":"443"}}"#
        ))
    });
}

// S1：单步线性工作流
#[tokio::test]
async fn test_single_step_linear_workflow() {
    let profile = subfinder_profile();
    let h = harness(profile.clone());
    h.executor.script("subfinder", |_| {
        ScriptedExecutor::stdout(concat!(
            r#"{"host":"a.example.com","source":"crtsh"}"#,
            "\n",
            r#"{"host":"b.example.com","source":"dns"}"#,
            "\n",
        ))
    });

    let root_id = launch(&h, &profile, &["example.com"]).await;
    pump(&h).await;

    // 顶级任务完成
    let root = h.task_repo.task(root_id).unwrap();
    assert_eq!(root.status, TaskStatus::Completed);
    assert_eq!(root.result, "工作流成功完成");
    assert_eq!(root.pending_subtasks, 0);

    // 一个成功的子任务和一条任务输出
    let children = h.task_repo.find_children(root_id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].status, TaskStatus::Success);
    assert_eq!(children[0].workflow_step, "sub");
    assert!(children[0].finished_at.is_some());

    let outputs = h.output_repo.all_outputs();
    assert_eq!(outputs.len(), 1);
    // 输出被回填为带数据库ID的域名列表
    let items = outputs[0].data.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items[0]["id"].as_i64().unwrap() > 0);
    assert_eq!(items[0]["fqdn"], "a.example.com");

    // 域名带根域与项目归属
    let domains = h.domain_repo.all_domains();
    assert_eq!(domains.len(), 2);
    for domain in &domains {
        assert_eq!(domain.project_id, 1);
        assert_eq!(domain.root_domain, "example.com");
    }
}

// S2：扇出后在终点扇入
#[tokio::test]
async fn test_fan_out_then_fan_in_terminus() {
    let profile = sub_then_probe_profile();
    let h = harness(profile.clone());
    h.executor
        .script("subfinder", |_| ScriptedExecutor::stdout(SUBFINDER_THREE_HOSTS));
    script_httpx(&h);

    let root_id = launch(&h, &profile, &["example.com"]).await;
    pump(&h).await;

    let root = h.task_repo.task(root_id).unwrap();
    assert_eq!(root.status, TaskStatus::Completed);

    // 扇出节点：计数归零，状态成功
    let sub_task = h
        .task_repo
        .find_by_parent_and_step(root_id, "sub")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub_task.status, TaskStatus::Success);
    assert_eq!(sub_task.pending_subtasks, 0);

    // 三个并行子任务全部成功
    let probes = h.task_repo.find_children(sub_task.id).await.unwrap();
    assert_eq!(probes.len(), 3);
    assert!(probes.iter().all(|t| t.status == TaskStatus::Success));
    assert!(probes.iter().all(|t| t.workflow_step == "probe"));

    // 每个IP一条资产，且与触发域名建立了关联
    let assets = h.asset_repo.all_assets();
    assert_eq!(assets.len(), 3);
    assert!(assets.iter().all(|a| a.source == "httpx"));
    assert_eq!(h.asset_repo.all_mappings().len(), 3);
}

// S3：命令失败的子任务不参与扇入计数，工作流停留在未完成态
#[tokio::test]
async fn test_failed_sibling_stalls_fan_in() {
    let profile = sub_then_probe_profile();
    let h = harness(profile.clone());
    h.executor
        .script("subfinder", |_| ScriptedExecutor::stdout(SUBFINDER_THREE_HOSTS));
    h.executor.script("httpx", |argv| {
        let host = argv
            .iter()
            .position(|a| a == "-u")
            .and_then(|i| argv.get(i + 1))
            .cloned()
            .unwrap_or_default();
        if host == "b.example.com" {
            return Ok(ExecutionOutput {
                stdout: Vec::new(),
                stderr: b"connection refused".to_vec(),
                exit_code: 1,
            });
        }
        ScriptedExecutor::stdout(&format!(
            r#"{{"url":"https://{host}","a":["10.1.0.1"],"port":"443"}}"#
        ))
    });

    let root_id = launch(&h, &profile, &["example.com"]).await;
    pump(&h).await;

    // 顶级任务未完成
    let root = h.task_repo.task(root_id).unwrap();
    assert_eq!(root.status, TaskStatus::Pending);

    let sub_task = h
        .task_repo
        .find_by_parent_and_step(root_id, "sub")
        .await
        .unwrap()
        .unwrap();
    // 失败的子任务不递减计数
    assert_eq!(sub_task.pending_subtasks, 1);

    let probes = h.task_repo.find_children(sub_task.id).await.unwrap();
    let failed: Vec<_> = probes
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].result.contains("failed:"));
    assert!(failed[0].result.contains("connection refused"));
    // 失败任务没有输出记录
    assert!(h
        .output_repo
        .find_by_task_id(failed[0].id)
        .await
        .unwrap()
        .is_none());
}

// S4：上游输出缺失导致线性后继失败
#[tokio::test]
async fn test_missing_upstream_output_fails_successor() {
    let profile = ScanProfileBuilder::new("sub-then-clean")
        .id(1)
        .step(
            WorkflowStepBuilder::new("sub")
                .command_template("subfinder -d {{input}} -json")
                .output_parser("subfinder_json_list")
                .build(),
        )
        .step(
            WorkflowStepBuilder::new("clean")
                .command_template("cleaner {{input}}")
                .input_from("sub")
                .build(),
        )
        .build();
    let h = harness(profile.clone());
    h.executor
        .script("subfinder", |_| ScriptedExecutor::stdout(SUBFINDER_THREE_HOSTS));
    h.executor.script("cleaner", |_| ScriptedExecutor::stdout("ok"));

    let root_id = launch(&h, &profile, &["example.com"]).await;

    // 只处理第一步
    assert_eq!(pump_batch(&h).await, 1);
    let sub_task = h
        .task_repo
        .find_by_parent_and_step(root_id, "sub")
        .await
        .unwrap()
        .unwrap();

    // 模拟输出被外部删除
    h.output_repo.remove_output(sub_task.id);
    pump(&h).await;

    let clean_task = h
        .task_repo
        .find_by_parent_and_step(root_id, "clean")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(clean_task.status, TaskStatus::Failed);
    assert!(clean_task.result.contains("获取任务输入失败"));

    let root = h.task_repo.task(root_id).unwrap();
    assert_ne!(root.status, TaskStatus::Completed);
}

// S5：重复发现幂等，任务记录各自独立
#[tokio::test]
async fn test_duplicate_discovery_is_idempotent() {
    let profile = subfinder_profile();
    let h = harness(profile.clone());
    h.executor.script("subfinder", |_| {
        ScriptedExecutor::stdout(r#"{"host":"a.example.com","source":"crtsh"}"#)
    });

    let first_root = launch(&h, &profile, &["example.com"]).await;
    pump(&h).await;
    let first_seen = h.domain_repo.all_domains()[0].last_seen_at;

    let second_root = launch(&h, &profile, &["example.com"]).await;
    pump(&h).await;

    // 域名仍然只有一条，last_seen_at 前移
    let domains = h.domain_repo.all_domains();
    assert_eq!(domains.len(), 1);
    assert!(domains[0].last_seen_at > first_seen);

    // 两个顶级任务、两条子任务记录
    assert_eq!(
        h.task_repo.task(first_root).unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(
        h.task_repo.task(second_root).unwrap().status,
        TaskStatus::Completed
    );
    let all_tasks = h.task_repo.all_tasks();
    assert_eq!(
        all_tasks
            .iter()
            .filter(|t| t.workflow_step == "sub")
            .count(),
        2
    );
}

// S6：解析器跳过混入的非JSON行
#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let profile = subfinder_profile();
    let h = harness(profile.clone());
    h.executor.script("subfinder", |_| {
        ScriptedExecutor::stdout(concat!(
            "[WRN] rate limit hit, backing off\n",
            r#"{"host":"ok.example.com","source":"dns"}"#,
            "\n",
            "}}} garbage {{{\n",
            r#"{"host":"also-ok.example.com","source":"crtsh"}"#,
            "\n",
        ))
    });

    let root_id = launch(&h, &profile, &["example.com"]).await;
    pump(&h).await;

    let domains = h.domain_repo.all_domains();
    assert_eq!(domains.len(), 2);
    assert_eq!(
        h.task_repo.task(root_id).unwrap().status,
        TaskStatus::Completed
    );
}

// 扇入后以聚合输入触发线性后继，且只触发一次
#[tokio::test]
async fn test_fan_in_triggers_aggregated_successor_once() {
    let profile = ScanProfileBuilder::new("sub-probe-report")
        .id(1)
        .step(
            WorkflowStepBuilder::new("sub")
                .command_template("subfinder -d {{input}} -json")
                .output_parser("subfinder_json_list")
                .build(),
        )
        .step(
            WorkflowStepBuilder::new("probe")
                .command_template("httpx -u {{input}} -json")
                .input_from("sub")
                .output_parser("httpx_json_list")
                .parallel()
                .build(),
        )
        .step(
            WorkflowStepBuilder::new("report")
                .command_template("reporter {{input}}")
                .input_from("probe")
                .build(),
        )
        .build();
    let h = harness(profile.clone());
    h.executor
        .script("subfinder", |_| ScriptedExecutor::stdout(SUBFINDER_THREE_HOSTS));
    script_httpx(&h);
    h.executor
        .script("reporter", |_| ScriptedExecutor::stdout("report written"));

    let root_id = launch(&h, &profile, &["example.com"]).await;
    pump(&h).await;

    // 聚合后继只运行一次
    let all_tasks = h.task_repo.all_tasks();
    let reports: Vec<_> = all_tasks
        .iter()
        .filter(|t| t.workflow_step == "report")
        .collect();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, TaskStatus::Success);

    // 聚合输入来自三个子任务的输出
    let payload: WorkflowPayload =
        serde_json::from_value(reports[0].payload.clone()).unwrap();
    assert!(!payload.input.is_empty());

    let root = h.task_repo.task(root_id).unwrap();
    assert_eq!(root.status, TaskStatus::Completed);
}

// 连续两个并行步骤：扇入后以同一锚点任务再次扇出
#[tokio::test]
async fn test_chained_parallel_steps_reuse_fan_out_anchor() {
    let profile = ScanProfileBuilder::new("sub-probe-shot")
        .id(1)
        .step(
            WorkflowStepBuilder::new("sub")
                .command_template("subfinder -d {{input}} -json")
                .output_parser("subfinder_json_list")
                .build(),
        )
        .step(
            WorkflowStepBuilder::new("probe")
                .command_template("httpx -u {{input}} -json")
                .input_from("sub")
                .output_parser("httpx_json_list")
                .parallel()
                .build(),
        )
        .step(
            WorkflowStepBuilder::new("shot")
                .command_template("screenshotter {{input}}")
                .input_from("probe")
                .parallel()
                .build(),
        )
        .build();
    let h = harness(profile.clone());
    h.executor
        .script("subfinder", |_| ScriptedExecutor::stdout(SUBFINDER_THREE_HOSTS));
    // httpx 输出带 host 字段，供第二次扇出提取
    h.executor.script("httpx", |argv| {
        let host = argv
            .iter()
            .position(|a| a == "-u")
            .and_then(|i| argv.get(i + 1))
            .cloned()
            .unwrap_or_default();
        ScriptedExecutor::stdout(&format!(
            r#"{{"url":"https://{host}","host":"{host}","a":["10.2.0.1"],"port":"443"}}"#
        ))
    });
    h.executor
        .script("screenshotter", |_| ScriptedExecutor::stdout("saved"));

    let root_id = launch(&h, &profile, &["example.com"]).await;

    // 第一批：sub 执行并扇出三个 probe
    assert_eq!(pump_batch(&h).await, 1);
    let sub_task = h
        .task_repo
        .find_by_parent_and_step(root_id, "sub")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub_task.pending_subtasks, 3);

    // 第二批：三个 probe 完成，扇入后从同一锚点再次扇出三个 shot
    assert_eq!(pump_batch(&h).await, 3);
    let sub_task = h.task_repo.task(sub_task.id).unwrap();
    assert_eq!(sub_task.status, TaskStatus::Success);
    // 第二代扇出重置了锚点任务的计数
    assert_eq!(sub_task.pending_subtasks, 3);

    pump(&h).await;

    // 两代子任务都挂在同一锚点下
    let children = h.task_repo.find_children(sub_task.id).await.unwrap();
    assert_eq!(children.len(), 6);
    let shots: Vec<_> = children
        .iter()
        .filter(|t| t.workflow_step == "shot")
        .collect();
    assert_eq!(shots.len(), 3);
    for shot in &shots {
        assert_eq!(shot.status, TaskStatus::Success);
        let payload: WorkflowPayload = serde_json::from_value(shot.payload.clone()).unwrap();
        assert_eq!(payload.parent_task_id, sub_task.id);
        assert!(!payload.input.is_empty());
    }

    // 第二代扇入后计数归零，根任务完成
    let sub_task = h.task_repo.task(sub_task.id).unwrap();
    assert_eq!(sub_task.pending_subtasks, 0);
    assert_eq!(
        h.task_repo.task(root_id).unwrap().status,
        TaskStatus::Completed
    );
}

// 多个初始输入：全部链条结束后顶级任务才完成
#[tokio::test]
async fn test_multiple_initial_inputs_complete_once() {
    let profile = subfinder_profile();
    let h = harness(profile.clone());
    h.executor.script("subfinder", |argv| {
        let target = argv.get(2).cloned().unwrap_or_default();
        ScriptedExecutor::stdout(&format!(r#"{{"host":"www.{target}","source":"dns"}}"#))
    });

    let root_id = launch(&h, &profile, &["one.com", "two.com", "three.com"]).await;
    pump(&h).await;

    let root = h.task_repo.task(root_id).unwrap();
    assert_eq!(root.status, TaskStatus::Completed);
    assert_eq!(root.pending_subtasks, 0);
    assert_eq!(h.task_repo.find_children(root_id).await.unwrap().len(), 3);
    assert_eq!(h.domain_repo.all_domains().len(), 3);
}

// 未注册的解析器不中断工作流
#[tokio::test]
async fn test_unknown_parser_is_non_fatal() {
    let profile = ScanProfileBuilder::new("unknown-parser")
        .id(1)
        .step(
            WorkflowStepBuilder::new("scan")
                .command_template("scanner {{input}}")
                .output_parser("nuclei_json_list")
                .build(),
        )
        .build();
    let h = harness(profile.clone());
    h.executor
        .script("scanner", |_| ScriptedExecutor::stdout("raw findings"));

    let root_id = launch(&h, &profile, &["example.com"]).await;
    pump(&h).await;

    let root = h.task_repo.task(root_id).unwrap();
    assert_eq!(root.status, TaskStatus::Completed);
    let children = h.task_repo.find_children(root_id).await.unwrap();
    assert_eq!(children[0].status, TaskStatus::Success);
    // 输出按原始文本保存
    assert_eq!(
        h.output_repo.all_outputs()[0].data,
        serde_json::Value::String("raw findings".to_string())
    );
    assert!(h.domain_repo.all_domains().is_empty());
}

// 步骤不存在：消息处理失败且不落任务记录之外的状态
#[tokio::test]
async fn test_unknown_step_fails_before_task_creation() {
    let profile = subfinder_profile();
    let h = harness(profile.clone());

    let payload = WorkflowPayload {
        project_id: 1,
        parent_task_id: 99,
        scan_profile_id: 1,
        current_step_name: "ghost".to_string(),
        input: "example.com".to_string(),
        domain_id: None,
    };
    let message = Message::workflow("discovery:x", &payload).unwrap();
    let err = h.processor.handle(&message).await.unwrap_err();
    assert!(matches!(err, ReconError::StepNotFound { .. }));
    assert!(h.task_repo.all_tasks().is_empty());
}

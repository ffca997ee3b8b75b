//! 测试实体构造器

use chrono::Utc;

use reconflow_domain::entities::{
    ExecutionMode, ScanProfile, Task, TaskStatus, WorkflowStep, TASK_TYPE_WORKFLOW,
};

/// 工作流步骤构造器
pub struct WorkflowStepBuilder {
    step: WorkflowStep,
}

impl WorkflowStepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            step: WorkflowStep {
                name: name.to_string(),
                task_type: format!("test:{name}"),
                command_template: "echo {{input}}".to_string(),
                input_from: "initial".to_string(),
                output_parser_type: String::new(),
                execution_mode: ExecutionMode::Linear,
            },
        }
    }

    pub fn task_type(mut self, task_type: &str) -> Self {
        self.step.task_type = task_type.to_string();
        self
    }

    pub fn command_template(mut self, template: &str) -> Self {
        self.step.command_template = template.to_string();
        self
    }

    pub fn input_from(mut self, input_from: &str) -> Self {
        self.step.input_from = input_from.to_string();
        self
    }

    pub fn output_parser(mut self, parser: &str) -> Self {
        self.step.output_parser_type = parser.to_string();
        self
    }

    pub fn parallel(mut self) -> Self {
        self.step.execution_mode = ExecutionMode::Parallel;
        self
    }

    pub fn build(self) -> WorkflowStep {
        self.step
    }
}

/// 扫描模板构造器
pub struct ScanProfileBuilder {
    profile: ScanProfile,
}

impl ScanProfileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            profile: ScanProfile {
                id: 1,
                name: name.to_string(),
                description: String::new(),
                workflow_steps: Vec::new(),
                is_active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.profile.id = id;
        self
    }

    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.profile.workflow_steps.push(step);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.profile.is_active = false;
        self
    }

    pub fn build(self) -> ScanProfile {
        self.profile
    }
}

/// 任务构造器
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task {
                id: 0,
                project_id: 1,
                scan_profile_id: 1,
                task_type: TASK_TYPE_WORKFLOW.to_string(),
                payload: serde_json::Value::Null,
                queue: "default".to_string(),
                status: TaskStatus::Pending,
                result: String::new(),
                started_at: None,
                finished_at: None,
                parent_task_id: 0,
                workflow_step: String::new(),
                pending_subtasks: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn project_id(mut self, project_id: i64) -> Self {
        self.task.project_id = project_id;
        self
    }

    pub fn scan_profile_id(mut self, scan_profile_id: i64) -> Self {
        self.task.scan_profile_id = scan_profile_id;
        self
    }

    pub fn task_type(mut self, task_type: &str) -> Self {
        self.task.task_type = task_type.to_string();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn parent_task_id(mut self, parent_task_id: i64) -> Self {
        self.task.parent_task_id = parent_task_id;
        self
    }

    pub fn workflow_step(mut self, workflow_step: &str) -> Self {
        self.task.workflow_step = workflow_step.to_string();
        self
    }

    pub fn pending_subtasks(mut self, pending_subtasks: i32) -> Self {
        self.task.pending_subtasks = pending_subtasks;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

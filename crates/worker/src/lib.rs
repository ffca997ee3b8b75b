//! # 工作流处理核心
//!
//! 消费队列任务、执行外部命令、解析输出、触发后继步骤并
//! 维护扇出/扇入状态机。

pub mod executors;
pub mod parser;
pub mod processor;
pub mod service;
pub mod template;

pub use executors::{CommandExecutor, ExecutionOutput, LocalCommandExecutor};
pub use parser::{OutputParser, ParseResult, ParserRegistry};
pub use processor::{TaskHandler, WorkflowProcessor};
pub use service::{WorkerService, WorkerServiceBuilder};
pub use template::render_command;

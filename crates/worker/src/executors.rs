//! 外部命令执行器
//!
//! 在有界超时内执行一条外部命令并捕获输出。超时与生成失败返回
//! 错误；进程正常退出时无论退出码如何都返回输出，由调用方判定。

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use reconflow_errors::{ReconError, ReconResult};

/// 命令执行结果
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ExecutionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stderr 的截断摘要，用于写入任务结果
    pub fn stderr_snippet(&self, max_len: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let trimmed = text.trim();
        if trimmed.len() <= max_len {
            trimmed.to_string()
        } else {
            format!("{}...", &trimmed[..max_len])
        }
    }
}

/// 命令执行器抽象
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// 执行命令，argv 为已拆分的参数列表，不经过 shell
    async fn run(&self, argv: &[String], timeout: Duration) -> ReconResult<ExecutionOutput>;
}

/// 本地进程执行器
pub struct LocalCommandExecutor;

impl LocalCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for LocalCommandExecutor {
    async fn run(&self, argv: &[String], timeout: Duration) -> ReconResult<ExecutionOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ReconError::ExecutionFailed("命令为空".to_string()))?;

        debug!(command = %program, args = ?args, "执行外部命令");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ReconError::ExecutionFailed(format!("启动命令 '{program}' 失败: {e}")))?;

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ReconError::ExecutionFailed("无法获取stdout".to_string()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ReconError::ExecutionFailed("无法获取stderr".to_string()))?;

        let run = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            tokio::try_join!(
                stdout_pipe.read_to_end(&mut stdout),
                stderr_pipe.read_to_end(&mut stderr),
            )
            .map_err(|e| ReconError::ExecutionFailed(format!("读取命令输出失败: {e}")))?;

            let status = child
                .wait()
                .await
                .map_err(|e| ReconError::ExecutionFailed(format!("等待进程结束失败: {e}")))?;

            Ok::<ExecutionOutput, ReconError>(ExecutionOutput {
                stdout,
                stderr,
                exit_code: status.code().unwrap_or(-1),
            })
        };

        tokio::select! {
            result = run => result,
            _ = tokio::time::sleep(timeout) => {
                warn!(command = %program, "命令执行超时，终止进程");
                Err(ReconError::ExecutionTimeout {
                    timeout_seconds: timeout.as_secs(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_stdout_and_exit_code() {
        let executor = LocalCommandExecutor::new();
        let output = executor
            .run(&argv(&["echo", "hello"]), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_returned_not_error() {
        let executor = LocalCommandExecutor::new();
        let output = executor
            .run(&argv(&["sh", "-c", "echo oops >&2; exit 3"]), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr_snippet(100), "oops");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let executor = LocalCommandExecutor::new();
        let result = executor
            .run(&argv(&["sleep", "30"]), Duration::from_millis(200))
            .await;
        assert!(matches!(
            result,
            Err(ReconError::ExecutionTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_fails() {
        let executor = LocalCommandExecutor::new();
        let result = executor
            .run(
                &argv(&["definitely-not-a-real-binary-24601"]),
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(ReconError::ExecutionFailed(_))));
    }

    #[tokio::test]
    async fn test_empty_argv_rejected() {
        let executor = LocalCommandExecutor::new();
        assert!(executor.run(&[], Duration::from_secs(1)).await.is_err());
    }

    #[test]
    fn test_stderr_snippet_truncates() {
        let output = ExecutionOutput {
            stdout: Vec::new(),
            stderr: b"x".repeat(300),
            exit_code: 1,
        };
        let snippet = output.stderr_snippet(64);
        assert_eq!(snippet.len(), 64 + 3);
        assert!(snippet.ends_with("..."));
    }
}

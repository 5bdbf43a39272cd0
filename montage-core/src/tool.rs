use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

/// Seam for invoking external media tools, mockable in tests.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
        command.output().await
    }
}

#[derive(Debug)]
pub enum ToolOutcome {
    Completed(Output),
    Missing,
    TimedOut(Duration),
}

pub async fn run_tool(
    executor: &dyn CommandExecutor,
    command: &mut Command,
    limit: Duration,
) -> std::io::Result<ToolOutcome> {
    command.kill_on_drop(true);
    match timeout(limit, executor.run(command)).await {
        Ok(Ok(output)) => Ok(ToolOutcome::Completed(output)),
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(ToolOutcome::Missing),
        Ok(Err(err)) => Err(err),
        Err(_) => Ok(ToolOutcome::TimedOut(limit)),
    }
}

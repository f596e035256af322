//! Local script executor
//!
//! Runs `<script_ref> <parameters>` through a shell on this host, inside a
//! working directory per environment. Scripts can
//! report progress by printing `::progress <percent> [message]` on stdout;
//! the last stderr line is kept as the failure reason.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;
use crate::gateway::{ExecutionGateway, ExecutionPhase, ExecutionReport, ExecutionRequest};
use crate::models::TaskId;

const PROGRESS_PREFIX: &str = "::progress";

#[derive(Debug, Default, Clone)]
struct ScriptOutput {
    progress: Option<u8>,
    message: Option<String>,
    last_stderr: Option<String>,
}

struct LocalExecution {
    child: Child,
    output: Arc<StdMutex<ScriptOutput>>,
    exit: Option<ExitStatus>,
}

impl LocalExecution {
    fn phase(&self) -> ExecutionPhase {
        match self.exit {
            Some(status) if status.success() => ExecutionPhase::Succeeded,
            Some(_) => ExecutionPhase::Failed,
            None => ExecutionPhase::Running,
        }
    }
}

/// Gateway spawning scripts as child processes
pub struct LocalScriptGateway {
    shell: String,
    work_dir: PathBuf,
    executions: Mutex<HashMap<TaskId, LocalExecution>>,
}

impl LocalScriptGateway {
    pub fn new(shell: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            work_dir: work_dir.into(),
            executions: Mutex::new(HashMap::new()),
        }
    }

    fn environment_dir(&self, request: &ExecutionRequest) -> PathBuf {
        self.work_dir.join(request.environment.id.to_string())
    }

    fn command(&self, request: &ExecutionRequest) -> Command {
        let command_line = if request.parameters.trim().is_empty() {
            request.script_ref.clone()
        } else {
            format!("{} {}", request.script_ref, request.parameters)
        };

        let environment = &request.environment;
        let mut command = Command::new(&self.shell);
        command
            .args(["-c", command_line.as_str()])
            .current_dir(self.environment_dir(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("ROLLOUT_TASK_ID", request.task_id.to_string())
            .env("ROLLOUT_INSTALLATION_ID", request.installation_id.to_string())
            .env("ROLLOUT_ENVIRONMENT", &environment.name)
            .env("ROLLOUT_SERVER_HOST", &environment.server_host);

        if let Some(connection_string) = &environment.connection_string {
            command.env("ROLLOUT_CONNECTION_STRING", connection_string);
        }
        for (key, value) in &environment.config {
            command.env(format!("ROLLOUT_CFG_{}", env_key(key)), value);
        }
        command
    }
}

/// Upper-case a config key and replace anything that is not alphanumeric
fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Parse `::progress <percent> [message]`
fn parse_progress_line(line: &str) -> Option<(u8, Option<String>)> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?.trim_start();
    let (percent, message) = match rest.split_once(char::is_whitespace) {
        Some((percent, message)) => (percent, Some(message.trim().to_string())),
        None => (rest, None),
    };
    let percent: u16 = percent.parse().ok()?;
    Some((percent.min(100) as u8, message.filter(|m| !m.is_empty())))
}

async fn read_stdout<R>(stdout: R, output: Arc<StdMutex<ScriptOutput>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some((progress, message)) = parse_progress_line(&line) {
            let mut output = output.lock().unwrap_or_else(|e| e.into_inner());
            output.progress = Some(progress);
            output.message = message;
        }
    }
}

async fn read_stderr<R>(stderr: R, output: Arc<StdMutex<ScriptOutput>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            let mut output = output.lock().unwrap_or_else(|e| e.into_inner());
            output.last_stderr = Some(line.trim().to_string());
        }
    }
}

#[async_trait]
impl ExecutionGateway for LocalScriptGateway {
    async fn start_execution(&self, request: &ExecutionRequest) -> Result<bool, OrchestratorError> {
        let mut executions = self.executions.lock().await;
        if let Some(existing) = executions.get(&request.task_id) {
            if !existing.phase().is_terminal() {
                warn!("Task {} is already executing", request.task_id);
                return Ok(false);
            }
        }

        tokio::fs::create_dir_all(self.environment_dir(request)).await?;

        info!("Running script for task {}: {}", request.task_id, request.script_ref);
        let mut child = self.command(request).spawn().map_err(|e| {
            OrchestratorError::GatewayError(format!("Failed to spawn {}: {}", self.shell, e))
        })?;

        let output = Arc::new(StdMutex::new(ScriptOutput::default()));
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_stdout(stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_stderr(stderr, output.clone()));
        }

        executions.insert(
            request.task_id,
            LocalExecution {
                child,
                output,
                exit: None,
            },
        );
        Ok(true)
    }

    async fn cancel_execution(&self, task_id: TaskId) -> Result<bool, OrchestratorError> {
        let Some(mut execution) = self.executions.lock().await.remove(&task_id) else {
            return Ok(false);
        };
        if execution.exit.is_none() {
            execution.exit = execution.child.try_wait()?;
        }
        if execution.phase().is_terminal() {
            return Ok(false);
        }

        debug!("Killing script of task {}", task_id);
        // kill() waits for the child, so nothing is left to reap
        execution.child.kill().await?;
        Ok(true)
    }

    async fn poll_status(&self, task_id: TaskId) -> Result<ExecutionReport, OrchestratorError> {
        let mut executions = self.executions.lock().await;
        let Some(execution) = executions.get_mut(&task_id) else {
            return Ok(ExecutionReport::new(ExecutionPhase::Unknown.to_string()));
        };

        if execution.exit.is_none() {
            execution.exit = execution.child.try_wait()?;
        }

        let output = execution
            .output
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let phase = execution.phase();

        let mut report = ExecutionReport::new(phase.to_string());
        report.progress = output.progress;
        report.message = output.message;
        if phase == ExecutionPhase::Failed {
            let code = execution
                .exit
                .and_then(|s| s.code())
                .map(|c| format!("exit code {}", c))
                .unwrap_or_else(|| "terminated by signal".to_string());
            report.error = Some(match output.last_stderr {
                Some(line) => format!("{}: {}", code, line),
                None => code,
            });
        }
        if phase.is_terminal() {
            executions.remove(&task_id);
        }
        Ok(report)
    }
}

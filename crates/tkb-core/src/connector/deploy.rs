//! Registry deployment through the external contract toolchain.

use crate::error::RegistryError;
use crate::shared::DeploySettings;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Marker printed by the registry deploy script before the new address.
const ANNOUNCEMENT_MARKER: &str = "deployed to:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    /// Address announced on the deploy script's output, if any.
    pub announced_address: Option<String>,
}

/// Operator-level maintenance action that (re)deploys the registry contract.
#[async_trait::async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self) -> Result<DeployOutcome, RegistryError>;
}

/// Runs the configured deploy command and streams its output to the log.
pub struct CommandDeployer {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
    running: Mutex<()>,
}

impl CommandDeployer {
    /// `None` when `command` is empty.
    pub fn new(command: &[String], workdir: impl Into<PathBuf>) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            workdir: workdir.into(),
            running: Mutex::new(()),
        })
    }

    pub fn from_settings(settings: &DeploySettings) -> Option<Self> {
        Self::new(&settings.command, &settings.workdir)
    }
}

#[async_trait::async_trait]
impl Deployer for CommandDeployer {
    async fn deploy(&self) -> Result<DeployOutcome, RegistryError> {
        let _running = self.running.try_lock().map_err(|_| RegistryError::DeploymentInProgress)?;
        let run_id = Uuid::new_v4();
        tracing::info!(
            target: "tkb::deploy",
            %run_id,
            program = %self.program,
            workdir = %self.workdir.display(),
            "Starting registry deployment"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(target: "tkb::deploy", %run_id, error = %e, "Deploy command could not be started");
                RegistryError::DeploymentFailed { code: None }
            })?;

        let stdout = child.stdout.take().map(|out| tokio::spawn(stream_lines(out, run_id, "stdout")));
        let stderr = child.stderr.take().map(|err| tokio::spawn(stream_lines(err, run_id, "stderr")));

        let status = child.wait().await.map_err(|e| {
            tracing::error!(target: "tkb::deploy", %run_id, error = %e, "Deploy command could not be awaited");
            RegistryError::DeploymentFailed { code: None }
        })?;

        let mut announced_address = None;
        for task in [stdout, stderr].into_iter().flatten() {
            if let Ok(Some(address)) = task.await {
                announced_address.get_or_insert(address);
            }
        }

        if !status.success() {
            tracing::error!(target: "tkb::deploy", %run_id, code = ?status.code(), "Registry deployment failed");
            return Err(RegistryError::DeploymentFailed { code: status.code() });
        }
        tracing::info!(
            target: "tkb::deploy",
            %run_id,
            address = announced_address.as_deref().unwrap_or("unknown"),
            "Registry deployment finished"
        );
        Ok(DeployOutcome { announced_address })
    }
}

/// Logs each line of `reader` as it arrives; returns the first announced address.
async fn stream_lines<R>(reader: R, run_id: Uuid, stream: &'static str) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut announced = None;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::info!(target: "tkb::deploy", %run_id, stream, "{}", line);
                if announced.is_none() {
                    announced = announced_address(&line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(target: "tkb::deploy", %run_id, stream, error = %e, "Deploy output stream failed");
                break;
            }
        }
    }
    announced
}

/// Address following the deploy script's `deployed to:` marker.
fn announced_address(line: &str) -> Option<String> {
    let lower = line.to_ascii_lowercase();
    let at = lower.find(ANNOUNCEMENT_MARKER)? + ANNOUNCEMENT_MARKER.len();
    line[at..]
        .split_whitespace()
        .next()
        .map(|token| token.trim_end_matches(|c: char| !c.is_ascii_hexdigit()))
        .filter(|token| super::descriptor::is_address(token))
        .map(str::to_string)
}

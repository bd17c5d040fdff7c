//! Command channel between a settings/control surface and the controller
//!
//! Commands arrive as one JSON object per line, tagged by `action`
//! (`{"action":"runNow"}`, `{"action":"stop"}`, `{"action":"getStatus"}`).
//! Every command gets exactly one JSON line back.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::controller::{EngineStatus, LifecycleController, StartOutcome};
use crate::store::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Start a run with the saved settings on the current page
    RunNow,
    Stop,
    GetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResponse {
    Status(EngineStatus),
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl CommandResponse {
    fn ok() -> Self {
        CommandResponse::Ack {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        CommandResponse::Ack {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Execute one command.
///
/// `runNow` reloads the settings file each time, so edits made since the last
/// run apply without a restart.
pub async fn dispatch(
    controller: &LifecycleController,
    store: &SettingsStore,
    command: Command,
) -> CommandResponse {
    match command {
        Command::RunNow => {
            let config = match store.load().and_then(|s| s.run_config()) {
                Ok(config) => config,
                Err(e) => return CommandResponse::failed(e),
            };
            match controller.start(config).await {
                Ok(StartOutcome::Started { run_id }) => {
                    info!(%run_id, "run started on request");
                    CommandResponse::ok()
                }
                Ok(StartOutcome::AlreadyRunning) => CommandResponse::ok(),
                Err(e) => CommandResponse::failed(e),
            }
        }
        Command::Stop => {
            controller.stop().await;
            CommandResponse::ok()
        }
        Command::GetStatus => CommandResponse::Status(controller.status()),
    }
}

/// Serve commands line by line until the reader reaches EOF
pub async fn serve_lines<R, W>(
    reader: R,
    mut writer: W,
    controller: &LifecycleController,
    store: &SettingsStore,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Command>(line) {
            Ok(command) => {
                debug!(?command, "command received");
                dispatch(controller, store, command).await
            }
            Err(e) => {
                warn!(error = %e, "unreadable command");
                CommandResponse::failed(format!("invalid command: {e}"))
            }
        };
        let mut out = serde_json::to_string(&response).map_err(std::io::Error::other)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
    debug!("command input closed");
    Ok(())
}

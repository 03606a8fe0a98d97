//! Line-based document picker for running the bridge from a terminal.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::local::LocalContentHost;
use super::{PickedData, PickerCompletion, PickerRequest};
use crate::selection::SelectionSession;

/// Read stdin on a dedicated thread and forward it line by line.
///
/// A blocking read on the runtime's pool would keep shutdown waiting for the
/// next keystroke; a plain thread is left behind when the process exits.
pub fn spawn_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = thread::Builder::new()
        .name("docbridge-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read terminal input");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start terminal input thread");
    }
    rx
}

/// Plays the host picker UI on a stream of input lines and an output stream.
///
/// Each request prompts for paths, one per line, resolved against the base
/// directory. A blank line or closed input finishes the selection; an empty
/// selection cancels. Picked files are registered with the local host and
/// only their handles are delivered to the session.
pub struct TerminalPicker<W> {
    input: mpsc::UnboundedReceiver<String>,
    output: W,
    base_dir: PathBuf,
    host: Arc<LocalContentHost>,
    session: Arc<SelectionSession>,
}

impl<W> TerminalPicker<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(
        input: mpsc::UnboundedReceiver<String>,
        output: W,
        base_dir: impl Into<PathBuf>,
        host: Arc<LocalContentHost>,
        session: Arc<SelectionSession>,
    ) -> Self {
        Self {
            input,
            output,
            base_dir: base_dir.into(),
            host,
            session,
        }
    }

    /// Answer picker requests until the request channel closes.
    pub async fn run(mut self, mut requests: mpsc::UnboundedReceiver<PickerRequest>) -> io::Result<()> {
        while let Some(request) = requests.recv().await {
            let completion = self.prompt(&request).await?;
            if !self.session.deliver(completion) {
                debug!("Session did not recognize the terminal picker completion");
            }
        }
        Ok(())
    }

    /// Prompt for one selection.
    pub async fn prompt(&mut self, request: &PickerRequest) -> io::Result<PickerCompletion> {
        let header = if request.allow_multiple {
            format!(
                "Select documents under {} (one path per line, blank line to finish):\n",
                self.base_dir.display()
            )
        } else {
            format!(
                "Select a document under {} (blank line to cancel):\n",
                self.base_dir.display()
            )
        };
        self.output.write_all(header.as_bytes()).await?;
        self.output.flush().await?;

        let mut handles = Vec::new();
        while let Some(line) = self.input.recv().await {
            let entry = line.trim();
            if entry.is_empty() {
                break;
            }

            match self.host.register(self.base_dir.join(entry)) {
                Ok(handle) => {
                    handles.push(handle);
                    if !request.allow_multiple {
                        break;
                    }
                }
                Err(e) => {
                    let notice = format!("  skipped {entry}: {e}\n");
                    self.output.write_all(notice.as_bytes()).await?;
                    self.output.flush().await?;
                }
            }
        }

        let code = request.request_code;
        if handles.is_empty() {
            return Ok(PickerCompletion::cancelled(code));
        }

        let data = if request.allow_multiple {
            PickedData::multiple(handles)
        } else {
            PickedData {
                items: None,
                single: handles.into_iter().next(),
            }
        };
        Ok(PickerCompletion::confirmed(code, data))
    }
}

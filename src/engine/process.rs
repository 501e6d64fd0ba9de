//! Launching the search engine and owning its pipes.

use std::{ffi::OsString, path::PathBuf, process::Stdio};

use futures_util::future::BoxFuture;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader},
    process::{Child, Command},
};
use tracing::{info, warn};

use super::{EngineError, protocol::FrameReader};

pub type EngineReader = Box<dyn AsyncRead + Send + Unpin>;
pub type EngineWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open, aligned connection to one engine instance.
///
/// Dropping the channel closes the pipes and kills the child process, which
/// is how a faulted engine is torn down.
pub struct Channel {
    pub reader: FrameReader<EngineReader>,
    pub writer: EngineWriter,
    _child: Option<Child>,
}

impl Channel {
    pub fn new(reader: EngineReader, writer: EngineWriter) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer,
            _child: None,
        }
    }

    /// Tie the child's lifetime to this channel.
    fn with_child(mut self, child: Child) -> Self {
        self._child = Some(child);
        self
    }
}

/// Something that can produce a fresh engine channel, at startup and on
/// every restart.
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self) -> BoxFuture<'_, Result<Channel, EngineError>>;
}

/// Runs `<program> <videos dir> <subtitles dir> <offsets file>` as a child
/// process talking over stdin/stdout.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf, args: Vec<OsString>) -> Self {
        Self { program, args }
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self) -> BoxFuture<'_, Result<Channel, EngineError>> {
        Box::pin(async move {
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    EngineError::Launch(format!("spawn {}: {e}", self.program.display()))
                })?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| EngineError::Launch("engine stdin not piped".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| EngineError::Launch("engine stdout not piped".into()))?;
            if let Some(stderr) = child.stderr.take() {
                forward_stderr(stderr);
            }

            info!(
                "Launched engine {} (pid {})",
                self.program.display(),
                child.id().map_or_else(|| "?".to_string(), |p| p.to_string())
            );

            Ok(Channel::new(Box::new(stdout), Box::new(stdin)).with_child(child))
        })
    }
}

/// The engine reports load problems (bad offsets, unparsable subtitle files)
/// on stderr; surface them in our log.
fn forward_stderr(stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if !line.trim().is_empty() => warn!("[engine] {}", line.trim()),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    warn!("[engine] stderr unreadable: {e}");
                    break;
                }
            }
        }
    });
}

//! Client for the external subtitle search engine.
//!
//! The engine is a single long-lived child process answering one query at a
//! time over its stdin/stdout. Responses carry no correlation id, so the
//! client holds a FIFO lock across "write query, read whole response" and
//! never lets two exchanges interleave.
//!
//! Any error in the middle of an exchange leaves the pipe at an unknown
//! position, so the client moves to `Faulted` and refuses further queries
//! until [`SearchClient::restart`] (or auto-restart) replaces the process.

pub mod process;
pub mod protocol;

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex as SyncMutex;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::models::{EngineStatus, EpisodeResult, WireFormat};

pub use process::{Channel, Launcher, ProcessLauncher};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("protocol desync: {0}")]
    ProtocolDesync(String),

    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),

    #[error("engine busy: no turn within {0:?}")]
    Busy(Duration),

    #[error("engine faulted ({0}); restart required")]
    Faulted(String),

    #[error("failed to launch engine: {0}")]
    Launch(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("engine pipe error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub format: WireFormat,
    /// Bound on a single write+read exchange.
    pub exchange_timeout: Duration,
    /// Bound on waiting for our turn behind other queries.
    pub queue_timeout: Duration,
    /// Relaunch a faulted engine when the next query arrives.
    pub auto_restart: bool,
}

enum Slot {
    Ready(Channel),
    Faulted(String),
}

#[derive(Clone)]
pub struct SearchClient {
    launcher: Arc<dyn Launcher>,
    slot: Arc<Mutex<Slot>>,
    /// Mirror of the slot state readable without queueing behind queries.
    /// `None` while ready, otherwise the fault reason.
    fault: Arc<SyncMutex<Option<String>>>,
    opts: ClientOptions,
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("opts", &self.opts)
            .field("fault", &*self.fault.lock())
            .finish()
    }
}

impl SearchClient {
    /// Launch the engine and return a ready client.
    pub async fn start(
        launcher: Arc<dyn Launcher>,
        opts: ClientOptions,
    ) -> Result<Self, EngineError> {
        let channel = launcher.launch().await?;
        info!("Search engine ready ({} framing)", opts.format);
        Ok(Self {
            launcher,
            slot: Arc::new(Mutex::new(Slot::Ready(channel))),
            fault: Arc::new(SyncMutex::new(None)),
            opts,
        })
    }

    pub fn status(&self) -> EngineStatus {
        let reason = self.fault.lock().clone();
        EngineStatus {
            engine: if reason.is_some() { "faulted" } else { "ready" },
            reason,
            protocol: self.opts.format,
        }
    }

    /// Run one query. Callers are served strictly in arrival order.
    ///
    /// An empty or whitespace-only query returns no results without touching
    /// the engine. A query containing a line break is rejected, since it would
    /// be read by the engine as two queries.
    pub async fn search(&self, query: &str) -> Result<Vec<EpisodeResult>, EngineError> {
        if query.contains(['\n', '\r']) {
            return Err(EngineError::InvalidQuery(
                "query must be a single line".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.acquire().await?;

        let faulted = match &*guard {
            Slot::Faulted(reason) => Some(reason.clone()),
            Slot::Ready(_) => None,
        };
        if let Some(reason) = faulted {
            if !self.opts.auto_restart {
                return Err(EngineError::Faulted(reason));
            }
            warn!("Engine faulted ({reason}), restarting before query");
            self.relaunch(&mut guard).await?;
        }

        // The exchange runs detached from the caller: if the HTTP request is
        // dropped halfway through reading a response, the rest of that
        // response must still be drained or the next caller reads it.
        let query = query.to_string();
        let format = self.opts.format;
        let limit = self.opts.exchange_timeout;
        let fault = Arc::clone(&self.fault);

        let task = tokio::spawn(async move {
            let Slot::Ready(channel) = &mut *guard else {
                return Err(EngineError::Faulted("engine not running".to_string()));
            };

            let err = match tokio::time::timeout(limit, exchange(channel, &query, format)).await
            {
                Ok(Ok(results)) => return Ok(results),
                Ok(Err(e)) => e,
                Err(_) => EngineError::Timeout(limit),
            };

            error!("Engine exchange failed for query {query:?}: {err}");
            let reason = err.to_string();
            // Drops the channel, which kills the child.
            *guard = Slot::Faulted(reason.clone());
            *fault.lock() = Some(reason);
            Err(err)
        });

        task.await
            .map_err(|e| EngineError::Faulted(format!("exchange task aborted: {e}")))?
    }

    /// Replace the engine process with a fresh one, whatever its state.
    ///
    /// Waits behind any in-flight or queued query.
    pub async fn restart(&self) -> Result<(), EngineError> {
        let mut guard = self.slot.clone().lock_owned().await;
        self.relaunch(&mut guard).await
    }

    async fn acquire(&self) -> Result<OwnedMutexGuard<Slot>, EngineError> {
        let wait = self.opts.queue_timeout;
        tokio::time::timeout(wait, self.slot.clone().lock_owned())
            .await
            .map_err(|_| EngineError::Busy(wait))
    }

    async fn relaunch(&self, slot: &mut Slot) -> Result<(), EngineError> {
        // Kill the old process before starting its replacement.
        *slot = Slot::Faulted("restarting".to_string());
        *self.fault.lock() = Some("restarting".to_string());

        match self.launcher.launch().await {
            Ok(channel) => {
                *slot = Slot::Ready(channel);
                *self.fault.lock() = None;
                info!("Search engine restarted");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                error!("Engine restart failed: {reason}");
                *slot = Slot::Faulted(reason.clone());
                *self.fault.lock() = Some(reason);
                Err(e)
            }
        }
    }
}

async fn exchange(
    channel: &mut Channel,
    query: &str,
    format: WireFormat,
) -> Result<Vec<EpisodeResult>, EngineError> {
    protocol::write_query(&mut channel.writer, query).await?;
    protocol::read_response(&mut channel.reader, format).await
}

//! Source control messages
//!
//! The accept loop owns its state; callers steer it through a channel
//! instead of sharing it behind a lock.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::stats::{SourceStats, StatsSnapshot};
use crate::common::{Result, SyslogError};

/// Messages that can be sent to a running source
#[derive(Debug)]
pub enum SourceMessage {
    /// Number of connections currently being served
    ActiveConnections {
        /// Reply channel
        reply: oneshot::Sender<usize>,
    },
    /// Stop accepting, drain connections and exit
    Shutdown {
        /// Signalled once the accept loop has exited
        done: oneshot::Sender<()>,
    },
}

/// Control handle for a running source
#[derive(Debug, Clone)]
pub struct SourceHandle {
    sender: mpsc::Sender<SourceMessage>,
    local_addr: SocketAddr,
    stats: Arc<SourceStats>,
}

impl SourceHandle {
    pub(super) fn new(sender: mpsc::Sender<SourceMessage>, local_addr: SocketAddr, stats: Arc<SourceStats>) -> Self {
        Self {
            sender,
            local_addr,
            stats,
        }
    }

    /// Address the source is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Send a message to the source
    pub async fn send(&self, message: SourceMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| SyslogError::Other("Source is not running".to_string()))
    }

    /// Number of connections currently being served
    pub async fn active_connections(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(SourceMessage::ActiveConnections { reply }).await?;
        rx.await
            .map_err(|_| SyslogError::Other("Source stopped before replying".to_string()))
    }

    /// Stop the source and wait until it has exited
    ///
    /// Connections still open after the configured shutdown timeout are aborted.
    pub async fn shutdown(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(SourceMessage::Shutdown { done }).await?;
        rx.await
            .map_err(|_| SyslogError::Other("Source stopped before acknowledging shutdown".to_string()))
    }
}

/// Create a control channel
pub(super) fn create_channel() -> (mpsc::Sender<SourceMessage>, mpsc::Receiver<SourceMessage>) {
    mpsc::channel(16)
}

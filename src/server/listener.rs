//! Syslog source implementation
//!
//! Accept loop for one listening socket. Each accepted connection runs in its
//! own task; the loop itself only reacts to new sockets, control messages and
//! finished tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use openssl::ssl::SslAcceptor;
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;

use super::handler::handle_connection;
use super::message::{create_channel, SourceHandle, SourceMessage};
use super::stats::SourceStats;
use crate::common::{configure_stream, Result};
use crate::config::SourceConfig;
use crate::detect::{ConnectionInfo, Detector};
use crate::output::FileSink;

/// A bound syslog source, ready to start
pub struct SyslogSource {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<SourceConfig>,
    detector: Arc<Detector>,
    sink: FileSink,
    limiter: Arc<Semaphore>,
    stats: Arc<SourceStats>,
}

impl SyslogSource {
    /// Bind the listening socket
    ///
    /// # Parameters
    ///
    /// * `config` - Validated source configuration
    /// * `acceptor` - TLS acceptor, required by TLS transports and enabling TLS sniffing for `auto`
    /// * `sink` - Output for decoded messages
    pub async fn bind(config: SourceConfig, acceptor: Option<SslAcceptor>, sink: FileSink) -> Result<Self> {
        let detector = Detector::new(&config, acceptor.map(Arc::new))?;

        let listener = TcpListener::bind(config.listen).await?;
        let local_addr = listener.local_addr()?;

        info!(
            "Listening on {} (transport={}, framing={}, max_connections={})",
            local_addr, config.transport, config.framing, config.max_connections
        );
        debug!("Detection plan: {:?}", detector.plan());

        Ok(Self {
            listener,
            local_addr,
            limiter: Arc::new(Semaphore::new(config.max_connections)),
            config: Arc::new(config),
            detector: Arc::new(detector),
            sink,
            stats: Arc::new(SourceStats::default()),
        })
    }

    /// Address the source is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawn the accept loop
    pub fn start(self) -> SourceHandle {
        let (sender, receiver) = create_channel();
        let handle = SourceHandle::new(sender, self.local_addr, Arc::clone(&self.stats));

        tokio::spawn(async move {
            self.run(receiver).await;
        });

        handle
    }

    async fn run(self, mut receiver: mpsc::Receiver<SourceMessage>) {
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut next_id: u64 = 0;

        let shutdown_done = loop {
            select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let permit = match Arc::clone(&self.limiter).try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    SourceStats::incr(&self.stats.connections_rejected);
                                    warn!("Connection from {} rejected: max connections ({}) reached",
                                        peer_addr, self.config.max_connections);
                                    continue;
                                }
                            };

                            configure_stream(&stream);
                            next_id += 1;
                            SourceStats::incr(&self.stats.connections_accepted);

                            let local_addr = stream.local_addr().unwrap_or(self.local_addr);
                            let conn = ConnectionInfo::new(next_id, peer_addr, local_addr);
                            let detector = Arc::clone(&self.detector);
                            let sink = self.sink.clone();
                            let stats = Arc::clone(&self.stats);

                            tasks.spawn(async move {
                                handle_connection(stream, conn, detector, sink, stats).await;
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }

                Some(message) = receiver.recv() => {
                    match message {
                        SourceMessage::ActiveConnections { reply } => {
                            let _ = reply.send(tasks.len());
                        }
                        SourceMessage::Shutdown { done } => {
                            info!("Shutting down source on {}", self.local_addr);
                            break done;
                        }
                    }
                }

                Some(result) = tasks.join_next() => {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!("Connection task panicked: {}", e);
                        }
                    }
                }
            }
        };

        let SyslogSource {
            listener,
            config,
            sink,
            ..
        } = self;
        drop(listener);
        drop(sink);

        drain(&mut tasks, Duration::from_secs(config.shutdown_timeout)).await;

        info!("Source shutdown complete");
        let _ = shutdown_done.send(());
    }
}

/// Wait for live connections, aborting whatever is left after `limit`
async fn drain(tasks: &mut JoinSet<()>, limit: Duration) {
    if tasks.is_empty() {
        return;
    }

    info!("Waiting for {} connections to complete...", tasks.len());
    let finished = timeout(limit, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Connection task error during shutdown: {}", e);
            }
        }
    })
    .await;

    if finished.is_err() {
        warn!("Shutdown timeout reached, aborting {} connections", tasks.len());
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

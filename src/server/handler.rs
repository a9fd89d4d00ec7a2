//! Connection handler
//!
//! Runs detection on one connection and streams its messages to the output.
//! Errors end only this connection.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use super::stats::SourceStats;
use crate::common::{Result, SyslogError};
use crate::detect::{ConnectionInfo, DetectionState, Detector};
use crate::output::{FileSink, LogRecord};

/// Handle a single client connection
///
/// # Parameters
///
/// * `stream` - Accepted connection
/// * `conn` - Connection metadata, filled in as detection proceeds
/// * `detector` - Shared detection settings
/// * `sink` - Output for decoded messages
/// * `stats` - Source counters
pub async fn handle_connection<S>(
    stream: S,
    mut conn: ConnectionInfo,
    detector: Arc<Detector>,
    sink: FileSink,
    stats: Arc<SourceStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started = Instant::now();
    debug!("Connection {} from {} accepted on {}", conn.id, conn.peer_addr, conn.local_addr);

    match serve(stream, &mut conn, &detector, &sink, &stats).await {
        Ok(()) => {
            debug!(
                "Connection {} from {} closed after {} ms ({})",
                conn.id,
                conn.effective_source(),
                started.elapsed().as_millis(),
                conn.framing.map(|m| m.to_string()).unwrap_or_else(|| "no messages".to_string())
            );
        }
        Err(e) => {
            let stage = conn.fail();
            SourceStats::incr(&stats.connections_failed);
            let outcome = if e.is_protocol_error() { "rejected" } else { "failed" };
            warn!(
                "Connection {} from {} {} in {}: {}",
                conn.id, conn.peer_addr, outcome, stage, e
            );
        }
    }

    SourceStats::incr(&stats.connections_closed);
}

async fn serve<S>(
    stream: S,
    conn: &mut ConnectionInfo,
    detector: &Detector,
    sink: &FileSink,
    stats: &SourceStats,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = detector.detect(stream, conn).await?;

    if conn.proxy.is_some() {
        SourceStats::incr(&stats.proxy_headers);
    }
    if conn.tls {
        SourceStats::incr(&stats.tls_sessions);
    }

    let mut next = match timeout(detector.initial_data_timeout(), reader.next_frame()).await {
        Ok(result) => result?,
        Err(_) => return Err(SyslogError::Timeout("waiting for the first message".to_string())),
    };

    while let Some(frame) = next {
        conn.advance(DetectionState::Streaming);
        conn.framing = Some(frame.mode());

        sink.send(LogRecord::from_frame(&frame, conn)).await?;
        SourceStats::incr(&stats.records);

        next = reader.next_frame().await?;
    }

    Ok(())
}

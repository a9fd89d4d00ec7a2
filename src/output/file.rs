//! Append-only file output
//!
//! A single writer task owns the file; connections hand it records through a
//! bounded channel, so records from one connection keep their order.

use std::path::Path;

use log::{debug, error};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::message::LogRecord;
use crate::common::{Result, SyslogError};

/// Records buffered between connections and the writer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sending side of the file output
#[derive(Debug, Clone)]
pub struct FileSink {
    sender: mpsc::Sender<LogRecord>,
}

impl FileSink {
    /// Open `path` for appending and spawn the writer task
    ///
    /// # Returns
    ///
    /// The sink and the writer task; the task finishes once every clone of
    /// the sink is dropped and the remaining records are flushed.
    pub async fn open(path: &Path, capacity: usize) -> Result<(Self, JoinHandle<Result<()>>)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| SyslogError::Config(format!("Cannot open output {}: {}", path.display(), e)))?;

        debug!("Appending records to {}", path.display());

        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let path = path.to_path_buf();
        let writer = tokio::spawn(async move {
            let result = write_records(BufWriter::new(file), receiver).await;
            if let Err(ref e) = result {
                error!("Output writer for {} stopped: {}", path.display(), e);
            }
            result
        });

        Ok((Self { sender }, writer))
    }

    /// Queue a record, waiting while the channel is full
    pub async fn send(&self, record: LogRecord) -> Result<()> {
        self.sender
            .send(record)
            .await
            .map_err(|_| SyslogError::Other("Output writer has stopped".to_string()))
    }
}

async fn write_records<W>(mut writer: W, mut receiver: mpsc::Receiver<LogRecord>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(record) = receiver.recv().await {
        write_record(&mut writer, &record).await?;

        // Flush once the queue drains
        while let Ok(record) = receiver.try_recv() {
            write_record(&mut writer, &record).await?;
        }
        writer.flush().await?;
    }

    writer.flush().await?;
    Ok(())
}

async fn write_record<W>(writer: &mut W, record: &LogRecord) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&record.body).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

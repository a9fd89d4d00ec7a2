//! Syslog Autodetect Command Line Tool
//!
//! This binary runs a single syslog source and writes decoded messages to a file.

use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use syslog_autodetect::common::{init_logger, Result, SyslogError};
use syslog_autodetect::config::{
    log_config, ConfigLoader, ConfigOverrides, ConfigValidator, FramingPolicy, PeerVerify,
    SourceConfig, TransportKind,
};
use syslog_autodetect::output::{FileSink, DEFAULT_CHANNEL_CAPACITY};
use syslog_autodetect::tls::{get_cert_fingerprint, get_cert_subject};
use syslog_autodetect::{create_tls_acceptor, SyslogSource, APP_NAME, VERSION};

/// Syslog TCP source with PROXY protocol, TLS and framing auto-detection
///
/// Settings are read from the configuration file, then from
/// SYSLOG_AUTODETECT_* environment variables, then from these options.
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Transport (tcp, tls, auto, proxied-tcp, proxied-tls, proxied-tls-passthrough)
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Framing policy (auto, auto-once, octet-counted, non-transparent)
    #[arg(long)]
    framing: Option<FramingPolicy>,

    /// Server private key (PEM)
    #[arg(long)]
    tls_key: Option<PathBuf>,

    /// Server certificate chain (PEM)
    #[arg(long)]
    tls_cert: Option<PathBuf>,

    /// CA bundle for verifying peer certificates (PEM)
    #[arg(long)]
    tls_ca: Option<PathBuf>,

    /// Peer verification (none, optional-untrusted, optional-trusted, required-untrusted, required-trusted)
    #[arg(long)]
    peer_verify: Option<PeerVerify>,

    /// Largest accepted message in bytes
    #[arg(long)]
    max_message_size: Option<usize>,

    /// Output file for decoded messages
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen.clone(),
            transport: self.transport,
            framing: self.framing,
            tls_key: self.tls_key.clone(),
            tls_cert: self.tls_cert.clone(),
            tls_ca: self.tls_ca.clone(),
            peer_verify: self.peer_verify,
            max_message_size: self.max_message_size,
            output: self.output.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = SourceConfig::load(args.config_file.as_deref())?.apply_overrides(args.overrides())?;

    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    config.validate()?;
    for warning in config.check_warnings() {
        warn!("{}", warning);
    }
    log_config(&config);

    let uses_tls = config.transport.requires_tls() || config.transport == TransportKind::Auto;
    let acceptor = match config.tls {
        Some(ref tls) if uses_tls => {
            match get_cert_subject(&tls.cert_file) {
                Ok(subject) => info!("Certificate subject: {}", subject),
                Err(e) => warn!("Unable to get certificate subject: {}", e),
            }
            match get_cert_fingerprint(&tls.cert_file) {
                Ok(fingerprint) => info!("Certificate fingerprint: {}", fingerprint),
                Err(e) => warn!("Unable to get certificate fingerprint: {}", e),
            }
            Some(create_tls_acceptor(tls)?)
        }
        _ => None,
    };

    let (sink, writer) = FileSink::open(&config.output, DEFAULT_CHANNEL_CAPACITY).await?;
    info!("Writing messages to {}", config.output.display());

    let source = SyslogSource::bind(config, acceptor, sink).await?;
    let handle = source.start();

    info!("Source ready, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Received Ctrl+C, shutting down");
    handle.shutdown().await?;

    let stats = handle.stats();
    info!(
        "Connections: {} accepted, {} rejected, {} failed; {} PROXY headers, {} TLS sessions, {} messages",
        stats.connections_accepted,
        stats.connections_rejected,
        stats.connections_failed,
        stats.proxy_headers,
        stats.tls_sessions,
        stats.records
    );

    // Every sink clone is gone once the source has stopped
    drop(handle);
    writer
        .await
        .map_err(|e| SyslogError::Other(format!("Output writer task failed: {}", e)))??;

    Ok(())
}

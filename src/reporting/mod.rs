//! Downstream reporting path: delivers tick snapshots to a sender, either
//! directly or through a time-window buffer.

mod buffer;
mod cadence;
mod ticker;

pub use buffer::TickSnapshotBuffer;
pub use cadence::{FlushState, Topology, select_topology};
pub use ticker::spawn_ticker;

use async_trait::async_trait;
use config::Config;
use log::info;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{MetricsError, Result};
use crate::snapshot::TickSnapshot;

/// Remote collector settings, read from the `reporting` section
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ReporterSettings {
    /// Collector host
    pub hostname: String,
    /// Collector port
    pub port: u16,
    /// Largest outbound packet in bytes
    pub max_packet_size: usize,
    /// How often accumulated snapshots are forwarded
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl ReporterSettings {
    /// Read and validate the `reporting` section
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings: ReporterSettings = config
            .get("reporting")
            .map_err(|e| MetricsError::config_key("reporting", e))?;

        if settings.max_packet_size == 0 {
            return Err(MetricsError::config_key(
                "reporting.max-packet-size",
                "must be greater than zero",
            ));
        }
        if settings.flush_interval.is_zero() {
            return Err(MetricsError::config_key(
                "reporting.flush-interval",
                "must be greater than zero",
            ));
        }

        Ok(settings)
    }

    /// `host:port` of the remote collector
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Final hop of the reporting path. Encoding and transport live behind it.
#[async_trait]
pub trait SnapshotSender: Send + Sync + 'static {
    /// Forward one snapshot
    async fn send(&self, snapshot: TickSnapshot) -> Result<()>;

    /// Get the sender name
    fn name(&self) -> &str;
}

/// Sender that hands snapshots to a channel
pub struct ChannelSender {
    name: String,
    tx: mpsc::Sender<TickSnapshot>,
}

impl ChannelSender {
    pub fn new(name: impl Into<String>, tx: mpsc::Sender<TickSnapshot>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }

    /// Create a sender together with the receiving end of its channel
    pub fn channel(
        name: impl Into<String>,
        buffer_size: usize,
    ) -> (Self, mpsc::Receiver<TickSnapshot>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (Self::new(name, tx), rx)
    }
}

#[async_trait]
impl SnapshotSender for ChannelSender {
    async fn send(&self, snapshot: TickSnapshot) -> Result<()> {
        self.tx
            .send(snapshot)
            .await
            .map_err(|_| MetricsError::Send(format!("{}: receiver closed", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sender that writes a JSON summary of each snapshot to the log
pub struct LogSender {
    name: String,
}

impl LogSender {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl SnapshotSender for LogSender {
    async fn send(&self, snapshot: TickSnapshot) -> Result<()> {
        info!("[{}] {}", self.name, snapshot.to_json());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::{MetricsError, Result};
use crate::reporting::{SnapshotSender, TickSnapshotBuffer};
use crate::snapshot::TickSnapshot;

/// How tick snapshots reach the sender
pub enum Topology {
    /// Every tick snapshot goes straight to the sender
    Direct(Arc<dyn SnapshotSender>),
    /// Tick snapshots are merged and sent once per flush interval
    Buffered {
        buffer: Arc<TickSnapshotBuffer>,
        sender: Arc<dyn SnapshotSender>,
        state: Arc<RwLock<FlushState>>,
    },
}

/// Lifecycle of a buffered topology's flush task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    NotStarted,
    Running,
    Stopped,
}

/// Pick the forwarding topology for the given tick and flush intervals.
///
/// A flush interval shorter than the tick interval is a configuration error.
pub fn select_topology(
    tick_interval: Duration,
    flush_interval: Duration,
    sender: Arc<dyn SnapshotSender>,
) -> Result<Topology> {
    if flush_interval < tick_interval {
        return Err(MetricsError::Config(format!(
            "flush interval {:?} cannot be shorter than the tick interval {:?}",
            flush_interval, tick_interval
        )));
    }

    if flush_interval == tick_interval {
        info!(
            "Forwarding snapshots directly to '{}' every {:?}",
            sender.name(),
            tick_interval
        );
        return Ok(Topology::Direct(sender));
    }

    info!(
        "Buffering {:?} ticks into {:?} windows for '{}'",
        tick_interval,
        flush_interval,
        sender.name()
    );
    Ok(Topology::Buffered {
        buffer: Arc::new(TickSnapshotBuffer::new(flush_interval)),
        sender,
        state: Arc::new(RwLock::new(FlushState::NotStarted)),
    })
}

impl Topology {
    /// Whether ticks are merged into flush windows
    pub fn is_buffered(&self) -> bool {
        matches!(self, Topology::Buffered { .. })
    }

    /// Flush window of the buffered topology
    pub fn flush_interval(&self) -> Option<Duration> {
        match self {
            Topology::Direct(_) => None,
            Topology::Buffered { buffer, .. } => Some(buffer.interval()),
        }
    }

    /// Hand over one tick snapshot.
    ///
    /// A buffered topology refuses snapshots once it has been shut down,
    /// since nothing would flush them any more.
    pub async fn deliver(&self, snapshot: TickSnapshot) -> Result<()> {
        match self {
            Topology::Direct(sender) => sender.send(snapshot).await,
            Topology::Buffered { buffer, sender, state } => {
                let state = state.read().await;
                if *state == FlushState::Stopped {
                    return Err(MetricsError::Send(format!(
                        "topology for '{}' is shut down",
                        sender.name()
                    )));
                }
                buffer.add(snapshot)
            }
        }
    }

    /// Start the flush task of a buffered topology.
    ///
    /// Returns `None` for direct topologies, which have nothing to run, and
    /// when the flush task was already started or the topology shut down.
    pub async fn start(&self) -> Option<JoinHandle<()>> {
        let Topology::Buffered {
            buffer,
            sender,
            state,
        } = self
        else {
            return None;
        };

        {
            let mut current = state.write().await;
            if *current != FlushState::NotStarted {
                debug!(
                    "Flush task for '{}' not started, state is {:?}",
                    sender.name(),
                    *current
                );
                return None;
            }
            *current = FlushState::Running;
        }

        let buffer = Arc::clone(buffer);
        let sender = Arc::clone(sender);
        let state = Arc::clone(state);

        Some(tokio::spawn(async move {
            let period = buffer.interval();
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);

            loop {
                interval.tick().await;
                if *state.read().await != FlushState::Running {
                    break;
                }

                match buffer.flush() {
                    Ok(Some(snapshot)) => {
                        if let Err(e) = sender.send(snapshot).await {
                            error!("Error sending snapshot to '{}': {}", sender.name(), e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!("Error flushing snapshot buffer: {}", e),
                }
            }
            debug!("Flush task for '{}' stopped", sender.name());
        }))
    }

    /// Stop flushing and send whatever the current window holds.
    ///
    /// Later deliveries are rejected, so the drained window is the last one.
    pub async fn shutdown(&self) -> Result<()> {
        let Topology::Buffered {
            buffer,
            sender,
            state,
        } = self
        else {
            return Ok(());
        };

        *state.write().await = FlushState::Stopped;

        match buffer.flush()? {
            Some(snapshot) => {
                debug!("Draining partial window to '{}'", sender.name());
                sender.send(snapshot).await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{InstrumentIdentity, MeasurementUnit};
    use crate::reporting::ChannelSender;
    use crate::snapshot::MetricValue;
    use chrono::Utc;

    fn counter_tick(count: u64) -> TickSnapshot {
        let now = Utc::now();
        let mut snapshot = TickSnapshot::new(now, now);
        snapshot
            .insert(
                InstrumentIdentity::new("ticks"),
                MeasurementUnit::None,
                MetricValue::Counter(count),
            )
            .unwrap();
        snapshot
    }

    fn sender() -> (Arc<dyn SnapshotSender>, tokio::sync::mpsc::Receiver<TickSnapshot>) {
        let (sender, rx) = ChannelSender::channel("test", 16);
        (Arc::new(sender), rx)
    }

    #[test]
    fn test_equal_intervals_select_direct() {
        let (sender, _rx) = sender();
        let topology =
            select_topology(Duration::from_millis(1000), Duration::from_millis(1000), sender)
                .unwrap();
        assert!(!topology.is_buffered());
        assert_eq!(topology.flush_interval(), None);
    }

    #[test]
    fn test_longer_flush_selects_buffered() {
        let (sender, _rx) = sender();
        let topology =
            select_topology(Duration::from_millis(1000), Duration::from_millis(5000), sender)
                .unwrap();
        assert!(topology.is_buffered());
        assert_eq!(topology.flush_interval(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_shorter_flush_is_a_config_error() {
        let (sender, _rx) = sender();
        let result =
            select_topology(Duration::from_millis(5000), Duration::from_millis(1000), sender);
        assert!(matches!(result, Err(MetricsError::Config(_))));
    }

    #[tokio::test]
    async fn test_direct_forwards_each_tick() {
        let (sender, mut rx) = sender();
        let topology = select_topology(Duration::from_secs(1), Duration::from_secs(1), sender).unwrap();
        assert!(topology.start().await.is_none());

        topology.deliver(counter_tick(1)).await.unwrap();
        topology.deliver(counter_tick(2)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().len(), 1);
        assert_eq!(rx.recv().await.unwrap().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_buffered_flushes_merged_window() {
        let (sender, mut rx) = sender();
        let topology = select_topology(
            Duration::from_millis(10),
            Duration::from_millis(50),
            sender,
        )
        .unwrap();

        topology.deliver(counter_tick(1)).await.unwrap();
        topology.deliver(counter_tick(2)).await.unwrap();
        topology.deliver(counter_tick(3)).await.unwrap();
        assert!(rx.try_recv().is_err());

        let handle = topology.start().await.unwrap();
        let merged = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            merged.get(&InstrumentIdentity::new("ticks")),
            Some(MetricValue::Counter(6))
        ));

        topology.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_partial_window() {
        let (sender, mut rx) = sender();
        let topology =
            select_topology(Duration::from_secs(1), Duration::from_secs(60), sender).unwrap();

        topology.deliver(counter_tick(4)).await.unwrap();
        topology.shutdown().await.unwrap();

        let drained = rx.recv().await.unwrap();
        assert!(matches!(
            drained.get(&InstrumentIdentity::new("ticks")),
            Some(MetricValue::Counter(4))
        ));

        topology.shutdown().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_after_shutdown_is_rejected() {
        let (sender, mut rx) = sender();
        let topology =
            select_topology(Duration::from_secs(1), Duration::from_secs(60), sender).unwrap();

        topology.shutdown().await.unwrap();
        let result = topology.deliver(counter_tick(5)).await;
        assert!(matches!(result, Err(MetricsError::Send(_))));

        topology.shutdown().await.unwrap();
        assert!(rx.try_recv().is_err());
        assert!(topology.start().await.is_none());
    }

    #[tokio::test]
    async fn test_second_start_does_not_spawn_another_flush_task() {
        let (sender, mut rx) = sender();
        let topology = select_topology(
            Duration::from_millis(10),
            Duration::from_millis(40),
            sender,
        )
        .unwrap();

        let handle = topology.start().await.unwrap();
        assert!(topology.start().await.is_none());

        topology.deliver(counter_tick(2)).await.unwrap();
        let flushed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            flushed.get(&InstrumentIdentity::new("ticks")),
            Some(MetricValue::Counter(2))
        ));

        topology.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

use chrono::Utc;
use log::{error, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::instrument::Instrument;
use crate::reporting::Topology;
use crate::snapshot::TickSnapshot;

/// Collect a snapshot from every instrument once per tick and deliver it
/// through the topology.
///
/// Failed collections or deliveries are logged and the ticker keeps going.
pub fn spawn_ticker(
    instruments: Vec<Arc<dyn Instrument>>,
    tick_interval: Duration,
    topology: Arc<Topology>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + tick_interval, tick_interval);
        let mut last_tick = Utc::now();

        loop {
            interval.tick().await;
            let now = Utc::now();

            let snapshot = TickSnapshot::collect(last_tick, now, &instruments);
            trace!("Collected tick snapshot with {} metric(s)", snapshot.len());
            if let Err(e) = topology.deliver(snapshot).await {
                error!("Error delivering tick snapshot: {}", e);
            }
            last_tick = now;
        }
    })
}

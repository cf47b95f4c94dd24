use log::{debug, trace};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{MetricsError, Result};
use crate::snapshot::TickSnapshot;

/// Accumulates tick snapshots for one flush window.
///
/// Written by the tick-driven collector and drained by the flush timer; a
/// single mutex guards the accumulator.
pub struct TickSnapshotBuffer {
    /// Merged snapshot for the current window, `None` when nothing arrived
    accumulator: Mutex<Option<TickSnapshot>>,

    /// Length of a flush window
    interval: Duration,
}

impl TickSnapshotBuffer {
    pub fn new(interval: Duration) -> Self {
        Self {
            accumulator: Mutex::new(None),
            interval,
        }
    }

    /// Merge a snapshot into the current window
    pub fn add(&self, snapshot: TickSnapshot) -> Result<()> {
        let mut accumulator = self
            .accumulator
            .lock()
            .map_err(|_| MetricsError::Other("Lock poisoned".to_string()))?;

        trace!(
            "Buffering snapshot with {} metric(s) for window {:?}",
            snapshot.len(),
            self.interval
        );

        match accumulator.as_mut() {
            Some(merged) => merged.merge(snapshot),
            None => *accumulator = Some(snapshot),
        }
        Ok(())
    }

    /// Take the merged snapshot for the window and start a new one
    pub fn flush(&self) -> Result<Option<TickSnapshot>> {
        let mut accumulator = self
            .accumulator
            .lock()
            .map_err(|_| MetricsError::Other("Lock poisoned".to_string()))?;

        let merged = accumulator.take();
        if let Some(snapshot) = &merged {
            debug!(
                "Flushing {} buffered metric(s) from {} to {}",
                snapshot.len(),
                snapshot.from,
                snapshot.to
            );
        }
        Ok(merged)
    }

    /// Whether the current window holds nothing
    pub fn is_empty(&self) -> Result<bool> {
        let accumulator = self
            .accumulator
            .lock()
            .map_err(|_| MetricsError::Other("Lock poisoned".to_string()))?;
        Ok(accumulator.is_none())
    }

    /// Flush window length
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

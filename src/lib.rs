//! Instrument construction and reporting cadence for metric-collecting agents

pub mod config;
pub mod error;
pub mod factory;
pub mod instrument;
pub mod range;
#[cfg(feature = "reporting")]
pub mod reporting;
pub mod snapshot;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::config::{ConfigBuilder, LogLevel};
    pub use crate::error::{MetricsError, Result};
    pub use crate::factory::{InstrumentFactory, InstrumentFactoryConfig};
    pub use crate::instrument::{
        Counter, Gauge, Histogram, Instrument, InstrumentIdentity, MeasurementUnit, RangeSampler,
    };
    pub use crate::range::{CustomInstrumentSettings, DynamicRange};
    #[cfg(feature = "reporting")]
    pub use crate::reporting::{
        ReporterSettings, SnapshotSender, Topology, select_topology, spawn_ticker,
    };
    pub use crate::snapshot::{MetricValue, TickSnapshot};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Engine observability.

mod metrics;

pub use metrics::{CounterVec, EngineMetrics};

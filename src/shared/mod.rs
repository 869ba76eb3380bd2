/// Shared utilities used across all layers
///
/// - `logging`: tracing subscriber initialisation
/// - `metrics`: Prometheus counters, histograms and gauges

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::METRICS;

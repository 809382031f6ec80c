pub mod executor;
pub mod host_metrics;
pub mod procfs;
pub mod stats_collector;

pub use executor::{launch_detached, run_shell};
pub use host_metrics::{collect_host_metrics, HostMetrics};
pub use procfs::ProcFs;
pub use stats_collector::{SamplingWindow, StatsCollector};

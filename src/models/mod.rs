pub mod process;
pub mod request;
pub mod stats;

pub use process::{load_groups, ProcessGroup};
pub use request::{Command, CommandBatch, CommandList};
pub use stats::{ProcStatsReport, ProcessRecord};

pub mod step_stats;

pub use step_stats::*;

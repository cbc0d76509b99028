//! Background Tasks Module
//!
//! Periodic maintenance running on independent tokio timers: the cache
//! sweep, the system metrics sampler, and the metrics buffer cleanup.
//! Every task body is idempotent, so a run overlapping a slow store is
//! harmless; ticks that land mid-run are delayed rather than stacked.

mod cleanup;
mod sampler;

pub use cleanup::spawn_cache_sweep_task;
pub use sampler::{spawn_metrics_cleanup_task, spawn_system_sampler_task};

//! Pipeline orchestration: the durable run loop, per-stage child
//! processes with bounded log capture, and the coordinate backfill that
//! closes every run.

pub mod backfill;
pub mod geocode;
pub mod locations;
pub mod log_tail;
pub mod orchestrator;
pub mod stages;

pub use backfill::{BackfillSettings, BackfillStats, CoordinateBackfill};
pub use geocode::{Geocoder, HttpGeocoder};
pub use log_tail::LogTail;
pub use orchestrator::Orchestrator;

//! Storage gateway: every other crate reaches Postgres and the object
//! store through this one. Typed CRUD, chunked UPSERTs resolved by the
//! schema's uniqueness keys, a process-wide request-rate ceiling, bounded
//! retries, and S3-compatible bucket access.

pub mod actors;
pub mod coordinates;
pub mod db;
pub mod error;
pub mod events;
pub mod object_store;
pub mod posts;
pub mod rate_limit;
pub mod retry;
pub mod rows;
pub mod runs;
pub mod slugs;

pub use db::Db;
pub use error::{Result, StoreError};
pub use object_store::ObjectStore;
pub use rows::EventUpsertOutcome;

/// Maximum rows per batch UPSERT call.
pub const UPSERT_CHUNK: usize = 1_000;

/// Maximum IDs per IN-list / bulk UPDATE call, bounded by URL-length
/// limits on hosted Postgres gateways.
pub const UPDATE_ID_CHUNK: usize = 100;

/// Maximum IDs per duplicate-existence lookup.
pub const EXISTENCE_CHUNK: usize = 50;

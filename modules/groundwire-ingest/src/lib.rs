//! Ingestion: raw scrape files → canonical posts, unknown-actor discovery,
//! post↔actor edges, and archived media downloads.

pub mod ingestor;
pub mod instagram;
pub mod media;
pub mod normalizer;
pub mod twitter;
pub mod unknown;

pub use ingestor::{IngestStats, Ingestor};
pub use media::{MediaFetcher, MediaStats};
pub use normalizer::RawPost;

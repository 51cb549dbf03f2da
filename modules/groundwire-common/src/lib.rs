pub mod cancel;
pub mod config;
pub mod error;
pub mod text;
pub mod types;

pub use cancel::CancelFlag;
pub use config::Config;
pub use error::GroundwireError;
pub use types::*;

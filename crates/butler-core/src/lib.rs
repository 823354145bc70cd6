pub mod config;
pub mod error;
pub mod types;

pub use config::ButlerConfig;
pub use error::{ButlerError, Result};
pub use types::*;

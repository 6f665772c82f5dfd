pub mod config;
pub mod error;
pub mod output;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{FerryError, Result};
pub use output::{OutputEvent, OutputSink};
pub use types::*;

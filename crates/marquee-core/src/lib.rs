pub mod config;
pub mod error;
pub mod schema;
pub mod types;

pub use config::{MarqueeConfig, SearchMode};
pub use error::{MarqueeError, Result};
pub use schema::Schema;
pub use types::*;

//! Marquee API crate - axum HTTP server and route handlers.
//!
//! Serves title autocomplete, hybrid movie search, and the genre list.
//! Query endpoints answer 503 until the readiness tracker reports the
//! catalog as indexed; `/health` is always available.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

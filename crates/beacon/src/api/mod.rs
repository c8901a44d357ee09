//! HTTP API module.
//!
//! Router construction, shared state, and unified error responses.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;

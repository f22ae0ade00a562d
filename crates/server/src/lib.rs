//! HTTP layer for the search service

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;

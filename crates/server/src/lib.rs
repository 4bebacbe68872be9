//! HTTP service for coffer.
//!
//! Issuers register resources (ordered lists of stored files) and request
//! single-use download links; a link holder redeems the link once and
//! receives the resource as a ZIP archive streamed straight from storage.

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod tokens;

pub use auth::TraceId;
pub use bootstrap::IssuerKeys;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use tokens::{TokenError, TokenManager};

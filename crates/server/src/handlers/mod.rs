//! HTTP request handlers.

pub mod downloads;
pub mod health;
pub mod resources;

pub use downloads::*;
pub use health::*;
pub use resources::*;

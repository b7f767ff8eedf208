//! Shared types for the fulfillment workspace

pub mod error;
pub mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

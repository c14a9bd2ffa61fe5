//! # API Shared
//!
//! Shared definitions for the HMS APIs.
//!
//! Contains:
//! - JSON request and response messages (`messages` module), documented for OpenAPI
//! - Shared services like `HealthService`
//!
//! Dates travel as ISO `YYYY-MM-DD` strings; handlers parse and validate them.

pub mod health;
pub mod messages;

pub use health::HealthService;
pub use messages::*;

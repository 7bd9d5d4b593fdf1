//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod github;
pub mod site;
pub mod source;
pub mod telemetry;

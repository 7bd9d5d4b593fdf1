//! Application services: the initialization run and its collaborators.

pub mod authority;
pub mod error;
pub mod init;
pub mod report;

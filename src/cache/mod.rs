//! Initialization cache
//!
//! A JSON snapshot of ids whose discussion thread is known to exist, so
//! repeated runs can skip the GitHub existence query:
//!
//! ```json
//! [
//!   { "id": "/2024/01/01/hello/" }
//! ]
//! ```
//!
//! The snapshot is read from the local cache file, or from a remote copy
//! (typically the one published with the static site) when the local file is
//! absent. It is rewritten in full at the end of every run.

mod store;

pub use store::{CacheEntry, CacheError, CacheOrigin, CacheStatus, InitCache};

//! Domain layer: post records, permalinks and thread identifiers.

pub mod identifier;
pub mod permalink;
pub mod posts;

//! Commit a set of offsets for a consumer group.

pub mod request;
pub mod response;

//! Fetch the committed offsets of a consumer group.

pub mod request;
pub mod response;

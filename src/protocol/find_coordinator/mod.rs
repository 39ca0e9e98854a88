//! Locate the broker acting as coordinator of a consumer group.

pub mod request;
pub mod response;

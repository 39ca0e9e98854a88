//! Directly depart a group.

pub mod request;
pub mod response;

//! Describe the state and members of groups.

pub mod request;
pub mod response;

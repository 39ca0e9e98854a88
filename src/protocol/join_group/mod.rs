//! Become a member of a group, creating it if there are no active members.

pub mod request;
pub mod response;

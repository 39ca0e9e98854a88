//! Synchronize state for all members of a group (e.g. distribute partition assignments to consumers).

pub mod request;
pub mod response;

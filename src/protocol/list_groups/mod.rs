//! List the groups managed by a broker.

pub mod request;
pub mod response;

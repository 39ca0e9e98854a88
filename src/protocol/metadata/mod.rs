//! Describes the currently available brokers, their host and port
//! information, and gives information about which broker hosts
//! which partitions.
//!
//! This API answers the following questions:
//! - What topics exist?
//! - How many partitions does each topic have?
//! - Which broker is currently the leader for each partition?
//! - What is the host and port for each of these brokers?
//! This is the only request that can be addressed to any broker
//! in the cluster.
//!
//! Since there may be many topics the client can give an
//! optional list of topic names in order to only return metadata
//! for a subset of topics.
//!
//! The metadata returned is at the partition level, but grouped
//!  together by topic for convenience and to avoid redundancy.
//! For each partition the metadata contains the information for
//! the leader as well as for all the replicas and the list of
//! replicas that are currently in-sync.

pub mod request;
pub mod response;

//! Encoding and creation for Fetch requests.
//!
//! ### Example
//! ```rust,ignore
//! let mut req = protocol::FetchRequest::new(max_wait_ms, min_bytes);
//! req.add("purchases", 0, offset, max_bytes);
//! let response = transport.submit(&leader, req.into()).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! Fetch Request (Version: 0) => replica_id max_wait_ms min_bytes [topics]
//!   replica_id => INT32
//!   max_wait_ms => INT32
//!   min_bytes => INT32
//!   topics => topic [partitions]
//!     topic => STRING
//!     partitions => partition fetch_offset partition_max_bytes
//!       partition => INT32
//!       fetch_offset => INT64
//!       partition_max_bytes => INT32
//! ```
//!
//! Note we are using version 0 of the request.

use bytes::BufMut;
use nom::{
    number::complete::{be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::{encode::ToByte, error::Result, parser};

/// Replica id used by ordinary consumers.
pub const CONSUMER_REPLICA_ID: i32 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// The broker ID of the follower, of -1 if this request is from a consumer.
    pub replica: i32,
    /// The maximum time in milliseconds to wait for the response.
    pub max_wait_ms: i32,
    /// The minimum bytes to accumulate in the response.
    pub min_bytes: i32,
    /// The topics to fetch.
    pub topics: Vec<TopicPartition>,
}

/// The topics to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicPartition {
    /// The name of the topic to fetch.
    pub topic_name: String,
    /// The partitions to fetch.
    pub partitions: Vec<Partition>,
}

/// The partitions to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The message offset.
    pub offset: i64,
    /// The maximum bytes to fetch from this partition.
    pub max_bytes: i32,
}

impl FetchRequest {
    pub fn new(max_wait_ms: i32, min_bytes: i32) -> FetchRequest {
        FetchRequest {
            replica: CONSUMER_REPLICA_ID,
            max_wait_ms,
            min_bytes,
            topics: vec![],
        }
    }

    /// Ask for `topic_name`/`partition_index` starting at `offset`. A
    /// partition already present keeps its first offset.
    pub fn add(&mut self, topic_name: &str, partition_index: i32, offset: i64, max_bytes: i32) {
        let partition = Partition {
            partition_index,
            offset,
            max_bytes,
        };
        match self
            .topics
            .iter_mut()
            .find(|topic| topic.topic_name == topic_name)
        {
            None => self.topics.push(TopicPartition {
                topic_name: topic_name.to_owned(),
                partitions: vec![partition],
            }),
            Some(topic) => {
                if !topic
                    .partitions
                    .iter()
                    .any(|p| p.partition_index == partition_index)
                {
                    topic.partitions.push(partition)
                }
            }
        }
    }
}

impl ToByte for FetchRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding FetchRequest {:?}", self);
        self.replica.encode(buffer)?;
        self.max_wait_ms.encode(buffer)?;
        self.min_bytes.encode(buffer)?;
        self.topics.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for TopicPartition {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.topic_name.encode(buffer)?;
        self.partitions.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Partition {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.partition_index.encode(buffer)?;
        self.offset.encode(buffer)?;
        self.max_bytes.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_fetch_request(s: NomBytes) -> IResult<NomBytes, FetchRequest> {
    let (s, replica) = be_i32(s)?;
    let (s, max_wait_ms) = be_i32(s)?;
    let (s, min_bytes) = be_i32(s)?;
    let (s, topics) = parser::parse_array(parse_topic_partition)(s)?;

    Ok((
        s,
        FetchRequest {
            replica,
            max_wait_ms,
            min_bytes,
            topics,
        },
    ))
}

fn parse_topic_partition(s: NomBytes) -> IResult<NomBytes, TopicPartition> {
    let (s, topic_name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;
    Ok((
        s,
        TopicPartition {
            topic_name,
            partitions,
        },
    ))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, partition_index) = be_i32(s)?;
    let (s, offset) = be_i64(s)?;
    let (s, max_bytes) = be_i32(s)?;
    Ok((
        s,
        Partition {
            partition_index,
            offset,
            max_bytes,
        },
    ))
}

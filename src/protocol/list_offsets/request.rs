//! Encoding and creation for List Offsets requests.
//!
//! Used to ask for all messages before a certain time (ms). There are two special values. Specify -1 to receive the latest offset (i.e. the offset of the next coming message) and -2 to receive the earliest available offset. Note that because offsets are pulled in descending order, asking for the earliest offset will always return you a single element.
//!
//! ### Example
//! ```rust,ignore
//! let mut req = protocol::ListOffsetsRequest::new();
//! req.add("purchases", 0, OffsetTime::Earliest, 1);
//! let response = transport.submit(&leader, req.into()).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! Offsets Request (Version: 0) => replica_id [topics]
//!   replica_id => INT32
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index timestamp max_num_offsets
//!       partition_index => INT32
//!       timestamp => INT64
//!       max_num_offsets => INT32
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

/// The special timestamps understood by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetTime {
    /// The offset of the next message to be written.
    Latest,
    /// The oldest offset still retained.
    Earliest,
    /// Offsets of segments written before this many ms since the epoch.
    Before(i64),
}

impl From<OffsetTime> for i64 {
    fn from(time: OffsetTime) -> Self {
        match time {
            OffsetTime::Latest => -1,
            OffsetTime::Earliest => -2,
            OffsetTime::Before(ms) => ms,
        }
    }
}

/// The base List Offsets request object.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOffsetsRequest {
    /// The broker ID of the requester, or -1 if this request is being made by a normal consumer.
    pub replica_id: i32,
    /// Each topic in the request.
    pub topics: Vec<Topic>,
}

/// Each topic in the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name.
    pub name: String,
    /// Each partition in the request.
    pub partitions: Vec<Partition>,
}

/// Each partition in the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The current timestamp.
    pub timestamp: i64,
    pub max_num_offsets: i32,
}

impl Default for ListOffsetsRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl ListOffsetsRequest {
    pub fn new() -> Self {
        Self {
            replica_id: -1,
            topics: vec![],
        }
    }

    pub fn add(&mut self, topic: &str, partition_index: i32, time: OffsetTime, max_num_offsets: i32) {
        let partition = Partition {
            partition_index,
            timestamp: time.into(),
            max_num_offsets,
        };
        match self.topics.iter_mut().find(|t| t.name == topic) {
            Some(t) => t.partitions.push(partition),
            None => self.topics.push(Topic {
                name: topic.to_owned(),
                partitions: vec![partition],
            }),
        }
    }
}

impl ToByte for ListOffsetsRequest {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding ListOffsetsRequest {:?}", self);
        self.replica_id.encode(buffer)?;
        self.topics.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Topic {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.name.encode(buffer)?;
        self.partitions.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Partition {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.partition_index.encode(buffer)?;
        self.timestamp.encode(buffer)?;
        self.max_num_offsets.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_list_offsets_request(s: NomBytes) -> IResult<NomBytes, ListOffsetsRequest> {
    let (s, replica_id) = be_i32(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;
    Ok((s, ListOffsetsRequest { replica_id, topics }))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;
    Ok((s, Topic { name, partitions }))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, partition_index) = be_i32(s)?;
    let (s, timestamp) = be_i64(s)?;
    let (s, max_num_offsets) = be_i32(s)?;
    Ok((
        s,
        Partition {
            partition_index,
            timestamp,
            max_num_offsets,
        },
    ))
}

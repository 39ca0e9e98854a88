//! Encoding and creation for Offset Commit requests.
//!
//! Version 0 stores the offset in the coordinator without any member or
//! generation check, so the same request works for grouped and simple
//! consumers.
//!
//! ### Example
//! ```rust,ignore
//! let mut offset_request = protocol::OffsetCommitRequest::new(group_id);
//! offset_request.add(topic_name, partition_index, committed_offset, None);
//! transport.submit(&coordinator, offset_request.into()).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! OffsetCommit Request (Version: 0) => group_id [topics]
//!   group_id => STRING
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index committed_offset committed_metadata
//!       partition_index => INT32
//!       committed_offset => INT64
//!       committed_metadata => NULLABLE_STRING
//! ```
//!
//! Note that we are using version 0 of this API

use bytes::BufMut;
use nom::{
    number::complete::{be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::{encode::ToByte, error::Result, parser};

/// The base Offset Commit request object.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetCommitRequest {
    /// The unique group identifier.
    pub group_id: String,
    /// The topics to commit offsets for.
    pub topics: Vec<Topic>,
}

/// The topics to commit offsets for.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name.
    pub name: String,
    /// Each partition to commit offsets for.
    pub partitions: Vec<Partition>,
}

/// Each partition to commit offsets for.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The message offset to be committed.
    pub committed_offset: i64,
    /// Any associated metadata the client wants to keep.
    pub committed_metadata: Option<String>,
}

impl OffsetCommitRequest {
    /// Create a new Offset Commit Request
    ///
    /// This request needs to be given commits for a topic and partition
    /// before being sent to the broker. You can do this by using the `add` method.
    pub fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            topics: vec![],
        }
    }

    /// Add an offset to be committed for a given topic and partition
    ///
    /// If the same topic and partition is used twice, the offset will be
    /// overwritten.
    pub fn add(
        &mut self,
        topic_name: &str,
        partition_index: i32,
        committed_offset: i64,
        committed_metadata: Option<&str>,
    ) {
        let partition = Partition {
            partition_index,
            committed_offset,
            committed_metadata: committed_metadata.map(str::to_owned),
        };
        match self.topics.iter_mut().find(|topic| topic.name == topic_name) {
            None => self.topics.push(Topic {
                name: topic_name.to_owned(),
                partitions: vec![partition],
            }),
            Some(topic) => {
                match topic
                    .partitions
                    .iter_mut()
                    .find(|p| p.partition_index == partition_index)
                {
                    Some(existing) => *existing = partition,
                    None => topic.partitions.push(partition),
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl ToByte for OffsetCommitRequest {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding OffsetCommitRequest {:?}", self);
        self.group_id.encode(buffer)?;
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
        self.committed_offset.encode(buffer)?;
        self.committed_metadata.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_offset_commit_request(s: NomBytes) -> IResult<NomBytes, OffsetCommitRequest> {
    let (s, group_id) = parser::parse_utf8_string(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;
    Ok((s, OffsetCommitRequest { group_id, topics }))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;
    Ok((s, Topic { name, partitions }))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, partition_index) = be_i32(s)?;
    let (s, committed_offset) = be_i64(s)?;
    let (s, committed_metadata) = parser::parse_nullable_utf8_string(s)?;
    Ok((
        s,
        Partition {
            partition_index,
            committed_offset,
            committed_metadata,
        },
    ))
}

//! Parsing and processing for Offset Fetch responses.
//!
//! ### Protocol Def
//! ```text
//! OffsetFetch Response (Version: 0) => [topics]
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index committed_offset metadata error_code
//!       partition_index => INT32
//!       committed_offset => INT64
//!       metadata => NULLABLE_STRING
//!       error_code => INT16
//! ```
//!
//! A committed offset of -1 means the group never committed for that
//! partition.

use bytes::BufMut;
use nom::{
    number::complete::{be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    parser,
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OffsetFetchResponse {
    /// The responses per topic.
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name.
    pub name: String,
    /// The responses per partition
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The committed message offset.
    pub committed_offset: i64,
    /// The partition metadata.
    pub metadata: Option<String>,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
}

impl OffsetFetchResponse {
    /// The committed offset for `topic`/`partition`, `None` when nothing
    /// was ever committed.
    pub fn committed_offset(&self, topic: &str, partition: i32) -> Result<Option<i64>> {
        let found = self
            .topics
            .iter()
            .filter(|t| t.name == topic)
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.partition_index == partition);
        match found {
            None => Ok(None),
            Some(p) if p.error_code == KafkaCode::UnknownTopicOrPartition => Ok(None),
            Some(p) if p.error_code != KafkaCode::None => Err(Error::KafkaError(p.error_code)),
            Some(p) if p.committed_offset < 0 => Ok(None),
            Some(p) => Ok(Some(p.committed_offset)),
        }
    }
}

impl ToByte for OffsetFetchResponse {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.topics.encode(buffer)
    }
}

impl ToByte for Topic {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.name.encode(buffer)?;
        self.partitions.encode(buffer)
    }
}

impl ToByte for Partition {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.partition_index.encode(buffer)?;
        self.committed_offset.encode(buffer)?;
        self.metadata.encode(buffer)?;
        self.error_code.encode(buffer)
    }
}

pub fn parse_offset_fetch_response(s: NomBytes) -> IResult<NomBytes, OffsetFetchResponse> {
    let (s, topics) = parser::parse_array(parse_topic)(s)?;
    Ok((s, OffsetFetchResponse { topics }))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;
    Ok((s, Topic { name, partitions }))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, partition_index) = be_i32(s)?;
    let (s, committed_offset) = be_i64(s)?;
    let (s, metadata) = parser::parse_nullable_utf8_string(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;

    Ok((
        s,
        Partition {
            partition_index,
            committed_offset,
            metadata,
            error_code,
        },
    ))
}

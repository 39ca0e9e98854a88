//! Parsing and processing for Offset Commit responses.
//!
//! ### Protocol Def
//! ```text
//! OffsetCommit Response (Version: 0) => [topics]
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index error_code
//!       partition_index => INT32
//!       error_code => INT16
//! ```

use bytes::BufMut;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    parser,
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OffsetCommitResponse {
    /// The responses for each topic.
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name.
    pub name: String,
    /// The responses for each partition in the topic.
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
}

impl OffsetCommitResponse {
    pub fn is_error(&self) -> Result<()> {
        for topic in self.topics.iter() {
            for partition in topic.partitions.iter() {
                if partition.error_code != KafkaCode::None {
                    tracing::error!(
                        "ERROR: Commit for {}:{} failed with {:?}",
                        topic.name,
                        partition.partition_index,
                        partition.error_code
                    );
                    return Err(Error::KafkaError(partition.error_code));
                }
            }
        }
        Ok(())
    }
}

impl ToByte for OffsetCommitResponse {
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
        self.error_code.encode(buffer)
    }
}

pub fn parse_offset_commit_response(s: NomBytes) -> IResult<NomBytes, OffsetCommitResponse> {
    let (s, topics) = parser::parse_array(parse_topic)(s)?;
    Ok((s, OffsetCommitResponse { topics }))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;
    Ok((s, Topic { name, partitions }))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, partition_index) = be_i32(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    Ok((
        s,
        Partition {
            partition_index,
            error_code,
        },
    ))
}

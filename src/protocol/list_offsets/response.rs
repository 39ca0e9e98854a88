//! Parsing and processing for List Offsets responses.
//!
//! ### Protocol Def
//! ```text
//! Offsets Response (Version: 0) => [topics]
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index error_code [offsets]
//!       partition_index => INT32
//!       error_code => INT16
//!       offsets => INT64
//! ```

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
pub struct ListOffsetsResponse {
    /// Each topic in the response.
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name
    pub name: String,
    /// Each partition in the response.
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The partition error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// Offsets in descending order.
    pub offsets: Vec<i64>,
}

impl ListOffsetsResponse {
    /// The first offset listed for `topic`/`partition`.
    pub fn offset_for(&self, topic: &str, partition: i32) -> Result<Option<i64>> {
        let found = self
            .topics
            .iter()
            .filter(|t| t.name == topic)
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.partition_index == partition);
        match found {
            None => Ok(None),
            Some(p) if p.error_code != KafkaCode::None => Err(Error::KafkaError(p.error_code)),
            Some(p) => Ok(p.offsets.first().copied()),
        }
    }
}

impl ToByte for ListOffsetsResponse {
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
        self.error_code.encode(buffer)?;
        self.offsets.encode(buffer)
    }
}

pub fn parse_list_offsets_response(s: NomBytes) -> IResult<NomBytes, ListOffsetsResponse> {
    let (s, topics) = parser::parse_array(parse_topic)(s)?;
    Ok((s, ListOffsetsResponse { topics }))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;
    Ok((s, Topic { name, partitions }))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, partition_index) = be_i32(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, offsets) = parser::parse_array(be_i64)(s)?;

    Ok((
        s,
        Partition {
            partition_index,
            error_code,
            offsets,
        },
    ))
}

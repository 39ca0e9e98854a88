//! Parsing and processing for Produce responses.
//!
//! ### Protocol Def
//! ```text
//! Produce Response (Version: 0) => [responses]
//!   responses => name [partition_responses]
//!     name => STRING
//!     partition_responses => index error_code base_offset
//!       index => INT32
//!       error_code => INT16
//!       base_offset => INT64
//! ```
//!
//! Note we are using version 0 for the response.

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

/// The base Produce response object.
///
/// Note, the request needs to have a non-zero value for `required_acks` to
/// receive a response. Requests without acks resolve to the default value.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProduceResponse {
    /// Each produce response
    pub responses: Vec<TopicProduceResponse>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicProduceResponse {
    /// The topic name
    pub name: String,
    /// Each partition that we produced to within the topic.
    pub partition_responses: Vec<PartitionResponse>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResponse {
    /// The partition index.
    pub index: i32,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The base offset.
    pub base_offset: i64,
}

impl ProduceResponse {
    /// Fails with the first partition level error.
    pub fn is_error(&self) -> Result<()> {
        for partition in self.partitions() {
            if partition.1.error_code != KafkaCode::None {
                tracing::error!(
                    "ERROR: Produce to {}:{} failed with {:?}",
                    partition.0,
                    partition.1.index,
                    partition.1.error_code
                );
                return Err(Error::KafkaError(partition.1.error_code));
            }
        }
        Ok(())
    }

    /// Every partition response paired with its topic name.
    pub fn partitions(&self) -> impl Iterator<Item = (&str, &PartitionResponse)> {
        self.responses.iter().flat_map(|topic| {
            topic
                .partition_responses
                .iter()
                .map(move |p| (topic.name.as_str(), p))
        })
    }
}

impl ToByte for ProduceResponse {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.responses.encode(buffer)
    }
}

impl ToByte for TopicProduceResponse {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        self.partition_responses.encode(buffer)
    }
}

impl ToByte for PartitionResponse {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.index.encode(buffer)?;
        self.error_code.encode(buffer)?;
        self.base_offset.encode(buffer)
    }
}

pub fn parse_produce_response(s: NomBytes) -> IResult<NomBytes, ProduceResponse> {
    let (s, responses) = parser::parse_array(parse_topic_response)(s)?;

    Ok((s, ProduceResponse { responses }))
}

fn parse_topic_response(s: NomBytes) -> IResult<NomBytes, TopicProduceResponse> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partition_responses) = parser::parse_array(parse_partition_response)(s)?;

    Ok((
        s,
        TopicProduceResponse {
            name,
            partition_responses,
        },
    ))
}

fn parse_partition_response(s: NomBytes) -> IResult<NomBytes, PartitionResponse> {
    let (s, index) = be_i32(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, base_offset) = be_i64(s)?;

    Ok((
        s,
        PartitionResponse {
            index,
            error_code,
            base_offset,
        },
    ))
}

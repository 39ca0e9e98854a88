//! Parsing and processing for Fetch responses.
//!
//! ```text
//! Fetch Response (Version: 0) => [responses]
//!   responses => topic [partitions]
//!     topic => STRING
//!     partitions => partition_index error_code high_watermark records
//!       partition_index => INT32
//!       error_code => INT16
//!       high_watermark => INT64
//!       records => MESSAGE_SET_SIZE MESSAGE_SET
//! ```
//!
//! The message set of each partition may end in a partial message; the
//! partial tail is dropped while parsing.

use bytes::{BufMut, Bytes};
use nom::{
    number::complete::{be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{KafkaCode, Result},
    parser,
    protocol::message_set::{parse_sized_message_set, MessageSet},
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchResponse {
    /// The response topics.
    pub topics: Vec<Topic>,
}

/// The response topics.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub name: String,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub id: i32,
    pub error_code: KafkaCode,
    pub high_water_mark: i64,
    pub message_set: MessageSet,
}

/// A single message flattened out of a fetch response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

impl FetchResponse {
    pub fn record_count(&self) -> usize {
        self.topics.iter().map(|topic| topic.record_count()).sum()
    }

    /// Every message of every partition in response order, skipping
    /// partitions that carry an error.
    pub fn into_messages(self) -> impl Iterator<Item = FetchedMessage> {
        self.topics.into_iter().flat_map(|topic| {
            let name = topic.name;
            topic
                .partitions
                .into_iter()
                .filter(|p| p.error_code == KafkaCode::None)
                .flat_map(move |partition| {
                    let name = name.clone();
                    let id = partition.id;
                    partition
                        .message_set
                        .entries
                        .into_iter()
                        .map(move |entry| FetchedMessage {
                            topic: name.clone(),
                            partition: id,
                            offset: entry.offset,
                            key: entry.message.key,
                            value: entry.message.value,
                        })
                })
        })
    }

    /// Partition level errors paired with their topic.
    pub fn errors(&self) -> Vec<(&str, i32, KafkaCode)> {
        self.topics
            .iter()
            .flat_map(|topic| {
                topic
                    .partitions
                    .iter()
                    .filter(|p| p.error_code != KafkaCode::None)
                    .map(move |p| (topic.name.as_str(), p.id, p.error_code))
            })
            .collect()
    }
}

impl Topic {
    pub fn record_count(&self) -> usize {
        self.partitions.iter().map(|p| p.message_set.len()).sum()
    }
}

impl ToByte for FetchResponse {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.topics.encode(buffer)
    }
}

impl ToByte for Topic {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        self.partitions.encode(buffer)
    }
}

impl ToByte for Partition {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.id.encode(buffer)?;
        self.error_code.encode(buffer)?;
        self.high_water_mark.encode(buffer)?;
        self.message_set.encode(buffer)
    }
}

pub fn parse_fetch_response(s: NomBytes) -> IResult<NomBytes, FetchResponse> {
    let (s, topics) = parser::parse_array(parse_topic)(s)?;
    Ok((s, FetchResponse { topics }))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;
    Ok((s, Topic { name, partitions }))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, id) = be_i32(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, high_water_mark) = be_i64(s)?;
    let (s, message_set) = parse_sized_message_set(s)?;

    Ok((
        s,
        Partition {
            id,
            error_code,
            high_water_mark,
            message_set,
        },
    ))
}

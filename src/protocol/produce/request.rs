//! Encoding and creation for Produce requests.
//!
//! ### Example
//! ```rust,ignore
//! let mut produce = protocol::ProduceRequest::new(1, 1000);
//! produce.add("purchases", 0, MessageSet::new(messages, Compression::None));
//! let response = transport.submit(&leader, produce.into()).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! Produce Request (Version: 0) => acks timeout_ms [topic_data]
//!   acks => INT16
//!   timeout_ms => INT32
//!   topic_data => name [partition_data]
//!     name => STRING
//!     partition_data => index records
//!       index => INT32
//!       records => RECORDS
//! ```
//!
//! Note we are using version 0 of the request.

use bytes::{BufMut, Bytes};
use nom::{
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::Result,
    parser,
    protocol::message_set::{parse_sized_message_set, Compression, Message, MessageSet},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ProduceRequest {
    /// The number of acknowledgments the producer requires the leader to have received before considering a request complete. Allowed values: 0 for no acknowledgments, 1 for only the leader and -1 for the full ISR.
    pub required_acks: i16,
    /// The timeout to await a response in milliseconds.
    pub timeout_ms: i32,
    /// Each topic to produce to.
    pub topics: Vec<TopicProduceData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicProduceData {
    /// The topic name.
    pub name: String,
    /// Each partition to produce to.
    pub partitions: Vec<PartitionProduceData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionProduceData {
    /// The partition index.
    pub partition: i32,
    /// The record data to be produced.
    pub message_set: MessageSet,
}

impl ProduceRequest {
    pub fn new(required_acks: i16, timeout_ms: i32) -> ProduceRequest {
        ProduceRequest {
            required_acks,
            timeout_ms,
            topics: vec![],
        }
    }

    /// Attach a message set for `topic`/`partition`. A partition that
    /// already has a set gets the new entries appended.
    pub fn add(&mut self, topic: &str, partition: i32, message_set: MessageSet) {
        let tp = match self.topics.iter_mut().position(|tp| tp.name == topic) {
            Some(i) => &mut self.topics[i],
            None => {
                self.topics.push(TopicProduceData {
                    name: topic.to_owned(),
                    partitions: vec![],
                });
                let last = self.topics.len() - 1;
                &mut self.topics[last]
            }
        };

        match tp.partitions.iter_mut().find(|p| p.partition == partition) {
            Some(existing) => {
                let base = existing.message_set.len() as i64;
                existing
                    .message_set
                    .entries
                    .extend(message_set.entries.into_iter().map(|mut e| {
                        e.offset += base;
                        e
                    }));
            }
            None => tp.partitions.push(PartitionProduceData {
                partition,
                message_set,
            }),
        }
    }

    /// Convenience for a single uncompressed message.
    pub fn add_message(
        &mut self,
        topic: &str,
        partition: i32,
        key: Option<Bytes>,
        value: Option<Bytes>,
    ) {
        let set = MessageSet::new(vec![Message::new(key, value)], Compression::None);
        self.add(topic, partition, set);
    }

    pub fn message_count(&self) -> usize {
        self.topics
            .iter()
            .flat_map(|t| t.partitions.iter())
            .map(|p| p.message_set.len())
            .sum()
    }
}

impl ToByte for ProduceRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding ProduceRequest {:?}", self);
        self.required_acks.encode(buffer)?;
        self.timeout_ms.encode(buffer)?;
        self.topics.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for TopicProduceData {
    // render: TopicName [Partition MessageSetSize MessageSet]
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        self.partitions.encode(buffer)
    }
}

impl ToByte for PartitionProduceData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.partition.encode(buffer)?;
        self.message_set.encode(buffer)
    }
}

pub fn parse_produce_request(s: NomBytes) -> IResult<NomBytes, ProduceRequest> {
    let (s, required_acks) = be_i16(s)?;
    let (s, timeout_ms) = be_i32(s)?;
    let (s, topics) = parser::parse_array(parse_topic_data)(s)?;

    Ok((
        s,
        ProduceRequest {
            required_acks,
            timeout_ms,
            topics,
        },
    ))
}

fn parse_topic_data(s: NomBytes) -> IResult<NomBytes, TopicProduceData> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition_data)(s)?;
    Ok((s, TopicProduceData { name, partitions }))
}

fn parse_partition_data(s: NomBytes) -> IResult<NomBytes, PartitionProduceData> {
    let (s, partition) = be_i32(s)?;
    let (s, message_set) = parse_sized_message_set(s)?;
    Ok((
        s,
        PartitionProduceData {
            partition,
            message_set,
        },
    ))
}

//! Parsing and processing for Metadata responses.
//!
//! The response contains metadata for each partition, with
//! partitions grouped together by topic. This metadata
//! refers to brokers by their broker id. The brokers each
//! have a host and port.
//!
//! ### Protocol Def
//! ```text
//! Metadata Response (Version: 0) => [brokers] [topics]
//!   brokers => node_id host port
//!   node_id => INT32
//!   host => STRING
//!   port => INT32
//! topics => error_code name [partitions]
//!   error_code => INT16
//!   name => STRING
//!   partitions => error_code partition_index leader_id [replica_nodes] [isr_nodes]
//!     error_code => INT16
//!     partition_index => INT32
//!     leader_id => INT32
//!     replica_nodes => INT32
//!     isr_nodes => INT32
//! ```

use bytes::BufMut;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    network::BrokerAddress,
    parser,
};

/// The base Metadata response object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetadataResponse {
    /// Each broker in the response.
    pub brokers: Vec<Broker>,
    /// Each topic in the response.
    pub topics: Vec<Topic>,
}

impl MetadataResponse {
    pub fn is_error(&self) -> Result<()> {
        self.topics
            .iter()
            .map(|topic| topic.is_error())
            .collect::<Result<Vec<()>>>()?;

        Ok(())
    }
}

impl ToByte for MetadataResponse {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.brokers.encode(buffer)?;
        self.topics.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_metadata_response(s: NomBytes) -> IResult<NomBytes, MetadataResponse> {
    let (s, brokers) = parser::parse_array(parse_broker)(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;

    Ok((s, MetadataResponse { brokers, topics }))
}

/// Each broker in the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Broker {
    /// The broker ID.
    pub node_id: i32,
    /// The broker hostname.
    pub host: String,
    /// The broker port.
    pub port: i32,
}

impl Broker {
    pub fn addr(&self) -> Result<BrokerAddress> {
        let port = u16::try_from(self.port).map_err(|_| {
            tracing::error!("ERROR: broker {} has invalid port {}", self.node_id, self.port);
            Error::MissingBrokerConfigOptions
        })?;
        Ok(BrokerAddress {
            host: self.host.clone(),
            port,
        })
    }
}

impl ToByte for Broker {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.node_id.encode(buffer)?;
        self.host.encode(buffer)?;
        self.port.encode(buffer)?;
        Ok(())
    }
}

fn parse_broker(s: NomBytes) -> IResult<NomBytes, Broker> {
    let (s, node_id) = be_i32(s)?;
    let (s, host) = parser::parse_utf8_string(s)?;
    let (s, port) = be_i32(s)?;

    Ok((
        s,
        Broker {
            node_id,
            host,
            port,
        },
    ))
}

/// Each topic in the response.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic error, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The topic name.
    pub name: String,
    /// Each partition in the topic.
    pub partitions: Vec<Partition>,
}

impl Topic {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            tracing::error!(
                "ERROR: Kafka Error {:?} in topic {:?}",
                self.error_code,
                self.name
            );
            return Err(Error::KafkaError(self.error_code));
        }

        self.partitions
            .iter()
            .map(|partition| partition.is_error(&self.name))
            .collect::<Result<Vec<()>>>()?;

        Ok(())
    }
}

impl ToByte for Topic {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.error_code.encode(buffer)?;
        self.name.encode(buffer)?;
        self.partitions.encode(buffer)?;
        Ok(())
    }
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;

    Ok((
        s,
        Topic {
            error_code,
            name,
            partitions,
        },
    ))
}

/// Each partition in the topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition error, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The partition index.
    pub partition_index: i32,
    /// The ID of the leader broker.
    pub leader_id: i32,
    /// The set of all nodes that host this partition.
    pub replica_nodes: Vec<i32>,
    /// The set of nodes that are in sync with the leader for this partition.
    pub isr_nodes: Vec<i32>,
}

impl Partition {
    pub fn is_error(&self, topic_name: &str) -> Result<()> {
        if self.error_code != KafkaCode::None {
            tracing::error!(
                "ERROR: Kafka Error {:?} in topic {:?} partition {}",
                self.error_code,
                topic_name,
                self.partition_index
            );
            Err(Error::KafkaError(self.error_code))
        } else {
            Ok(())
        }
    }
}

impl ToByte for Partition {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.error_code.encode(buffer)?;
        self.partition_index.encode(buffer)?;
        self.leader_id.encode(buffer)?;
        self.replica_nodes.encode(buffer)?;
        self.isr_nodes.encode(buffer)?;
        Ok(())
    }
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, partition_index) = be_i32(s)?;
    let (s, leader_id) = be_i32(s)?;
    let (s, replica_nodes) = parser::parse_array(be_i32)(s)?;
    let (s, isr_nodes) = parser::parse_array(be_i32)(s)?;

    Ok((
        s,
        Partition {
            error_code,
            partition_index,
            leader_id,
            replica_nodes,
            isr_nodes,
        },
    ))
}

//! Parsing and processing for Group Coordinator responses.
//!
//! ### Protocol Def
//! ```text
//! GroupCoordinator Response (Version: 0) => error_code node_id host port
//!   error_code => INT16
//!   node_id => INT32
//!   host => STRING
//!   port => INT32
//! ```
//!
//! Note we are using version 0 of the response.

use bytes::BufMut;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    parser,
    protocol::Broker,
};

/// The base Group Coordinator response object.
#[derive(Debug, Clone, PartialEq)]
pub struct FindCoordinatorResponse {
    pub error_code: KafkaCode,
    /// The node id of the coordinator.
    pub node_id: i32,
    /// The host name of the coordinator.
    pub host: String,
    /// The port of the coordinator.
    pub port: i32,
}

impl FindCoordinatorResponse {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }

    pub fn broker(&self) -> Broker {
        Broker {
            node_id: self.node_id,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl ToByte for FindCoordinatorResponse {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.error_code.encode(buffer)?;
        self.node_id.encode(buffer)?;
        self.host.encode(buffer)?;
        self.port.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_find_coordinator_response(s: NomBytes) -> IResult<NomBytes, FindCoordinatorResponse> {
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, node_id) = be_i32(s)?;
    let (s, host) = parser::parse_utf8_string(s)?;
    let (s, port) = be_i32(s)?;

    Ok((
        s,
        FindCoordinatorResponse {
            error_code,
            node_id,
            host,
            port,
        },
    ))
}

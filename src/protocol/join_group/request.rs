//! Encoding and creation for Join Group requests.
//!
//! The join group request is used by a client to become a member of a
//! group. When new members join an existing group, all previous members
//! are required to rejoin by sending a new join group request. When a
//! member first joins the group, the memberId will be empty (i.e. ""),
//! but a rejoining member should use the same memberId from the
//! previous generation.
//!
//! ### Example
//! ```rust,ignore
//! let join = protocol::JoinGroupRequest::new(
//!     group_id,
//!     30000,
//!     member_id,
//!     "consumer",
//!     vec![protocol::Protocol::new("roundrobin", &topics)],
//! );
//! let response = transport.submit(&coordinator, join.into()).await?;
//! ```
//!
//! ### Protocol Def
//! The kafka protocol defines this request as follows:
//! ```text
//! JoinGroup Request (Version: 0) => group_id session_timeout member_id protocol_type [protocols]
//!   group_id => STRING
//!   session_timeout => INT32
//!   member_id => STRING
//!   protocol_type => STRING
//!   protocols => name metadata
//!     name => STRING
//!     metadata => BYTES
//!
//! ConsumerProtocolMetadata => version [topics] user_data
//!   version => INT16
//!   topics => STRING
//!   user_data => BYTES
//! ```
//!
//! Note we are using version 0 of the request.

use bytes::{BufMut, Bytes};
use nom::{bytes::complete::take, number::complete::be_i16, number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{
    encode::{encode_with_length, AsStrings, ToByte},
    error::Result,
    parser,
};

const CONSUMER_PROTOCOL_VERSION: i16 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct JoinGroupRequest {
    /// The group identifier.
    pub group_id: String,
    /// The coordinator considers the consumer dead if it receives no heartbeat after this timeout in milliseconds.
    pub session_timeout_ms: i32,
    /// The member id assigned by the group coordinator. Empty if the member is joining for the first time.
    pub member_id: String,
    /// The unique name the for class of protocols implemented by the group we want to join.
    pub protocol_type: String,
    /// The list of protocols that the member supports.
    pub protocols: Vec<Protocol>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    /// The protocol name.
    pub name: String,
    /// The protocol metadata.
    pub metadata: ProtocolMetadata,
}

/// The topics a member subscribes to, sent as an opaque byte string.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProtocolMetadata {
    pub version: i16,
    pub subscription: Vec<String>,
    pub user_data: Option<Bytes>,
}

impl ProtocolMetadata {
    pub fn new<T: AsRef<str>>(topics: &[T]) -> Self {
        Self {
            version: CONSUMER_PROTOCOL_VERSION,
            subscription: topics.iter().map(|t| t.as_ref().to_owned()).collect(),
            user_data: None,
        }
    }
}

impl Protocol {
    pub fn new<T: AsRef<str>>(name: &str, topics: &[T]) -> Protocol {
        Protocol {
            name: name.to_owned(),
            metadata: ProtocolMetadata::new(topics),
        }
    }
}

impl JoinGroupRequest {
    pub fn new(
        group_id: &str,
        session_timeout_ms: i32,
        member_id: &str,
        protocol_type: &str,
        protocols: Vec<Protocol>,
    ) -> Self {
        Self {
            group_id: group_id.to_owned(),
            session_timeout_ms,
            member_id: member_id.to_owned(),
            protocol_type: protocol_type.to_owned(),
            protocols,
        }
    }
}

impl ToByte for JoinGroupRequest {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding JoinGroupRequest {:?}", self);
        self.group_id.encode(buffer)?;
        self.session_timeout_ms.encode(buffer)?;
        self.member_id.encode(buffer)?;
        self.protocol_type.encode(buffer)?;
        self.protocols.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Protocol {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.name.encode(buffer)?;
        self.metadata.encode(buffer)
    }
}

/// Encodes as a length prefixed byte string.
impl ToByte for ProtocolMetadata {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        let mut buf = Vec::new();
        encode_with_length(&mut buf, |buf| {
            self.version.encode(buf)?;
            AsStrings(&self.subscription).encode(buf)?;
            self.user_data.encode(buf)
        })?;
        buffer.put_slice(&buf);
        Ok(())
    }
}

pub fn parse_join_group_request(s: NomBytes) -> IResult<NomBytes, JoinGroupRequest> {
    let (s, group_id) = parser::parse_utf8_string(s)?;
    let (s, session_timeout_ms) = be_i32(s)?;
    let (s, member_id) = parser::parse_utf8_string(s)?;
    let (s, protocol_type) = parser::parse_utf8_string(s)?;
    let (s, protocols) = parser::parse_array(parse_protocol)(s)?;

    Ok((
        s,
        JoinGroupRequest {
            group_id,
            session_timeout_ms,
            member_id,
            protocol_type,
            protocols,
        },
    ))
}

fn parse_protocol(s: NomBytes) -> IResult<NomBytes, Protocol> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, metadata) = parse_protocol_metadata(s)?;
    Ok((s, Protocol { name, metadata }))
}

/// Parse the length prefixed consumer metadata.
pub fn parse_protocol_metadata(s: NomBytes) -> IResult<NomBytes, ProtocolMetadata> {
    let (s, length) = be_i32(s)?;
    let (s, body) = take(length.max(0) as usize)(s)?;
    if length <= 0 {
        return Ok((s, ProtocolMetadata::default()));
    }

    let (body, version) = be_i16(body)?;
    let (body, subscription) = parser::parse_array(parser::parse_utf8_string)(body)?;
    let (_, user_data) = parser::parse_nullable_bytes(body)?;
    Ok((
        s,
        ProtocolMetadata {
            version,
            subscription,
            user_data,
        },
    ))
}

//! Parsing and processing for Join Group responses.
//!
//! ### Protocol Def
//! ```text
//! JoinGroup Response (Version: 0) => error_code generation_id protocol_name leader member_id [members]
//!   error_code => INT16
//!   generation_id => INT32
//!   protocol_name => STRING
//!   leader => STRING
//!   member_id => STRING
//!   members => member_id metadata
//!     member_id => STRING
//!     metadata => BYTES
//! ```
//!
//! Only the elected leader receives the member list.

use bytes::BufMut;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    parser,
    protocol::join_group::request::{parse_protocol_metadata, ProtocolMetadata},
};

#[derive(Debug, Clone, PartialEq)]
pub struct JoinGroupResponse {
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The generation ID of the group.
    pub generation_id: i32,
    /// The group protocol selected by the coordinator.
    pub protocol_name: String,
    /// The leader of the group.
    pub leader: String,
    /// The member ID assigned by the group coordinator.
    pub member_id: String,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// The group member ID.
    pub member_id: String,
    /// The group member metadata.
    pub metadata: ProtocolMetadata,
}

impl JoinGroupResponse {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }

    pub fn is_leader(&self) -> bool {
        !self.member_id.is_empty() && self.member_id == self.leader
    }
}

impl ToByte for JoinGroupResponse {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.error_code.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.protocol_name.encode(buffer)?;
        self.leader.encode(buffer)?;
        self.member_id.encode(buffer)?;
        self.members.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Member {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.member_id.encode(buffer)?;
        self.metadata.encode(buffer)
    }
}

pub fn parse_join_group_response(s: NomBytes) -> IResult<NomBytes, JoinGroupResponse> {
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, generation_id) = be_i32(s)?;
    let (s, protocol_name) = parser::parse_utf8_string(s)?;
    let (s, leader) = parser::parse_utf8_string(s)?;
    let (s, member_id) = parser::parse_utf8_string(s)?;
    let (s, members) = parser::parse_array(parse_member)(s)?;

    Ok((
        s,
        JoinGroupResponse {
            error_code,
            generation_id,
            protocol_name,
            leader,
            member_id,
            members,
        },
    ))
}

fn parse_member(s: NomBytes) -> IResult<NomBytes, Member> {
    let (s, member_id) = parser::parse_utf8_string(s)?;
    let (s, metadata) = parse_protocol_metadata(s)?;

    Ok((
        s,
        Member {
            member_id,
            metadata,
        },
    ))
}

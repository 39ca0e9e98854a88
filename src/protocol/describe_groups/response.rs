//! Parsing and processing for Describe Groups responses.
//!
//! ### Protocol Def
//! ```text
//! DescribeGroups Response (Version: 0) => [groups]
//!   groups => error_code group_id group_state protocol_type protocol_data [members]
//!     error_code => INT16
//!     group_id => STRING
//!     group_state => STRING
//!     protocol_type => STRING
//!     protocol_data => STRING
//!     members => member_id client_id client_host member_metadata member_assignment
//!       member_id => STRING
//!       client_id => STRING
//!       client_host => STRING
//!       member_metadata => BYTES
//!       member_assignment => BYTES
//! ```
//!
//! Metadata and assignment are kept opaque since the group may use a
//! protocol other than `consumer`.

use bytes::{BufMut, Bytes};
use nom::IResult;
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{KafkaCode, Result},
    parser,
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DescribeGroupsResponse {
    pub groups: Vec<DescribedGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescribedGroup {
    pub error_code: KafkaCode,
    pub group_id: String,
    /// One of `Dead`, `Stable`, `AwaitingSync`, `PreparingRebalance` or empty.
    pub group_state: String,
    pub protocol_type: String,
    pub protocol_data: String,
    pub members: Vec<DescribedMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescribedMember {
    pub member_id: String,
    pub client_id: String,
    pub client_host: String,
    pub member_metadata: Bytes,
    pub member_assignment: Bytes,
}

impl ToByte for DescribeGroupsResponse {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.groups.encode(buffer)
    }
}

impl ToByte for DescribedGroup {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.error_code.encode(buffer)?;
        self.group_id.encode(buffer)?;
        self.group_state.encode(buffer)?;
        self.protocol_type.encode(buffer)?;
        self.protocol_data.encode(buffer)?;
        self.members.encode(buffer)
    }
}

impl ToByte for DescribedMember {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.member_id.encode(buffer)?;
        self.client_id.encode(buffer)?;
        self.client_host.encode(buffer)?;
        self.member_metadata.encode(buffer)?;
        self.member_assignment.encode(buffer)
    }
}

pub fn parse_describe_groups_response(s: NomBytes) -> IResult<NomBytes, DescribeGroupsResponse> {
    let (s, groups) = parser::parse_array(parse_group)(s)?;
    Ok((s, DescribeGroupsResponse { groups }))
}

fn parse_group(s: NomBytes) -> IResult<NomBytes, DescribedGroup> {
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, group_id) = parser::parse_utf8_string(s)?;
    let (s, group_state) = parser::parse_utf8_string(s)?;
    let (s, protocol_type) = parser::parse_utf8_string(s)?;
    let (s, protocol_data) = parser::parse_utf8_string(s)?;
    let (s, members) = parser::parse_array(parse_member)(s)?;
    Ok((
        s,
        DescribedGroup {
            error_code,
            group_id,
            group_state,
            protocol_type,
            protocol_data,
            members,
        },
    ))
}

fn parse_member(s: NomBytes) -> IResult<NomBytes, DescribedMember> {
    let (s, member_id) = parser::parse_utf8_string(s)?;
    let (s, client_id) = parser::parse_utf8_string(s)?;
    let (s, client_host) = parser::parse_utf8_string(s)?;
    let (s, member_metadata) = parser::parse_bytes(s)?;
    let (s, member_assignment) = parser::parse_bytes(s)?;
    Ok((
        s,
        DescribedMember {
            member_id,
            client_id,
            client_host,
            member_metadata,
            member_assignment,
        },
    ))
}

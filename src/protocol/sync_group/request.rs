//! Encoding and creation for Sync Group requests.
//!
//! The sync group request is used by the group
//! leader to assign state (e.g. partition assignments)
//! to all members of the current generation. All members
//! send SyncGroup immediately after joining the group,
//! but only the leader provides the group's assignment.
//!
//! ### Example
//! ```rust,ignore
//! let sync_request = protocol::SyncGroupRequest::new(
//!     group_id,
//!     generation_id,
//!     member_id,
//!     assignments,
//! );
//! let response = transport.submit(&coordinator, sync_request.into()).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! SyncGroup Request (Version: 0) => group_id generation_id member_id [assignments]
//!   group_id => STRING
//!   generation_id => INT32
//!   member_id => STRING
//!   assignments => member_id assignment
//!     member_id => STRING
//!     assignment => BYTES
//!
//! MemberAssignment => Version PartitionAssignment
//!   Version => int16
//!   PartitionAssignment => [Topic [Partition]]
//!     Topic => string
//!     Partition => int32
//!   UserData => bytes
//! ```
//!
//! Note that we are using version 0 of this API.
use bytes::{BufMut, Bytes};
use nom::{
    bytes::complete::take,
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    encode::{encode_with_length, ToByte},
    error::Result,
    parser,
};

/// The base Sync Group request object.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncGroupRequest {
    /// The unique group identifier.
    pub group_id: String,
    /// The generation of the group.
    pub generation_id: i32,
    /// The member ID assigned by the group.
    pub member_id: String,
    /// Each assignment. Empty if this member is not the leader.
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The ID of the member to assign.
    pub member_id: String,
    /// The member assignment.
    pub assignment: MemberAssignment,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemberAssignment {
    pub version: i16,
    pub partition_assignments: Vec<PartitionAssignment>,
    pub user_data: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionAssignment {
    pub topic_name: String,
    pub partitions: Vec<i32>,
}

impl Assignment {
    pub fn new(member_id: &str, assignment: MemberAssignment) -> Assignment {
        Assignment {
            member_id: member_id.to_owned(),
            assignment,
        }
    }
}

impl MemberAssignment {
    pub fn new(partition_assignments: Vec<PartitionAssignment>) -> Self {
        Self {
            version: 0,
            partition_assignments,
            user_data: None,
        }
    }

    /// Partitions assigned for `topic`, empty when the topic is absent.
    pub fn partitions_for(&self, topic: &str) -> &[i32] {
        self.partition_assignments
            .iter()
            .find(|p| p.topic_name == topic)
            .map(|p| p.partitions.as_slice())
            .unwrap_or_default()
    }
}

impl PartitionAssignment {
    pub fn new(topic_name: &str, partitions: Vec<i32>) -> PartitionAssignment {
        PartitionAssignment {
            topic_name: topic_name.to_owned(),
            partitions,
        }
    }
}

impl SyncGroupRequest {
    pub fn new(
        group_id: &str,
        generation_id: i32,
        member_id: &str,
        assignments: Vec<Assignment>,
    ) -> Self {
        Self {
            group_id: group_id.to_owned(),
            generation_id,
            member_id: member_id.to_owned(),
            assignments,
        }
    }
}

impl ToByte for SyncGroupRequest {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding SyncGroupRequest {:?}", self);
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        self.assignments.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Assignment {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.member_id.encode(buffer)?;
        self.assignment.encode(buffer)
    }
}

/// The protocol wants a bytestring and not a defined struct.
impl ToByte for MemberAssignment {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        let mut buf = Vec::new();
        encode_with_length(&mut buf, |buf| {
            self.version.encode(buf)?;
            self.partition_assignments.encode(buf)?;
            self.user_data.encode(buf)
        })?;
        buffer.put_slice(&buf);
        Ok(())
    }
}

impl ToByte for PartitionAssignment {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.topic_name.encode(buffer)?;
        self.partitions.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_sync_group_request(s: NomBytes) -> IResult<NomBytes, SyncGroupRequest> {
    let (s, group_id) = parser::parse_utf8_string(s)?;
    let (s, generation_id) = be_i32(s)?;
    let (s, member_id) = parser::parse_utf8_string(s)?;
    let (s, assignments) = parser::parse_array(parse_assignment)(s)?;

    Ok((
        s,
        SyncGroupRequest {
            group_id,
            generation_id,
            member_id,
            assignments,
        },
    ))
}

fn parse_assignment(s: NomBytes) -> IResult<NomBytes, Assignment> {
    let (s, member_id) = parser::parse_utf8_string(s)?;
    let (s, assignment) = parse_member_assignment(s)?;
    Ok((
        s,
        Assignment {
            member_id,
            assignment,
        },
    ))
}

/// Parse the length prefixed assignment. An empty byte string means
/// nothing was assigned.
pub fn parse_member_assignment(s: NomBytes) -> IResult<NomBytes, MemberAssignment> {
    let (s, length) = be_i32(s)?;
    let (s, body) = take(length.max(0) as usize)(s)?;
    if length <= 0 {
        return Ok((s, MemberAssignment::default()));
    }

    let (body, version) = be_i16(body)?;
    let (body, partition_assignments) = parser::parse_array(parse_partition_assignment)(body)?;
    let (_, user_data) = parser::parse_nullable_bytes(body)?;

    Ok((
        s,
        MemberAssignment {
            version,
            partition_assignments,
            user_data,
        },
    ))
}

fn parse_partition_assignment(s: NomBytes) -> IResult<NomBytes, PartitionAssignment> {
    let (s, topic_name) = parser::parse_utf8_string(s)?;
    let (s, partitions) = parser::parse_array(be_i32)(s)?;

    Ok((
        s,
        PartitionAssignment {
            topic_name,
            partitions,
        },
    ))
}

//! Encoding and creation for Leave Group requests.
//!
//! To explicitly leave a group, the client can send a leave group request. This is preferred over letting the session timeout expire since it allows the group to rebalance faster, which for the consumer means that less time will elapse before partitions can be reassigned to an active member.
//!
//! ### Example
//! ```rust,ignore
//! let leave = protocol::LeaveGroupRequest::new(group_id, member_id);
//! let response = transport.submit(&coordinator, leave.into()).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! LeaveGroup Request (Version: 0) => group_id member_id
//!   group_id => STRING
//!   member_id => STRING
//! ```
//!
//! Note we are using version 0 for this request.

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use crate::{encode::ToByte, error::Result, parser};

/// The base Leave Group request object.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveGroupRequest {
    /// The ID of the group to leave.
    pub group_id: String,
    /// The member ID to remove from the group.
    pub member_id: String,
}

impl LeaveGroupRequest {
    pub fn new(group_id: &str, member_id: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            member_id: member_id.to_owned(),
        }
    }
}

impl ToByte for LeaveGroupRequest {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding LeaveGroupRequest {:?}", self);
        self.group_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_leave_group_request(s: NomBytes) -> IResult<NomBytes, LeaveGroupRequest> {
    let (s, group_id) = parser::parse_utf8_string(s)?;
    let (s, member_id) = parser::parse_utf8_string(s)?;
    Ok((
        s,
        LeaveGroupRequest {
            group_id,
            member_id,
        },
    ))
}

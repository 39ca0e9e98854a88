//! Encoding and creation for Heartbeat requests.
//!
//! Once a member has joined and synced, it will begin sending periodic
//! heartbeats to keep itself in the group. If not heartbeat has been
//! received by the coordinator with the configured session timeout,
//! the member will be kicked out of the group.
//!
//! ### Example
//! ```rust,ignore
//! let heartbeat = protocol::HeartbeatRequest::new(group_id, generation_id, member_id);
//! let response = transport.submit(&coordinator, heartbeat.into()).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! Heartbeat Request (Version: 0) => group_id generation_id member_id
//!   group_id => STRING
//!   generation_id => INT32
//!   member_id => STRING
//! ```
//!
//! Note that we are using version 0 of this API.

use bytes::BufMut;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{encode::ToByte, error::Result, parser};

/// The base Heartbeat request object.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatRequest {
    /// The group id.
    pub group_id: String,
    /// The generation of the group.
    pub generation_id: i32,
    /// The member ID.
    pub member_id: String,
}

impl HeartbeatRequest {
    pub fn new(group_id: &str, generation_id: i32, member_id: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            generation_id,
            member_id: member_id.to_owned(),
        }
    }
}

impl ToByte for HeartbeatRequest {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding HeartbeatRequest {:?}", self);
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_heartbeat_request(s: NomBytes) -> IResult<NomBytes, HeartbeatRequest> {
    let (s, group_id) = parser::parse_utf8_string(s)?;
    let (s, generation_id) = be_i32(s)?;
    let (s, member_id) = parser::parse_utf8_string(s)?;
    Ok((
        s,
        HeartbeatRequest {
            group_id,
            generation_id,
            member_id,
        },
    ))
}

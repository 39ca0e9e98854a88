//! Encoding and creation for Group Coordinator requests.
//!
//! The offsets for a given consumer group are maintained by a
//! specific broker called the group coordinator. i.e., a consumer
//! needs to issue its offset commit and fetch requests to this
//! specific broker. It can discover the current coordinator by
//! issuing a group coordinator request.
//!
//! ### Protocol Def
//! ```text
//! GroupCoordinator Request (Version: 0) => group_id
//!   group_id => STRING
//! ```
//!
//! Note we are using version 0 of the request.

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use crate::{encode::ToByte, error::Result, parser};

/// The base Group Coordinator request object.
#[derive(Debug, Clone, PartialEq)]
pub struct FindCoordinatorRequest {
    /// The group to look the coordinator up for.
    pub group_id: String,
}

impl FindCoordinatorRequest {
    pub fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
        }
    }
}

impl ToByte for FindCoordinatorRequest {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding FindCoordinatorRequest {:?}", self);
        self.group_id.encode(buffer)
    }
}

pub fn parse_find_coordinator_request(s: NomBytes) -> IResult<NomBytes, FindCoordinatorRequest> {
    let (s, group_id) = parser::parse_utf8_string(s)?;
    Ok((s, FindCoordinatorRequest { group_id }))
}

//! Parsing and processing for Sync Group responses.
//!
//! Each member in the group will receive the assignment
//! from the leader in the sync group response.
//!
//! ### Protocol Def
//! ```text
//! SyncGroup Response (Version: 0) => error_code assignment
//!   error_code => INT16
//!   assignment => BYTES
//! ```

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    parser,
    protocol::sync_group::request::{parse_member_assignment, MemberAssignment},
};

#[derive(Debug, Clone, PartialEq)]
pub struct SyncGroupResponse {
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The member assignment.
    pub assignment: MemberAssignment,
}

impl SyncGroupResponse {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }
}

impl ToByte for SyncGroupResponse {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.error_code.encode(buffer)?;
        self.assignment.encode(buffer)
    }
}

pub fn parse_sync_group_response(s: NomBytes) -> IResult<NomBytes, SyncGroupResponse> {
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, assignment) = parse_member_assignment(s)?;

    Ok((
        s,
        SyncGroupResponse {
            error_code,
            assignment,
        },
    ))
}

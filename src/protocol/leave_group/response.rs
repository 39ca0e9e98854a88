//! Parsing and processing for Leave Group responses.
//!
//! ### Protocol Defs
//! ```text
//! LeaveGroup Response (Version: 0) => error_code
//!   error_code => INT16
//! ```
//!
//! Note we are using version 0 for the response.

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    parser,
};

/// The base Leave Group response object.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveGroupResponse {
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
}

impl LeaveGroupResponse {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }
}

impl ToByte for LeaveGroupResponse {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.error_code.encode(buffer)
    }
}

pub fn parse_leave_group_response(s: NomBytes) -> IResult<NomBytes, LeaveGroupResponse> {
    let (s, error_code) = parser::parse_kafka_code(s)?;

    Ok((s, LeaveGroupResponse { error_code }))
}

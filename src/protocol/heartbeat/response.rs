//! Parsing and processing for Heartbeat responses.
//!
//! ### Example
//! ```rust,ignore
//! let heartbeat_response = protocol::HeartbeatResponse::try_from(response_body)?;
//! heartbeat_response.is_error()?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! Heartbeat Response (Version: 0) => error_code
//!   error_code => INT16
//! ```

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    parser,
};

/// The base Heartbeat response object.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatResponse {
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
}

impl HeartbeatResponse {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }
}

impl ToByte for HeartbeatResponse {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.error_code.encode(buffer)
    }
}

pub fn parse_heartbeat_response(s: NomBytes) -> IResult<NomBytes, HeartbeatResponse> {
    let (s, error_code) = parser::parse_kafka_code(s)?;

    Ok((s, HeartbeatResponse { error_code }))
}

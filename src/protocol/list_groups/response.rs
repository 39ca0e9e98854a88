//! Parsing and processing for List Groups responses.
//!
//! ### Protocol Def
//! ```text
//! ListGroups Response (Version: 0) => error_code [groups]
//!   error_code => INT16
//!   groups => group_id protocol_type
//!     group_id => STRING
//!     protocol_type => STRING
//! ```

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    parser,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ListGroupsResponse {
    pub error_code: KafkaCode,
    pub groups: Vec<ListedGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListedGroup {
    pub group_id: String,
    pub protocol_type: String,
}

impl ListGroupsResponse {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }
}

impl ToByte for ListGroupsResponse {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.error_code.encode(buffer)?;
        self.groups.encode(buffer)
    }
}

impl ToByte for ListedGroup {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.protocol_type.encode(buffer)
    }
}

pub fn parse_list_groups_response(s: NomBytes) -> IResult<NomBytes, ListGroupsResponse> {
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, groups) = parser::parse_array(parse_listed_group)(s)?;
    Ok((s, ListGroupsResponse { error_code, groups }))
}

fn parse_listed_group(s: NomBytes) -> IResult<NomBytes, ListedGroup> {
    let (s, group_id) = parser::parse_utf8_string(s)?;
    let (s, protocol_type) = parser::parse_utf8_string(s)?;
    Ok((
        s,
        ListedGroup {
            group_id,
            protocol_type,
        },
    ))
}

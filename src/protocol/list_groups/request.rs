//! Encoding and creation for List Groups requests.
//!
//! ### Protocol Def
//! ```text
//! ListGroups Request (Version: 0) =>
//! ```

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use crate::{encode::ToByte, error::Result};

/// The request has no body.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ListGroupsRequest;

impl ToByte for ListGroupsRequest {
    fn encode<T: BufMut>(&self, _buffer: &mut T) -> Result<()> {
        Ok(())
    }
}

pub fn parse_list_groups_request(s: NomBytes) -> IResult<NomBytes, ListGroupsRequest> {
    Ok((s, ListGroupsRequest))
}

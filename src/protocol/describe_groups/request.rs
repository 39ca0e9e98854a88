//! Encoding and creation for Describe Groups requests.
//!
//! ### Protocol Def
//! ```text
//! DescribeGroups Request (Version: 0) => [groups]
//!   groups => STRING
//! ```

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use crate::{
    encode::{AsStrings, ToByte},
    error::Result,
    parser,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DescribeGroupsRequest {
    /// The names of the groups to describe.
    pub groups: Vec<String>,
}

impl DescribeGroupsRequest {
    pub fn new<T: AsRef<str>>(groups: &[T]) -> Self {
        Self {
            groups: groups.iter().map(|g| g.as_ref().to_owned()).collect(),
        }
    }
}

impl ToByte for DescribeGroupsRequest {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding DescribeGroupsRequest {:?}", self);
        AsStrings(&self.groups).encode(buffer)
    }
}

pub fn parse_describe_groups_request(s: NomBytes) -> IResult<NomBytes, DescribeGroupsRequest> {
    let (s, groups) = parser::parse_array(parser::parse_utf8_string)(s)?;
    Ok((s, DescribeGroupsRequest { groups }))
}

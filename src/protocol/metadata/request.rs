//! Encoding and creation for Metadata requests.
//!
//! ### Example
//! ```rust,ignore
//! let metadata_request = protocol::MetadataRequest::new(&["purchases"]);
//! let response = transport.submit(&broker, metadata_request.into()).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! Metadata Request (Version: 0) => [topics]
//!   topics => name
//!     name => STRING
//! ```
//!
//! Note we are using version 0 of this API. An empty topic list asks
//! for every topic in the cluster.

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use crate::{
    encode::{AsStrings, ToByte},
    error::Result,
    parser,
};

/// The base Metadata request object.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRequest {
    /// The topics to fetch metadata for.
    pub topics: Vec<String>,
}

impl MetadataRequest {
    pub fn new<T: AsRef<str>>(topics: &[T]) -> MetadataRequest {
        MetadataRequest {
            topics: topics.iter().map(|t| t.as_ref().to_owned()).collect(),
        }
    }
}

impl ToByte for MetadataRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding MetadataRequest {:?}", self);
        AsStrings(&self.topics).encode(buffer)?;
        Ok(())
    }
}

pub fn parse_metadata_request(s: NomBytes) -> IResult<NomBytes, MetadataRequest> {
    let (s, topics) = parser::parse_array(parser::parse_utf8_string)(s)?;
    Ok((s, MetadataRequest { topics }))
}

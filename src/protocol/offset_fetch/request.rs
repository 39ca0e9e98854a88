//! Encoding and creation for Offset Fetch requests.
//!
//! ### Example
//! ```rust,ignore
//! let mut offset_request = protocol::OffsetFetchRequest::new(group_id);
//! offset_request.add(topic, partition);
//! transport.submit(&coordinator, offset_request.into()).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! OffsetFetch Request (Version: 0) => group_id [topics]
//!   group_id => STRING
//!   topics => name [partition_indexes]
//!     name => STRING
//!     partition_indexes => INT32
//! ```

use bytes::BufMut;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{encode::ToByte, error::Result, parser};

/// The base Offset Fetch request object.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetFetchRequest {
    /// The group to fetch offsets for.
    pub group_id: String,
    /// Each topic we would like to fetch offsets for.
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name.
    pub name: String,
    /// The partition indexes we would like to fetch offsets for.
    pub partition_indexes: Vec<i32>,
}

impl OffsetFetchRequest {
    pub fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            topics: vec![],
        }
    }

    pub fn add(&mut self, topic_name: &str, partition_index: i32) {
        match self.topics.iter_mut().find(|topic| topic.name == topic_name) {
            None => self.topics.push(Topic {
                name: topic_name.to_owned(),
                partition_indexes: vec![partition_index],
            }),
            Some(topic) => {
                if !topic.partition_indexes.contains(&partition_index) {
                    topic.partition_indexes.push(partition_index)
                }
            }
        }
    }
}

impl ToByte for OffsetFetchRequest {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding OffsetFetchRequest {:?}", self);
        self.group_id.encode(buffer)?;
        self.topics.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Topic {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.name.encode(buffer)?;
        self.partition_indexes.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_offset_fetch_request(s: NomBytes) -> IResult<NomBytes, OffsetFetchRequest> {
    let (s, group_id) = parser::parse_utf8_string(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;
    Ok((s, OffsetFetchRequest { group_id, topics }))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_utf8_string(s)?;
    let (s, partition_indexes) = parser::parse_array(be_i32)(s)?;
    Ok((
        s,
        Topic {
            name,
            partition_indexes,
        },
    ))
}

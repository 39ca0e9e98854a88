//! MessageSet encoding shared by Produce and Fetch.
//!
//! ### Protocol Def
//! ```text
//! MessageSet => [Offset MessageSize Message]
//!   Offset => int64
//!   MessageSize => int32
//! Message => Crc MagicByte Attributes Key Value
//!   Crc => int32
//!   MagicByte => int8
//!   Attributes => int8 (bits 0~2 hold the codec)
//!   Key => bytes
//!   Value => bytes
//! ```
//!
//! MessageSets are not preceded by an element count like other arrays;
//! their extent is given by the enclosing `message_set_size`.
//!
//! A gzip compressed set is a single message whose value is the gzip of
//! an inner MessageSet. On decode the inner entries are spliced in place
//! of the wrapper. Snappy and lz4 wrappers are passed through untouched.

use bytes::{BufMut, Bytes};
use nom::{
    bytes::complete::take,
    error::{Error as NomError, ErrorKind},
    number::complete::{be_i32, be_i64, be_i8, be_u32},
    IResult, InputLength,
};
use nombytes::NomBytes;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::{
    encode::{encode_with_crc, encode_with_length, ToByte},
    error::{Error, Result},
    parser,
    utils::{compress, to_crc, uncompress},
};

/// The magic byte (a.k.a version) we use for sent messages.
pub const MESSAGE_MAGIC_BYTE: i8 = 0;

const CODEC_MASK: i8 = 0x07;
/// offset + message size
const ENTRY_OVERHEAD: usize = 12;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum Compression {
    #[default]
    None = 0,
    Gzip = 1,
    Snappy = 2,
    Lz4 = 3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub magic: i8,
    pub attributes: i8,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

impl Message {
    pub fn new(key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            magic: MESSAGE_MAGIC_BYTE,
            attributes: 0,
            key,
            value,
        }
    }

    pub fn compression(&self) -> Compression {
        Compression::from_i8(self.attributes & CODEC_MASK).unwrap_or(Compression::None)
    }

    /// Approximate wire size, used to decide whether a batch is worth compressing.
    pub fn encoded_len(&self) -> usize {
        let len = |b: &Option<Bytes>| b.as_ref().map(|b| b.len()).unwrap_or(0);
        ENTRY_OVERHEAD + 4 + 2 + 4 + len(&self.key) + 4 + len(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageSetEntry {
    pub offset: i64,
    pub message: Message,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MessageSet {
    /// Codec of the wrapper the entries travel in.
    pub compression: Compression,
    pub entries: Vec<MessageSetEntry>,
}

impl MessageSet {
    /// Build a set from plain messages with relative offsets starting at 0.
    pub fn new(messages: Vec<Message>, compression: Compression) -> Self {
        let entries = messages
            .into_iter()
            .enumerate()
            .map(|(offset, message)| MessageSetEntry {
                offset: offset as i64,
                message,
            })
            .collect();
        Self {
            compression,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the set without any leading size.
    pub fn encode_to_vec(&self, buffer: &mut Vec<u8>) -> Result<()> {
        match self.compression {
            Compression::None => {
                for entry in &self.entries {
                    entry.encode_to_vec(buffer)?;
                }
                Ok(())
            }
            Compression::Gzip => {
                if self.entries.is_empty() {
                    return Ok(());
                }
                let mut inner = Vec::new();
                for entry in &self.entries {
                    entry.encode_to_vec(&mut inner)?;
                }
                let wrapper = MessageSetEntry {
                    // the wrapper carries the offset of its last inner message
                    offset: self.entries[self.entries.len() - 1].offset,
                    message: Message {
                        magic: MESSAGE_MAGIC_BYTE,
                        attributes: Compression::Gzip as i8,
                        key: None,
                        value: Some(compress(&inner)?),
                    },
                };
                wrapper.encode_to_vec(buffer)
            }
            Compression::Snappy | Compression::Lz4 => {
                tracing::error!("ERROR: {:?} compression is not supported", self.compression);
                Err(Error::EncodingError)
            }
        }
    }
}

impl MessageSetEntry {
    // render: Offset MessageSize Crc MagicByte Attributes Key Value
    fn encode_to_vec(&self, buffer: &mut Vec<u8>) -> Result<()> {
        self.offset.encode(buffer)?;
        encode_with_length(buffer, |buffer| {
            encode_with_crc(buffer, |buffer| {
                self.message.magic.encode(buffer)?;
                self.message.attributes.encode(buffer)?;
                self.message.key.encode(buffer)?;
                self.message.value.encode(buffer)
            })?;
            Ok(())
        })?;
        Ok(())
    }
}

/// Encodes as `message_set_size message_set`.
impl ToByte for MessageSet {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        let mut buf = Vec::new();
        encode_with_length(&mut buf, |buf| self.encode_to_vec(buf))?;
        buffer.put_slice(&buf);
        Ok(())
    }
}

fn failure(input: NomBytes, kind: ErrorKind) -> nom::Err<NomError<NomBytes>> {
    nom::Err::Failure(NomError::new(input, kind))
}

/// Parse `message_set_size message_set`.
pub fn parse_sized_message_set(s: NomBytes) -> IResult<NomBytes, MessageSet> {
    let (s, size) = be_i32(s)?;
    let (s, body) = take(size.max(0) as usize)(s)?;
    let (_, message_set) = parse_message_set(body)?;
    Ok((s, message_set))
}

/// Parse entries until the input is used up.
///
/// A tail too short to hold one more full entry is discarded: brokers
/// cut the last message when a response hits `max_bytes`.
pub fn parse_message_set(s: NomBytes) -> IResult<NomBytes, MessageSet> {
    let mut message_set = MessageSet::default();
    let mut rest = s;

    loop {
        let remaining = rest.input_len();
        if remaining < ENTRY_OVERHEAD {
            break;
        }
        let (r, offset) = be_i64(rest.clone())?;
        let (r, size) = be_i32(r)?;
        if size < 0 || size as usize > remaining - ENTRY_OVERHEAD {
            tracing::trace!("Dropping truncated message of {} bytes", size);
            break;
        }
        let (r, body) = take(size as usize)(r)?;
        rest = r;

        let (_, message) = parse_message(body.clone())?;
        match message.compression() {
            Compression::Gzip => {
                let value = message.value.unwrap_or_default();
                let inner = uncompress(&value).map_err(|_| failure(body.clone(), ErrorKind::Verify))?;
                let (_, nested) = parse_message_set(NomBytes::new(inner))
                    .map_err(|_| failure(body.clone(), ErrorKind::Verify))?;
                message_set.compression = Compression::Gzip;
                message_set.entries.extend(nested.entries);
            }
            _ => message_set.entries.push(MessageSetEntry { offset, message }),
        }
    }

    let (rest, _) = take(rest.input_len())(rest)?;
    Ok((rest, message_set))
}

fn parse_message(s: NomBytes) -> IResult<NomBytes, Message> {
    let (s, crc) = be_u32(s)?;
    if to_crc(&s.to_bytes()) != crc {
        tracing::error!("ERROR: message crc mismatch");
        return Err(failure(s, ErrorKind::Verify));
    }
    let (s, magic) = be_i8(s)?;
    let (s, attributes) = be_i8(s)?;
    let (s, key) = parser::parse_nullable_bytes(s)?;
    let (s, value) = parser::parse_nullable_bytes(s)?;

    Ok((
        s,
        Message {
            magic,
            attributes,
            key,
            value,
        },
    ))
}

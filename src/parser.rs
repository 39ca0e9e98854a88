//! Deserialize data from the bytecode protocol.
use bytes::Bytes;
use nom::{
    bytes::complete::take,
    combinator::{map, map_res},
    multi::many_m_n,
    number::complete::{be_i16, be_i32, be_u16, be_u32},
    IResult,
};
use nombytes::NomBytes;
use num_traits::FromPrimitive;

use crate::error::KafkaCode;

pub fn parse_kafka_code(s: NomBytes) -> IResult<NomBytes, KafkaCode> {
    map(be_i16, |n| {
        FromPrimitive::from_i16(n).unwrap_or(KafkaCode::Unknown)
    })(s)
}

pub fn parse_string(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_u16(s)?;
    let (s, string) = take(length)(s)?;
    Ok((s, string.into_bytes()))
}

/// Like [`parse_string`] but validated as utf-8.
pub fn parse_utf8_string(s: NomBytes) -> IResult<NomBytes, String> {
    map_res(parse_string, |b: Bytes| String::from_utf8(b.to_vec()))(s)
}

pub fn parse_bytes(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_u32(s)?;
    let (s, string) = take(length)(s)?;
    Ok((s, string.into_bytes()))
}

pub fn parse_array<O, E, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>, E>
where
    F: nom::Parser<NomBytes, O, E> + Copy,
    E: nom::error::ParseError<NomBytes>,
{
    move |input: NomBytes| {
        let i = input.clone();
        let (i, length) = be_i32(i)?;
        if length <= 0 {
            return Ok((i, vec![]));
        }
        many_m_n(length as usize, length as usize, f)(i)
    }
}

pub fn parse_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i16(s)?;
    if length == -1 {
        return Ok((s, None));
    }

    let (s, string) = take(length as u16)(s)?;
    Ok((s, Some(string.into_bytes())))
}

pub fn parse_nullable_utf8_string(s: NomBytes) -> IResult<NomBytes, Option<String>> {
    map_res(parse_nullable_string, |b: Option<Bytes>| {
        b.map(|b| String::from_utf8(b.to_vec())).transpose()
    })(s)
}

pub fn parse_nullable_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i32(s)?;
    if length == -1 {
        return Ok((s, None));
    }

    let (s, bytes) = take(length as u32)(s)?;
    Ok((s, Some(bytes.into_bytes())))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_string() {
        let buf = NomBytes::from(b"\x00\x04\x72\x75\x73\x74" as &[u8]);

        assert_eq!(
            parse_string(buf).unwrap().1,
            NomBytes::from(b"\x72\x75\x73\x74" as &[u8]).to_bytes()
        );
    }

    #[test]
    fn test_parse_utf8_rejects_invalid() {
        let buf = NomBytes::from(b"\x00\x02\xff\xfe" as &[u8]);
        assert!(parse_utf8_string(buf).is_err());
    }

    #[test]
    fn test_parse_nullable() {
        let buf = NomBytes::from(b"\xff\xff\xff\xff\xff\xff\x00\x00" as &[u8]);
        let (buf, s) = parse_nullable_utf8_string(buf).unwrap();
        assert_eq!(s, None);
        let (buf, b) = parse_nullable_bytes(buf).unwrap();
        assert_eq!(b, None);
        let (_, s) = parse_nullable_utf8_string(buf).unwrap();
        assert_eq!(s, Some(String::new()));
    }

    #[test]
    fn test_parse_kafka_code_unknown_value() {
        let buf = NomBytes::from(b"\x03\xe7" as &[u8]);
        assert_eq!(parse_kafka_code(buf).unwrap().1, KafkaCode::Unknown);
    }

    #[test]
    fn test_parse_array() {
        let buf = NomBytes::from(
            [
                0, 0, 0, 2, // array size
                0, 4, 114, 117, 115, 116, // string
                0, 4, 114, 117, 115, 116, // string
                0, 0, 0, // leftover input
            ]
            .as_slice(),
        );

        assert_eq!(
            parse_array(parse_utf8_string)(buf).unwrap().1,
            vec![String::from("rust"), String::from("rust")]
        );
    }

    #[test]
    fn test_parse_null_array() {
        let buf = NomBytes::from([0xff, 0xff, 0xff, 0xff].as_slice());
        assert!(parse_array(parse_utf8_string)(buf).unwrap().1.is_empty());
    }
}

//! Look up the offsets available in a partition.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use nombytes::NomBytes;

    use super::*;
    use crate::{
        encode::ToByte,
        error::{Error, KafkaCode},
    };

    #[test]
    fn encode() {
        let b = [
            255, 255, 255, 255, 0, 0, 0, 1, 0, 9, 112, 117, 114, 99, 104, 97, 115, 101, 115, 0, 0,
            0, 1, 0, 0, 0, 0, 255, 255, 255, 255, 255, 255, 255, 254, 0, 0, 0, 1,
        ];

        let mut req = request::ListOffsetsRequest::new();
        req.add("purchases", 0, request::OffsetTime::Earliest, 1);

        let mut buffer = vec![];
        req.encode(&mut buffer).unwrap();
        assert_eq!(buffer, b);

        let (_, parsed) =
            request::parse_list_offsets_request(NomBytes::new(Bytes::from(buffer))).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn parse() {
        let b = b"\x00\x00\x00\x01\x00\tpurchases\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x02\x00\x00\x00\x00\x00\x00\x00*\x00\x00\x00\x00\x00\x00\x00\x00";

        let (_, parsed) =
            response::parse_list_offsets_response(NomBytes::from(b.as_slice())).unwrap();
        assert_eq!(parsed.topics[0].partitions[0].offsets, vec![42, 0]);
        assert_eq!(parsed.offset_for("purchases", 0), Ok(Some(42)));
        assert_eq!(parsed.offset_for("purchases", 1), Ok(None));
    }

    #[test]
    fn partition_error() {
        let res = response::ListOffsetsResponse {
            topics: vec![response::Topic {
                name: "purchases".to_string(),
                partitions: vec![response::Partition {
                    partition_index: 0,
                    error_code: KafkaCode::UnknownTopicOrPartition,
                    offsets: vec![],
                }],
            }],
        };
        assert_eq!(
            res.offset_for("purchases", 0),
            Err(Error::KafkaError(KafkaCode::UnknownTopicOrPartition))
        );
    }
}

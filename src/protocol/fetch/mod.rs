//! Fetch messages from a broker.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use nombytes::NomBytes;

    use super::*;
    use crate::{encode::ToByte, error::KafkaCode};

    #[test]
    fn encode() {
        let b = [
            255, 255, 255, 255, 0, 0, 7, 208, 0, 0, 0, 100, 0, 0, 0, 1, 0, 9, 112, 117, 114, 99,
            104, 97, 115, 101, 115, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 117, 48, 0, 0, 117,
            48,
        ];

        let max_wait_ms = 2000;
        let min_bytes = 100;
        let max_bytes = 30000;
        let partition = 1;
        let topic_name = "purchases";
        let committed_offset = 30000;

        let mut req = request::FetchRequest::new(max_wait_ms, min_bytes);
        req.add(topic_name, partition, committed_offset, max_bytes);
        // a second add for the same partition is ignored
        req.add(topic_name, partition, 5, max_bytes);

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();
        assert_eq!(buffer, b);

        let (_, parsed) = request::parse_fetch_request(NomBytes::new(Bytes::from(buffer))).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn parse_drops_partial_tail() {
        let b = b"\x00\x00\x00\x01\x00\x06orders\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\n\x00\x00\x00O\x00\x00\x00\x00\x00\x00\x00\x07\x00\x00\x00\x11\x0c\x94\xf8\x9c\x00\x00\xff\xff\xff\xff\x00\x00\x00\x03one\x00\x00\x00\x00\x00\x00\x00\x08\x00\x00\x00\x12\xb7\x7f-\xf3\x00\x00\x00\x00\x00\x01k\x00\x00\x00\x03two\x00\x00\x00\x00\x00\x00\x00\t\x00\x00\x00\x13\xf7r\x04\xc1\x00\x00\xff\xff";

        let (rest, parsed) = response::parse_fetch_response(NomBytes::from(b.as_slice())).unwrap();
        assert!(rest.to_bytes().is_empty());
        assert_eq!(parsed.record_count(), 2);
        assert_eq!(parsed.topics[0].partitions[0].high_water_mark, 10);
        assert!(parsed.errors().is_empty());

        let messages: Vec<response::FetchedMessage> = parsed.into_messages().collect();
        assert_eq!(
            messages[0],
            response::FetchedMessage {
                topic: "orders".to_string(),
                partition: 0,
                offset: 7,
                key: None,
                value: Some(Bytes::from_static(b"one")),
            }
        );
        assert_eq!(messages[1].offset, 8);
        assert_eq!(messages[1].key, Some(Bytes::from_static(b"k")));
    }

    #[test]
    fn partition_errors_are_skipped() {
        let res = response::FetchResponse {
            topics: vec![response::Topic {
                name: "orders".to_string(),
                partitions: vec![response::Partition {
                    id: 2,
                    error_code: KafkaCode::OffsetOutOfRange,
                    high_water_mark: -1,
                    message_set: Default::default(),
                }],
            }],
        };
        let mut buffer = vec![];
        res.encode(&mut buffer).unwrap();
        let (_, parsed) =
            response::parse_fetch_response(NomBytes::new(Bytes::from(buffer))).unwrap();
        assert_eq!(parsed, res);
        assert_eq!(parsed.errors(), vec![("orders", 2, KafkaCode::OffsetOutOfRange)]);
        assert_eq!(parsed.into_messages().count(), 0);
    }
}

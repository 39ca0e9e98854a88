//! Error types surfaced by the client.
//!
//! Broker-returned codes are carried as [`KafkaCode`] inside
//! [`Error::KafkaError`]. Everything else describes a local fault:
//! the socket, the codec, or a caller mistake caught before any I/O.

use std::fmt;

use bytes::Bytes;
use num_derive::FromPrimitive;

use crate::{coordinator::CoordinatorState, protocol::ApiKey};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The broker answered with a non-zero error code.
    KafkaError(KafkaCode),
    /// The socket failed to connect, read or write.
    IoError(std::io::ErrorKind),
    /// A value could not be rendered into the wire format.
    EncodingError,
    /// The bytes could not be parsed, the raw buffer is kept for debugging.
    ParsingError(Bytes),
    CompressionError,
    MissingBrokerConfigOptions,
    NoLeaderForTopicPartition(String, i32),
    NoPartitionsForTopic(String),
    /// Malformed arguments rejected before touching the network.
    ArgumentError(String),
    /// An offset older than the one already saved was submitted.
    OffsetOutOfRange {
        topic: String,
        partition: i32,
        saved: i64,
        offset: i64,
    },
    CorrelationMismatch {
        expected: i32,
        actual: i32,
    },
    /// A response body of another api than the one requested.
    UnexpectedResponse(ApiKey),
    /// The connection pool was torn down.
    PoolReleased,
    Timeout,
    CoordinatorNotReady(CoordinatorState),
    /// Leaving or heartbeating requires a member id.
    NotAMember,
    /// The join/sync retry budget ran out, carrying the last code seen.
    RetriesExhausted(KafkaCode),
    /// The producer queue was closed or its worker stopped.
    QueueClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KafkaError(code) => write!(f, "broker returned error code {:?}", code),
            Error::IoError(kind) => write!(f, "socket error: {:?}", kind),
            Error::EncodingError => write!(f, "value does not fit the wire format"),
            Error::ParsingError(bytes) => write!(f, "could not parse {} bytes", bytes.len()),
            Error::CompressionError => write!(f, "could not (de)compress message set"),
            Error::MissingBrokerConfigOptions => write!(f, "broker address is missing or invalid"),
            Error::NoLeaderForTopicPartition(topic, partition) => {
                write!(f, "no leader for {}:{}", topic, partition)
            }
            Error::NoPartitionsForTopic(topic) => write!(f, "topic {} has no partitions", topic),
            Error::ArgumentError(reason) => write!(f, "invalid argument: {}", reason),
            Error::OffsetOutOfRange {
                topic,
                partition,
                saved,
                offset,
            } => write!(
                f,
                "offset {} for {}:{} is behind saved offset {}",
                offset, topic, partition, saved
            ),
            Error::CorrelationMismatch { expected, actual } => write!(
                f,
                "expected correlation id {} but received {}",
                expected, actual
            ),
            Error::UnexpectedResponse(api_key) => {
                write!(f, "unexpected {:?} response", api_key)
            }
            Error::PoolReleased => write!(f, "connection pool has been released"),
            Error::Timeout => write!(f, "request timed out"),
            Error::CoordinatorNotReady(state) => {
                write!(f, "group coordinator is not stable (state {:?})", state)
            }
            Error::NotAMember => write!(f, "not a member of the group"),
            Error::RetriesExhausted(code) => {
                write!(f, "rebalance retries exhausted, last code {:?}", code)
            }
            Error::QueueClosed => write!(f, "producer queue is closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.kind())
    }
}

/// Various errors reported by a remote Kafka server.
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive)]
pub enum KafkaCode {
    /// An unexpected server error
    Unknown = -1,
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// This error is thrown if we are in the middle of a leadership
    /// election and there is currently no leader for this partition
    /// and hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// This error is thrown if the client attempts to send messages
    /// to a replica that is not the leader for some partition. It
    /// indicates that the clients metadata is out of date.
    NotLeaderForPartition = 6,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut = 7,
    /// This is not a client facing error and is used mostly by tools
    /// when a broker is not alive.
    BrokerNotAvailable = 8,
    /// If replica is expected on a broker, but is not (this can be
    /// safely ignored).
    ReplicaNotAvailable = 9,
    /// The server has a configurable maximum message size to avoid
    /// unbounded memory allocation. This error is thrown if the
    /// client attempt to produce a message larger than this maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// If you specify a string larger than configured maximum for
    /// offset metadata
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The broker returns this error code for an offset fetch request
    /// if it is still loading offsets (after a leader change for that
    /// offsets topic partition), or in response to group membership
    /// requests (such as heartbeats) when group metadata is being
    /// loaded by the coordinator.
    GroupLoadInProgress = 14,
    /// The broker returns this error code for group coordinator
    /// requests, offset commits, and most group management requests
    /// if the offsets topic has not yet been created, or if the group
    /// coordinator is not active.
    GroupCoordinatorNotAvailable = 15,
    /// The broker returns this error code if it receives an offset
    /// fetch or commit request for a group that it is not a
    /// coordinator for.
    NotCoordinatorForGroup = 16,
    /// For a request which attempts to access an invalid topic
    /// (e.g. one which has an illegal name), or if an attempt is made
    /// to write to an internal topic (such as the consumer offsets
    /// topic).
    InvalidTopic = 17,
    /// If a message batch in a produce request exceeds the maximum
    /// configured segment size.
    RecordListTooLarge = 18,
    /// Returned from a produce request when the number of in-sync
    /// replicas is lower than the configured minimum and requiredAcks is
    /// -1.
    NotEnoughReplicas = 19,
    /// Returned from a produce request when the message was written
    /// to the log, but with fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend = 20,
    /// Returned from a produce request if the requested requiredAcks is
    /// invalid (anything other than -1, 1, or 0).
    InvalidRequiredAcks = 21,
    /// Returned from group membership requests (such as heartbeats) when
    /// the generation id provided in the request is not the current
    /// generation.
    IllegalGeneration = 22,
    /// Returned in join group when the member provides a protocol type or
    /// set of protocols which is not compatible with the current group.
    InconsistentGroupProtocol = 23,
    /// Returned in join group when the groupId is empty or null.
    InvalidGroupId = 24,
    /// Returned from group requests (offset commits/fetches, heartbeats,
    /// etc) when the memberId is not in the current generation.
    UnknownMemberId = 25,
    /// Return in join group when the requested session timeout is
    /// outside of the allowed range on the broker
    InvalidSessionTimeout = 26,
    /// Returned in heartbeat requests when the coordinator has begun
    /// rebalancing the group. This indicates to the client that it
    /// should rejoin the group.
    RebalanceInProgress = 27,
    /// This error indicates that an offset commit was rejected because of
    /// oversize metadata.
    InvalidCommitOffsetSize = 28,
    /// Returned by the broker when the client is not authorized to access
    /// the requested topic.
    TopicAuthorizationFailed = 29,
    /// Returned by the broker when the client is not authorized to access
    /// a particular groupId.
    GroupAuthorizationFailed = 30,
}

impl KafkaCode {
    /// Codes that a join/sync retry can absorb while the group settles.
    pub fn is_rebalance_race(&self) -> bool {
        matches!(
            self,
            KafkaCode::RebalanceInProgress
                | KafkaCode::IllegalGeneration
                | KafkaCode::UnknownMemberId
                | KafkaCode::GroupLoadInProgress
                | KafkaCode::GroupCoordinatorNotAvailable
                | KafkaCode::NotCoordinatorForGroup
        )
    }

    /// Codes that mean the cached partition leader is stale.
    pub fn is_leadership_error(&self) -> bool {
        matches!(
            self,
            KafkaCode::NotLeaderForPartition
                | KafkaCode::LeaderNotAvailable
                | KafkaCode::UnknownTopicOrPartition
        )
    }
}

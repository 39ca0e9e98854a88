//! # Franz
//! Rust-native client for the version 0 Kafka protocol.
//!
//! The crate speaks thirteen APIs over plain TCP: produce, fetch, list
//! offsets, metadata, offset commit and fetch, group coordinator lookup
//! and the group membership family (join, sync, heartbeat, leave, list,
//! describe). On top of the codec sit a pooled transport, a metadata
//! cache, a group coordinator state machine, an offset recorder, a
//! batching producer and a group consumer.
//!
//! ## Table of contents
//! - [Getting started](#getting-started)
//!     - [Producer](#producer)
//!     - [Consumer](#consumer)
//! - [Layers](#layers)
//! - [Resources](#resources)
//!
//! ## Getting started
//! ```toml
//! franz = "0.1"
//! ```
//!
//! ### Producer
//! A [`Producer`](prelude::Producer) sends messages to the leader of a
//! partition picked round robin (or at random). To instantiate one, start
//! with a [`ProducerBuilder`](prelude::ProducerBuilder).
//!
//! Batches that reach either compression threshold travel as a single
//! gzip record. A [`ProducerQueue`](prelude::ProducerQueue) buffers
//! messages per partition and flushes on size or on time.
//! ```rust,ignore
//! let producer = std::sync::Arc::new(
//!     franz::prelude::ProducerBuilder::new(&["127.0.0.1:9092"])?
//!         .throttle_size(20)
//!         .throttle_ms(1000)
//!         .build()?,
//! );
//!
//! let message = franz::prelude::Message::new(
//!     Some(bytes::Bytes::from_static(b"Tester")),
//!     Some(bytes::Bytes::from_static(b"Value")),
//! );
//! producer.send("my-topic", vec![message.clone()]).await?;
//!
//! let queue = producer.queue();
//! queue.enqueue("my-topic", vec![message]).await?;
//! queue.close().await?;
//! ```
//!
//! ### Consumer
//! A [`Consumer`](prelude::Consumer) is one member of a consumer group.
//! It joins through its [`Coordinator`](prelude::Coordinator), reads the
//! partitions the group leader assigned to it and records its progress
//! with an [`OffsetRecorder`](prelude::OffsetRecorder).
//! ```rust,ignore
//! let consumer = franz::prelude::ConsumerBuilder::new(
//!     &["127.0.0.1:9092"],
//!     "The Data Boyz",
//!     &["my-topic"],
//! )?
//! .build()?;
//! consumer.join().await?;
//!
//! let (cancel, cancelled) = tokio::sync::watch::channel(false);
//! let stream = consumer.stream("my-topic", cancelled);
//! // have to pin streams before iterating
//! tokio::pin!(stream);
//!
//! // Stream will do nothing unless consumed.
//! while let Some(message) = stream.next().await {
//!     println!("{:?}", message?);
//! }
//! ```
//!
//! ## Layers
//! - [`protocol`](prelude::protocol): request and response types, each able
//!   to encode and parse itself, plus the api key tables.
//! - [`network`](prelude::network): sockets, the object pool and the per
//!   broker connection factory.
//! - [`Client`](prelude::Client): the pooled [`Transport`](prelude::Transport).
//! - [`MetadataCache`](prelude::MetadataCache) and
//!   [`PartitionDispatcher`](prelude::PartitionDispatcher).
//!
//! ## Resources
//! - [Kafka Protocol Spec](https://kafka.apache.org/protocol.html)
//! - [Confluence Docs](https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol)

mod assignor;
mod client;
mod consumer;
mod consumer_builder;
mod coordinator;
mod encode;
mod error;
mod metadata;
mod network;
mod offset_recorder;
mod parser;
mod producer;
mod producer_builder;
mod protocol;
mod utils;

#[cfg(test)]
mod testing;

const DEFAULT_CORRELATION_ID: i32 = 1;
const DEFAULT_CLIENT_ID: &str = "franz";

pub mod prelude {
    //! Main export of various structures and methods
    //!
    //! # Producing
    //! [`Producer`] sends right away, [`ProducerQueue`] batches. Both are
    //! configured through [`ProducerBuilder`] or [`ProducerConfig`].
    //!
    //! # Consuming
    //! [`Consumer`] wraps a [`Coordinator`] and an [`OffsetRecorder`].
    //! Build one with [`ConsumerBuilder`].
    //!
    //! # Lower level
    //! Anything implementing [`Transport`] can drive the components above.
    //! [`send`] submits any request type and casts the answer:
    //! ```rust,ignore
    //! let client = Client::new(ClientConfig::new(&["127.0.0.1:9092"])?);
    //! let broker = client.bootstrap_addrs()[0].clone();
    //! let response: protocol::MetadataResponse =
    //!     send(&client, &broker, protocol::MetadataRequest::new(&["my-topic"])).await?;
    //! ```
    pub use crate::assignor::{assign, subscribed_topics, CONSUMER_PROTOCOL_TYPE, ROUND_ROBIN_PROTOCOL};
    pub use crate::client::{send, Client, ClientConfig, CorrelationSequence, Transport};
    pub use crate::consumer::{Consumer, ConsumerConfig, FetchBatch};
    pub use crate::consumer_builder::ConsumerBuilder;
    pub use crate::coordinator::{Coordinator, CoordinatorConfig, CoordinatorState, Membership};
    pub use crate::error::{Error, KafkaCode, Result};
    pub use crate::metadata::{
        MetadataCache, PartitionDispatcher, PartitionStrategy, TopicPartition, OFFSETS_TOPIC,
    };
    pub use crate::offset_recorder::{CommitPolicy, OffsetRecorder, PartitionOffsets};
    pub use crate::producer::{Producer, ProducerConfig, ProducerQueue};
    pub use crate::producer_builder::ProducerBuilder;
    pub use crate::protocol::{fetch::response::FetchedMessage, Compression, Message, MessageSet};

    pub use bytes;

    pub mod encode {
        pub use crate::encode::*;
    }

    pub mod network {
        pub use crate::network::*;
        pub use crate::network::pool::{Lease, Manager, ObjectPool, PoolState};
    }

    pub mod protocol {
        pub use crate::protocol::*;
    }
}

use std::sync::Arc;
use std::time::Duration;

use crate::client::{Client, ClientConfig, Transport};
use crate::error::Result;
use crate::metadata::{MetadataCache, PartitionStrategy};
use crate::producer::{Producer, ProducerConfig};
use crate::protocol::Compression;

/// Configure a [`Producer`].
///
/// The builder only collects settings; [`build`](Self::build) creates
/// the pooled client and the metadata cache the producer runs on.
///
/// ### Example
/// ```rust,ignore
/// let producer = franz::prelude::ProducerBuilder::new(&["127.0.0.1:9092"])?
///     .throttle_size(2)
///     .throttle_ms(10)
///     .build()?;
///
/// let queue = std::sync::Arc::new(producer).queue();
/// queue.enqueue("my-topic", messages).await?;
/// queue.close().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProducerBuilder {
    client_config: ClientConfig,
    config: ProducerConfig,
}

impl ProducerBuilder {
    /// Start a producer builder. To complete, use the [`build`](Self::build) method.
    pub fn new<T: AsRef<str>>(bootstrap_addrs: &[T]) -> Result<Self> {
        Ok(Self {
            client_config: ClientConfig::new(bootstrap_addrs)?,
            config: ProducerConfig::default(),
        })
    }

    pub fn client_id(&mut self, client_id: &str) -> &mut Self {
        self.client_config = self.client_config.clone().client_id(client_id);
        self
    }

    pub fn request_timeout(&mut self, request_timeout: Duration) -> &mut Self {
        self.client_config = self.client_config.clone().request_timeout(request_timeout);
        self
    }

    /// The number of acknowledgments the producer requires the leader to have received before considering a request complete. Allowed values: 0 for no acknowledgments, 1 for only the leader and -1 for the full ISR.
    pub fn required_acks(&mut self, required_acks: i16) -> &mut Self {
        self.config.required_acks = required_acks;
        self
    }

    /// The time the broker may spend collecting acknowledgments, in milliseconds.
    pub fn timeout_ms(&mut self, timeout_ms: i32) -> &mut Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    /// The max number of messages that will sit in a queue buffer.
    ///
    /// When a buffer reaches this size it is flushed, unless the
    /// [`throttle_ms`](Self::throttle_ms) window closed first.
    ///
    /// Increasing this number will increase latency, but also increase throughput.
    pub fn throttle_size(&mut self, throttle_size: usize) -> &mut Self {
        self.config.throttle_size = throttle_size;
        self
    }

    /// The maximum time a message will sit in a queue buffer.
    ///
    /// Decreasing this number will lower latency, but also lower throughput.
    pub fn throttle_ms(&mut self, throttle_ms: u64) -> &mut Self {
        self.config.throttle_ms = throttle_ms;
        self
    }

    pub fn compression(&mut self, algo: Compression) -> &mut Self {
        self.config.compression = algo;
        self
    }

    /// Batches with fewer messages and fewer bytes than these are sent uncompressed.
    pub fn compression_thresholds(&mut self, min_messages: usize, min_bytes: usize) -> &mut Self {
        self.config.compression_min_messages = min_messages;
        self.config.compression_min_bytes = min_bytes;
        self
    }

    pub fn partition_strategy(&mut self, strategy: PartitionStrategy) -> &mut Self {
        self.config.partition_strategy = strategy;
        self
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Connect the producer through a pooled TCP [`Client`].
    pub fn build(&self) -> Result<Producer> {
        let client = Client::new(self.client_config.clone());
        self.build_with_transport(Arc::new(client))
    }

    /// Run the producer over any [`Transport`].
    pub fn build_with_transport(&self, transport: Arc<dyn Transport>) -> Result<Producer> {
        let metadata = MetadataCache::new(transport, self.client_config.bootstrap_addrs.clone())?;
        Ok(Producer::new(Arc::new(metadata), self.config.clone()))
    }
}

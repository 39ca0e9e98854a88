//! Client that sends records to a cluster.
//!
//! [`Producer::send`] writes one batch straight to the leader of a
//! partition. [`Producer::queue`] hands out a [`ProducerQueue`] that
//! keeps one buffer per topic partition and flushes it once it holds
//! `throttle_size` messages or its oldest message waited `throttle_ms`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::instrument;

use crate::{
    client,
    error::{Error, Result},
    metadata::{MetadataCache, PartitionDispatcher, PartitionStrategy},
    protocol::{Compression, Message, MessageSet, ProduceRequest, ProduceResponse},
};

pub const DEFAULT_REQUIRED_ACKS: i16 = 1;
pub const DEFAULT_TIMEOUT_MS: i32 = 10;
pub const DEFAULT_THROTTLE_SIZE: usize = 20;
pub const DEFAULT_THROTTLE_MS: u64 = 1000;
pub const DEFAULT_COMPRESSION_MIN_MESSAGES: usize = 5;
pub const DEFAULT_COMPRESSION_MIN_BYTES: usize = 4096;

// commands buffered between queue handles and the worker
const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    /// Acknowledgments the leader waits for: 0 none, 1 leader only,
    /// -1 the full ISR.
    pub required_acks: i16,
    /// How long the broker may wait for those acknowledgments.
    pub timeout_ms: i32,
    /// Messages a queue buffer holds before it is flushed.
    pub throttle_size: usize,
    /// Longest time a queued message waits before it is flushed.
    pub throttle_ms: u64,
    /// Codec used once a batch reaches one of the thresholds below.
    /// Only `None` and `Gzip` can be encoded.
    pub compression: Compression,
    pub compression_min_messages: usize,
    pub compression_min_bytes: usize,
    pub partition_strategy: PartitionStrategy,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            required_acks: DEFAULT_REQUIRED_ACKS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            throttle_size: DEFAULT_THROTTLE_SIZE,
            throttle_ms: DEFAULT_THROTTLE_MS,
            compression: Compression::Gzip,
            compression_min_messages: DEFAULT_COMPRESSION_MIN_MESSAGES,
            compression_min_bytes: DEFAULT_COMPRESSION_MIN_BYTES,
            partition_strategy: PartitionStrategy::default(),
        }
    }
}

/// Kafka Producer.
///
/// Partitions are chosen by a [`PartitionDispatcher`] and leaders are
/// looked up in the shared [`MetadataCache`]. A leadership error in a
/// produce response refreshes the topic before the error is returned, so
/// the caller's retry goes to the new leader.
///
/// ### Example
/// ```rust,ignore
/// let producer = franz::prelude::ProducerBuilder::new(&["127.0.0.1:9092"])?
///     .throttle_size(50)
///     .build()?;
///
/// let message = franz::prelude::Message::new(None, Some(bytes::Bytes::from_static(b"Value")));
/// producer.send("my-topic", vec![message]).await?;
/// ```
#[derive(Debug)]
pub struct Producer {
    metadata: Arc<MetadataCache>,
    dispatcher: PartitionDispatcher,
    config: ProducerConfig,
}

impl Producer {
    pub fn new(metadata: Arc<MetadataCache>, config: ProducerConfig) -> Self {
        let dispatcher = PartitionDispatcher::new(metadata.clone(), config.partition_strategy);
        Self {
            metadata,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    /// Send `messages` to the next partition of `topic`.
    pub async fn send(&self, topic: &str, messages: Vec<Message>) -> Result<ProduceResponse> {
        validate(topic, &messages)?;
        let partition = self.dispatcher.next_partition(topic).await?;
        self.send_to(topic, partition.partition, messages).await
    }

    /// Send `messages` to one partition of `topic`.
    #[instrument(level = "debug", skip(self, messages), fields(count = messages.len()))]
    pub async fn send_to(
        &self,
        topic: &str,
        partition: i32,
        messages: Vec<Message>,
    ) -> Result<ProduceResponse> {
        validate(topic, &messages)?;
        let leader = self.metadata.leader_address(topic, partition).await?;

        let mut request = ProduceRequest::new(self.config.required_acks, self.config.timeout_ms);
        request.add(topic, partition, self.message_set(messages));
        tracing::debug!(
            "Producing {} messages to {}:{} on {}",
            request.message_count(),
            topic,
            partition,
            leader
        );

        let response: ProduceResponse =
            client::send(self.metadata.transport().as_ref(), &leader, request).await?;
        if let Err(err) = response.is_error() {
            if let Error::KafkaError(code) = &err {
                if code.is_leadership_error() {
                    tracing::warn!("Leader of {}:{} moved ({:?}), refreshing", topic, partition, code);
                    if let Err(refresh) = self.metadata.refresh_topic(topic).await {
                        tracing::warn!("Could not refresh {}: {}", topic, refresh);
                    }
                }
            }
            return Err(err);
        }
        Ok(response)
    }

    /// Wrap `messages` into a set, compressed once the batch reaches
    /// either threshold.
    pub fn message_set(&self, messages: Vec<Message>) -> MessageSet {
        let bytes: usize = messages.iter().map(Message::encoded_len).sum();
        let small = messages.len() < self.config.compression_min_messages
            && bytes < self.config.compression_min_bytes;
        let compression = if small {
            Compression::None
        } else {
            self.config.compression
        };
        MessageSet::new(messages, compression)
    }

    /// Start a batching queue on top of this producer. Must be called
    /// from within a tokio runtime.
    pub fn queue(self: &Arc<Self>) -> ProducerQueue {
        ProducerQueue::new(self.clone())
    }
}

fn validate(topic: &str, messages: &[Message]) -> Result<()> {
    if topic.is_empty() {
        return Err(Error::ArgumentError("topic must not be empty".to_owned()));
    }
    if messages.is_empty() {
        return Err(Error::ArgumentError("no messages to send".to_owned()));
    }
    Ok(())
}

enum Command {
    Enqueue {
        topic: String,
        partition: i32,
        messages: Vec<Message>,
    },
    Flush(oneshot::Sender<Result<()>>),
}

/// Per topic partition buffers drained by a background worker.
///
/// Flushes triggered by size or time log their failures and keep the
/// first one; the next [`flush`](Self::flush) or [`close`](Self::close)
/// returns it.
pub struct ProducerQueue {
    producer: Arc<Producer>,
    sender: mpsc::Sender<Command>,
    worker: JoinHandle<()>,
}

impl std::fmt::Debug for ProducerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerQueue")
            .field("config", &self.producer.config)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl ProducerQueue {
    fn new(producer: Arc<Producer>) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(queue_worker(producer.clone(), receiver));
        Self {
            producer,
            sender,
            worker,
        }
    }

    /// Buffer `messages` for the next partition of `topic`.
    pub async fn enqueue(&self, topic: &str, messages: Vec<Message>) -> Result<()> {
        validate(topic, &messages)?;
        let partition = self.producer.dispatcher.next_partition(topic).await?;
        self.enqueue_to(topic, partition.partition, messages).await
    }

    pub async fn enqueue_to(&self, topic: &str, partition: i32, messages: Vec<Message>) -> Result<()> {
        validate(topic, &messages)?;
        self.sender
            .send(Command::Enqueue {
                topic: topic.to_owned(),
                partition,
                messages,
            })
            .await
            .map_err(|_| Error::QueueClosed)
    }

    /// Send everything buffered so far.
    pub async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.sender
            .send(Command::Flush(reply))
            .await
            .map_err(|_| Error::QueueClosed)?;
        done.await.map_err(|_| Error::QueueClosed)?
    }

    /// Flush and stop the worker.
    pub async fn close(self) -> Result<()> {
        let flushed = self.flush().await;
        drop(self.sender);
        if let Err(err) = self.worker.await {
            tracing::error!("Producer queue worker failed {:?}", err);
            return Err(Error::QueueClosed);
        }
        flushed
    }
}

struct Pending {
    messages: Vec<Message>,
    since: Instant,
}

async fn queue_worker(producer: Arc<Producer>, mut receiver: mpsc::Receiver<Command>) {
    let throttle = Duration::from_millis(producer.config.throttle_ms);
    let mut pending: HashMap<(String, i32), Pending> = HashMap::new();
    // first failure of a background flush, owed to the next flush caller
    let mut deferred: Option<Error> = None;

    loop {
        let deadline = pending.values().map(|p| p.since + throttle).min();

        tokio::select! {
            command = receiver.recv() => match command {
                Some(Command::Enqueue { topic, partition, messages }) => {
                    let key = (topic, partition);
                    let buffer = pending.entry(key.clone()).or_insert_with(|| Pending {
                        messages: vec![],
                        since: Instant::now(),
                    });
                    buffer.messages.extend(messages);
                    if buffer.messages.len() >= producer.config.throttle_size {
                        if let Some(full) = pending.remove(&key) {
                            defer_failure(&mut deferred, flush_partition(&producer, &key, full.messages).await);
                        }
                    }
                }
                Some(Command::Flush(reply)) => {
                    let flushed = flush_all(&producer, &mut pending).await;
                    let result = match deferred.take() {
                        Some(err) => Err(err),
                        None => flushed,
                    };
                    if reply.send(result).is_err() {
                        tracing::debug!("Flush requester went away");
                    }
                }
                None => {
                    defer_failure(&mut deferred, flush_all(&producer, &mut pending).await);
                    if let Some(err) = deferred.take() {
                        tracing::error!("Producer queue closed with an unreported failure {:?}", err);
                    }
                    tracing::debug!("Producer queue closed");
                    break;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let now = Instant::now();
                let expired = pending
                    .iter()
                    .filter(|(_, p)| p.since + throttle <= now)
                    .map(|(key, _)| key.clone())
                    .collect::<Vec<_>>();
                for key in expired {
                    if let Some(stale) = pending.remove(&key) {
                        defer_failure(&mut deferred, flush_partition(&producer, &key, stale.messages).await);
                    }
                }
            }
        }
    }
}

async fn flush_all(producer: &Producer, pending: &mut HashMap<(String, i32), Pending>) -> Result<()> {
    let mut first_error = None;
    for (key, buffer) in pending.drain() {
        if let Err(err) = flush_partition(producer, &key, buffer.messages).await {
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// sends in chunks of at most `throttle_size` messages; a failed chunk
// does not stop the ones after it
async fn flush_partition(producer: &Producer, key: &(String, i32), messages: Vec<Message>) -> Result<()> {
    let (topic, partition) = key;
    let chunk_size = producer.config.throttle_size.max(1);
    let mut first_error = None;
    let mut dropped = 0;
    let mut messages = messages.into_iter().peekable();
    while messages.peek().is_some() {
        let chunk = messages.by_ref().take(chunk_size).collect::<Vec<_>>();
        let count = chunk.len();
        if let Err(err) = producer.send_to(topic, *partition, chunk).await {
            dropped += count;
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => {
            tracing::error!(
                "ERROR: Dropped {} messages for {}:{} {:?}",
                dropped,
                topic,
                partition,
                err
            );
            Err(err)
        }
        None => Ok(()),
    }
}

fn defer_failure(deferred: &mut Option<Error>, result: Result<()>) {
    if let Err(err) = result {
        tracing::error!("Error in producer queue {:?}", err);
        deferred.get_or_insert(err);
    }
}

impl ProducerConfig {
    pub fn required_acks(mut self, required_acks: i16) -> Self {
        self.required_acks = required_acks;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn throttle_size(mut self, throttle_size: usize) -> Self {
        self.throttle_size = throttle_size;
        self
    }

    pub fn throttle_ms(mut self, throttle_ms: u64) -> Self {
        self.throttle_ms = throttle_ms;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn compression_min_messages(mut self, compression_min_messages: usize) -> Self {
        self.compression_min_messages = compression_min_messages;
        self
    }

    pub fn compression_min_bytes(mut self, compression_min_bytes: usize) -> Self {
        self.compression_min_bytes = compression_min_bytes;
        self
    }

    pub fn partition_strategy(mut self, partition_strategy: PartitionStrategy) -> Self {
        self.partition_strategy = partition_strategy;
        self
    }
}

//! Client that consumes records as a member of a group.
//!
//! A [`Consumer`] reads the partitions its [`Coordinator`] assigned to
//! it, one partition per fetch in round robin order, starting from the
//! offsets its [`OffsetRecorder`] resolved. Progress only moves when the
//! caller acknowledges a record, either through [`Consumer::advance`] or
//! implicitly by pulling the next item of [`Consumer::stream`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{watch, Mutex};
use tokio_stream::Stream;
use tracing::instrument;

use crate::{
    client,
    coordinator::Coordinator,
    error::{Error, Result},
    metadata::MetadataCache,
    offset_recorder::{CommitPolicy, OffsetRecorder},
    protocol::{fetch::response::FetchedMessage, FetchRequest, FetchResponse},
};

pub const DEFAULT_MAX_WAIT_MS: i32 = 1000;
pub const DEFAULT_MIN_BYTES: i32 = 1;
pub const DEFAULT_MAX_BYTES: i32 = 16384;
pub const DEFAULT_STABLE_WAIT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// How long the broker may hold a fetch waiting for `min_bytes`.
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    /// Per partition cap of one fetch.
    pub max_bytes: i32,
    /// How long a fetch waits for the group to settle.
    pub stable_wait: Duration,
    pub commit_policy: CommitPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            min_bytes: DEFAULT_MIN_BYTES,
            max_bytes: DEFAULT_MAX_BYTES,
            stable_wait: DEFAULT_STABLE_WAIT,
            commit_policy: CommitPolicy::default(),
        }
    }
}

/// Records of one partition returned by one fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchBatch {
    pub topic: String,
    pub partition: i32,
    /// The offset the fetch started from.
    pub fetch_offset: i64,
    pub high_water_mark: i64,
    /// Records at or after `fetch_offset`, in offset order.
    pub messages: Vec<FetchedMessage>,
}

impl FetchBatch {
    fn empty(topic: &str) -> Self {
        Self {
            topic: topic.to_owned(),
            partition: -1,
            fetch_offset: -1,
            high_water_mark: -1,
            messages: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

struct Cursor {
    recorder: OffsetRecorder,
    // next round robin slot per topic
    turns: HashMap<String, usize>,
}

/// Kafka Consumer Group member.
///
/// ### Example
/// ```rust,ignore
/// let consumer = franz::prelude::ConsumerBuilder::new(
///     &["127.0.0.1:9092"],
///     "my-group",
///     &["my-topic"],
/// )?
/// .build()?;
/// consumer.join().await?;
///
/// let (cancel, cancelled) = tokio::sync::watch::channel(false);
/// let stream = consumer.stream("my-topic", cancelled);
/// // have to pin streams before iterating
/// tokio::pin!(stream);
///
/// while let Some(message) = stream.next().await {
///     println!("{:?}", message?);
/// }
/// ```
pub struct Consumer {
    coordinator: Arc<Coordinator>,
    metadata: Arc<MetadataCache>,
    config: ConsumerConfig,
    cursor: Mutex<Cursor>,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("coordinator", &self.coordinator)
            .field("config", &self.config)
            .finish()
    }
}

impl Consumer {
    pub fn new(
        coordinator: Arc<Coordinator>,
        metadata: Arc<MetadataCache>,
        config: ConsumerConfig,
    ) -> Self {
        let recorder = OffsetRecorder::new(coordinator.clone(), metadata.clone(), config.commit_policy);
        Self {
            coordinator,
            metadata,
            config,
            cursor: Mutex::new(Cursor {
                recorder,
                turns: HashMap::new(),
            }),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Join the group and start heartbeating.
    pub async fn join(&self) -> Result<()> {
        self.coordinator.join().await
    }

    /// Commit what was consumed and leave the group.
    pub async fn leave(&self) -> Result<()> {
        if let Err(err) = self.commit().await {
            tracing::warn!("Final commit before leaving failed: {}", err);
        }
        self.coordinator.leave().await
    }

    /// Partitions of `topic` currently assigned to this member.
    pub async fn assigned(&self, topic: &str) -> Vec<i32> {
        let mut cursor = self.cursor.lock().await;
        self.ensure_current(&mut cursor).await;
        cursor.recorder.partitions(topic)
    }

    // a new assignment gets a new ledger; whatever the old one still
    // owes for partitions this member keeps is committed first
    async fn ensure_current(&self, cursor: &mut Cursor) {
        if cursor.recorder.is_current() {
            return;
        }
        if let Err(err) = cursor.recorder.hand_off().await {
            tracing::warn!("Commit for previous assignment failed: {}", err);
        }
        cursor.recorder = OffsetRecorder::new(
            self.coordinator.clone(),
            self.metadata.clone(),
            self.config.commit_policy,
        );
        cursor.turns.clear();
        tracing::info!(
            "Group {} assignment changed, now reading {:?}",
            self.coordinator.group_id(),
            self.coordinator.assignment()
        );
    }

    /// Fetch one batch from the next assigned partition of `topic`.
    ///
    /// Fails with [`Error::CoordinatorNotReady`] when the group does not
    /// settle within `stable_wait`. A member with no partition of `topic`
    /// gets an empty batch.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, topic: &str) -> Result<FetchBatch> {
        if !self.coordinator.topics().iter().any(|t| t == topic) {
            return Err(Error::ArgumentError(format!(
                "group {} is not subscribed to {}",
                self.coordinator.group_id(),
                topic
            )));
        }
        self.coordinator
            .wait_until_stable(self.config.stable_wait)
            .await?;

        let mut cursor = self.cursor.lock().await;
        self.ensure_current(&mut cursor).await;

        let partitions = cursor.recorder.partitions(topic);
        if partitions.is_empty() {
            tracing::debug!("No partition of {} assigned", topic);
            return Ok(FetchBatch::empty(topic));
        }
        let turn = cursor.turns.entry(topic.to_owned()).or_insert(0);
        let partition = partitions[*turn % partitions.len()];
        *turn = turn.wrapping_add(1);

        let leader = match self.metadata.leader_address(topic, partition).await {
            Ok(leader) => leader,
            Err(Error::NoLeaderForTopicPartition(..)) => {
                tracing::warn!("{}:{} has no leader yet, skipping it", topic, partition);
                return Ok(FetchBatch {
                    partition,
                    ..FetchBatch::empty(topic)
                });
            }
            Err(err) => return Err(err),
        };
        let fetch_offset = cursor.recorder.get_saved_offset(topic, partition).await?;
        drop(cursor);

        let mut request = FetchRequest::new(self.config.max_wait_ms, self.config.min_bytes);
        request.add(topic, partition, fetch_offset, self.config.max_bytes);
        let response: FetchResponse =
            client::send(self.metadata.transport().as_ref(), &leader, request).await?;

        if let Some((_, _, code)) = response.errors().first().copied() {
            tracing::error!("ERROR: Fetch from {}:{} failed with {:?}", topic, partition, code);
            if code.is_leadership_error() {
                if let Err(err) = self.metadata.refresh_topic(topic).await {
                    tracing::warn!("Could not refresh {}: {}", topic, err);
                }
            }
            return Err(Error::KafkaError(code));
        }

        let high_water_mark = response
            .topics
            .iter()
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.id == partition)
            .map(|p| p.high_water_mark)
            .unwrap_or(-1);
        // compressed wrappers come back whole, including records before
        // the requested offset
        let messages = response
            .into_messages()
            .filter(|m| m.topic == topic && m.partition == partition && m.offset >= fetch_offset)
            .collect::<Vec<_>>();
        tracing::debug!(
            "Fetched {} records from {}:{} at offset {}",
            messages.len(),
            topic,
            partition,
            fetch_offset
        );

        Ok(FetchBatch {
            topic: topic.to_owned(),
            partition,
            fetch_offset,
            high_water_mark,
            messages,
        })
    }

    /// Acknowledge `offset` of a partition. Returns whether a commit was sent.
    pub async fn advance(&self, topic: &str, partition: i32, offset: i64, force_commit: bool) -> Result<bool> {
        let mut cursor = self.cursor.lock().await;
        cursor
            .recorder
            .advance(topic, partition, offset, force_commit)
            .await
    }

    /// Commit every acknowledged offset not committed yet.
    pub async fn commit(&self) -> Result<bool> {
        self.cursor.lock().await.recorder.flush().await
    }

    /// Convert the consumer into an asynchronous iterator over `topic`.
    ///
    /// Pulling the next item acknowledges the previous one. Progress is
    /// force committed when `cancel` turns `true`, when a fetch comes back
    /// empty, when the assignment changes and when an error ends the
    /// stream. Dropping the sender of `cancel` never cancels.
    #[must_use = "stream does nothing by itself"]
    pub fn stream(
        self: &Arc<Self>,
        topic: &str,
        cancel: watch::Receiver<bool>,
    ) -> impl Stream<Item = Result<FetchedMessage>> {
        let consumer = self.clone();
        let topic = topic.to_owned();

        async_stream::stream! {
            let mut cancel = cancel;

            'fetching: loop {
                if *cancel.borrow() {
                    break;
                }
                let fetched = tokio::select! {
                    fetched = consumer.fetch(&topic) => fetched,
                    _ = cancelled(&mut cancel) => break,
                };
                let batch = match fetched {
                    Ok(batch) => batch,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                };

                if batch.is_empty() {
                    if let Err(err) = consumer.commit().await {
                        yield Err(err);
                        break;
                    }
                    tokio::task::yield_now().await;
                    continue;
                }

                let epoch = consumer.coordinator.epoch();
                for message in batch.messages {
                    if *cancel.borrow() {
                        break 'fetching;
                    }
                    if consumer.coordinator.epoch() != epoch {
                        tracing::info!("Assignment changed while reading {}:{}", topic, batch.partition);
                        continue 'fetching;
                    }

                    let (partition, offset) = (message.partition, message.offset);
                    yield Ok(message);

                    // pulled again: the previous record is done
                    if let Err(err) = consumer.advance(&topic, partition, offset, false).await {
                        yield Err(err);
                        break 'fetching;
                    }
                }
            }

            match consumer.commit().await {
                Ok(true) => tracing::info!("Committed final offsets of {}", topic),
                Ok(false) => {}
                Err(err) => yield Err(err),
            }
        }
    }
}

// resolves once the flag turns true; a dropped sender never resolves
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl ConsumerConfig {
    pub fn max_wait_ms(mut self, max_wait_ms: i32) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }

    pub fn min_bytes(mut self, min_bytes: i32) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn max_bytes(mut self, max_bytes: i32) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn stable_wait(mut self, stable_wait: Duration) -> Self {
        self.stable_wait = stable_wait;
        self
    }

    pub fn commit_policy(mut self, commit_policy: CommitPolicy) -> Self {
        self.commit_policy = commit_policy;
        self
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex as StdMutex;

    use bytes::Bytes;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::{
        coordinator::{CoordinatorConfig, CoordinatorState},
        error::KafkaCode,
        network::BrokerAddress,
        protocol::{
            commit_offset, fetch, offset_fetch, ApiKey, Compression, Message, MessageSet,
            OffsetCommitResponse, OffsetFetchResponse, RequestBody, ResponseBody,
        },
        testing::{metadata_response, solo_group_reply, FakeTransport},
    };

    type Commits = Arc<StdMutex<Vec<(i32, i64)>>>;

    struct Log {
        // values per partition, offsets start at 0
        partitions: Vec<Vec<&'static str>>,
        // serve every record in one gzip wrapper, ignoring the fetch offset
        gzip: bool,
        committed: i64,
        fetch_error: KafkaCode,
    }

    impl Log {
        fn new(partitions: Vec<Vec<&'static str>>) -> Self {
            Self {
                partitions,
                gzip: false,
                committed: -1,
                fetch_error: KafkaCode::None,
            }
        }
    }

    fn fetch_reply(log: &Log, req: &FetchRequest) -> ResponseBody {
        let topics = req
            .topics
            .iter()
            .map(|t| fetch::response::Topic {
                name: t.topic_name.clone(),
                partitions: t
                    .partitions
                    .iter()
                    .map(|p| {
                        let values = &log.partitions[p.partition_index as usize];
                        let compression = if log.gzip {
                            Compression::Gzip
                        } else {
                            Compression::None
                        };
                        let mut set = MessageSet::new(
                            values
                                .iter()
                                .map(|&v| Message::new(None, Some(Bytes::from_static(v.as_bytes()))))
                                .collect(),
                            compression,
                        );
                        if !log.gzip {
                            set.entries.retain(|e| e.offset >= p.offset);
                        }
                        fetch::response::Partition {
                            id: p.partition_index,
                            error_code: log.fetch_error,
                            high_water_mark: values.len() as i64,
                            message_set: set,
                        }
                    })
                    .collect(),
            })
            .collect();
        FetchResponse { topics }.into()
    }

    fn broker(log: Log, commits: Commits) -> Arc<FakeTransport> {
        let partitions = log.partitions.len() as i32;
        FakeTransport::new(metadata_response("purchases", partitions, 1), move |_, body| {
            if let Some(reply) = solo_group_reply(body) {
                return Ok(reply);
            }
            let reply: ResponseBody = match body {
                RequestBody::Fetch(req) => fetch_reply(&log, req),
                RequestBody::OffsetFetch(req) => OffsetFetchResponse {
                    topics: req
                        .topics
                        .iter()
                        .map(|t| offset_fetch::response::Topic {
                            name: t.name.clone(),
                            partitions: t
                                .partition_indexes
                                .iter()
                                .map(|p| offset_fetch::response::Partition {
                                    partition_index: *p,
                                    committed_offset: log.committed,
                                    metadata: None,
                                    error_code: KafkaCode::None,
                                })
                                .collect(),
                        })
                        .collect(),
                }
                .into(),
                RequestBody::Offsets(req) => crate::protocol::ListOffsetsResponse {
                    topics: req
                        .topics
                        .iter()
                        .map(|t| crate::protocol::list_offsets::response::Topic {
                            name: t.name.clone(),
                            partitions: t
                                .partitions
                                .iter()
                                .map(|p| crate::protocol::list_offsets::response::Partition {
                                    partition_index: p.partition_index,
                                    error_code: KafkaCode::None,
                                    offsets: vec![0],
                                })
                                .collect(),
                        })
                        .collect(),
                }
                .into(),
                RequestBody::OffsetCommit(req) => {
                    let topics = req
                        .topics
                        .iter()
                        .map(|t| commit_offset::response::Topic {
                            name: t.name.clone(),
                            partitions: t
                                .partitions
                                .iter()
                                .map(|p| {
                                    commits
                                        .lock()
                                        .unwrap()
                                        .push((p.partition_index, p.committed_offset));
                                    commit_offset::response::Partition {
                                        partition_index: p.partition_index,
                                        error_code: KafkaCode::None,
                                    }
                                })
                                .collect(),
                        })
                        .collect();
                    OffsetCommitResponse { topics }.into()
                }
                other => panic!("unexpected request {:?}", other),
            };
            Ok(reply)
        })
    }

    fn consumer(transport: Arc<FakeTransport>) -> Arc<Consumer> {
        let metadata = Arc::new(
            MetadataCache::new(transport, vec![BrokerAddress::new("seed", 9092)]).unwrap(),
        );
        let coordinator = Coordinator::new(
            "group",
            &["purchases".to_owned()],
            metadata.clone(),
            CoordinatorConfig::default().heartbeat_interval_ms(60_000),
        )
        .unwrap();
        let config = ConsumerConfig::default().stable_wait(Duration::from_millis(50));
        Arc::new(Consumer::new(coordinator, metadata, config))
    }

    fn offsets(batch: &FetchBatch) -> Vec<i64> {
        batch.messages.iter().map(|m| m.offset).collect()
    }

    #[tokio::test]
    async fn fetch_round_robins_assigned_partitions() {
        let log = Log::new(vec![vec!["a", "b"], vec!["c"]]);
        let consumer = consumer(broker(log, Commits::default()));
        consumer.join().await.unwrap();

        let first = consumer.fetch("purchases").await.unwrap();
        let second = consumer.fetch("purchases").await.unwrap();
        let third = consumer.fetch("purchases").await.unwrap();

        assert_eq!((first.partition, offsets(&first)), (0, vec![0, 1]));
        assert_eq!((second.partition, offsets(&second)), (1, vec![0]));
        assert_eq!(third.partition, 0);
        assert_eq!(first.high_water_mark, 2);
        assert_eq!(consumer.assigned("purchases").await, vec![0, 1]);
    }

    #[tokio::test]
    async fn fetch_skips_records_before_the_saved_offset() {
        let mut log = Log::new(vec![vec!["a", "b", "c", "d", "e"]]);
        log.gzip = true;
        log.committed = 3;
        let consumer = consumer(broker(log, Commits::default()));
        consumer.join().await.unwrap();

        let batch = consumer.fetch("purchases").await.unwrap();
        assert_eq!(batch.fetch_offset, 3);
        assert_eq!(offsets(&batch), vec![3, 4]);
        assert_eq!(batch.messages[0].value, Some(Bytes::from_static(b"d")));
    }

    #[tokio::test]
    async fn fetch_before_joining_is_not_ready() {
        let transport = broker(Log::new(vec![vec!["a"]]), Commits::default());
        let consumer = consumer(transport.clone());

        assert_eq!(
            consumer.fetch("purchases").await,
            Err(Error::CoordinatorNotReady(CoordinatorState::Unknown))
        );
        assert_eq!(transport.count(ApiKey::Fetch), 0);
    }

    #[tokio::test]
    async fn fetch_rejects_unsubscribed_topics() {
        let consumer = consumer(broker(Log::new(vec![vec![]]), Commits::default()));
        assert!(matches!(
            consumer.fetch("refunds").await,
            Err(Error::ArgumentError(_))
        ));
    }

    #[tokio::test]
    async fn fetch_errors_refresh_leadership() {
        let mut log = Log::new(vec![vec!["a"]]);
        log.fetch_error = KafkaCode::NotLeaderForPartition;
        let transport = broker(log, Commits::default());
        let consumer = consumer(transport.clone());
        consumer.join().await.unwrap();
        let before = transport.count(ApiKey::Metadata);

        assert_eq!(
            consumer.fetch("purchases").await,
            Err(Error::KafkaError(KafkaCode::NotLeaderForPartition))
        );
        assert_eq!(transport.count(ApiKey::Metadata), before + 1);
    }

    #[tokio::test]
    async fn leaderless_partitions_are_skipped() {
        let transport = broker(Log::new(vec![vec!["a"], vec!["b"]]), Commits::default());
        let mut electing = metadata_response("purchases", 2, 1);
        electing.topics[0].partitions[1].leader_id = -1;
        transport.set_metadata(electing);
        let consumer = consumer(transport.clone());
        consumer.join().await.unwrap();
        assert_eq!(consumer.assigned("purchases").await, vec![0, 1]);

        let first = consumer.fetch("purchases").await.unwrap();
        let second = consumer.fetch("purchases").await.unwrap();

        assert_eq!((first.partition, offsets(&first)), (0, vec![0]));
        assert_eq!(second.partition, 1);
        assert!(second.is_empty());
        assert_eq!(transport.count(ApiKey::Fetch), 1);
    }

    #[tokio::test]
    async fn new_assignment_commits_the_old_one() {
        let commits = Commits::default();
        let consumer = consumer(broker(Log::new(vec![vec!["a", "b"]]), commits.clone()));
        consumer.join().await.unwrap();

        consumer.fetch("purchases").await.unwrap();
        assert!(!consumer.advance("purchases", 0, 1, false).await.unwrap());

        consumer.coordinator().rebalance().await.unwrap();
        let batch = consumer.fetch("purchases").await.unwrap();

        assert_eq!(*commits.lock().unwrap(), vec![(0, 2)]);
        assert_eq!(batch.fetch_offset, 0);
    }

    #[tokio::test]
    async fn cancellation_commits_last_delivered_offset() {
        let commits = Commits::default();
        let log = Log::new(vec![vec!["a", "b", "c", "d", "e"], vec![]]);
        let consumer = consumer(broker(log, commits.clone()));
        consumer.join().await.unwrap();

        let (cancel, cancelled) = watch::channel(false);
        let stream = consumer.stream("purchases", cancelled);
        tokio::pin!(stream);

        for expected in 0..3 {
            let message = stream.next().await.unwrap().unwrap();
            assert_eq!((message.partition, message.offset), (0, expected));
        }
        assert!(commits.lock().unwrap().is_empty());

        cancel.send(true).unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(*commits.lock().unwrap(), vec![(0, 3)]);
    }

    #[tokio::test]
    async fn empty_fetch_commits_progress() {
        let commits = Commits::default();
        let log = Log::new(vec![vec!["a", "b"], vec![]]);
        let consumer = consumer(broker(log, commits.clone()));
        consumer.join().await.unwrap();

        let (_cancel, cancelled) = watch::channel(false);
        let stream = consumer.stream("purchases", cancelled);
        tokio::pin!(stream);

        stream.next().await.unwrap().unwrap();
        stream.next().await.unwrap().unwrap();
        // the stream keeps polling empty partitions, so give up on waiting
        let idle = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(idle.is_err());

        assert_eq!(commits.lock().unwrap().first(), Some(&(0, 2)));
    }

    #[tokio::test]
    async fn stream_ends_on_errors() {
        let mut log = Log::new(vec![vec!["a"]]);
        log.fetch_error = KafkaCode::OffsetOutOfRange;
        let consumer = consumer(broker(log, Commits::default()));
        consumer.join().await.unwrap();

        let (_cancel, cancelled) = watch::channel(false);
        let items = consumer.stream("purchases", cancelled).collect::<Vec<_>>().await;
        assert_eq!(items, vec![Err(Error::KafkaError(KafkaCode::OffsetOutOfRange))]);
    }
}

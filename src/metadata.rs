//! Cluster metadata & partition dispatch.
//!
//! [`MetadataCache`] answers "which broker leads this partition?" and
//! only goes to the network on a miss. Entries are never expired; after a
//! leadership error the caller asks for [`MetadataCache::refresh_topic`].
//!
//! ```text
//!   leader_for(topic, p) ── hit ──> Broker
//!          │
//!         miss ── refresh lock ── still missing? ── Metadata request
//!          │                                              │
//!          └──────────── second miss: NotLeaderForPartition, or
//!                        NoLeaderForTopicPartition while one is elected
//! ```
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use rand::Rng;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::instrument;

use crate::{
    client::{self, Transport},
    error::{Error, KafkaCode, Result},
    network::BrokerAddress,
    protocol::{Broker, MetadataRequest, MetadataResponse},
};

/// Internal topic holding committed offsets; never cached.
pub const OFFSETS_TOPIC: &str = "__consumer_offsets";

/// A partition and the node currently leading it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
    /// Negative while the cluster is electing a leader.
    pub leader: i32,
}

impl TopicPartition {
    pub fn has_leader(&self) -> bool {
        self.leader >= 0
    }
}

#[derive(Debug, Default)]
struct ClusterMetadata {
    brokers: HashMap<i32, Broker>,
    // sorted by partition id
    topics: HashMap<String, Vec<TopicPartition>>,
}

impl ClusterMetadata {
    fn leader(&self, topic: &str, partition: i32) -> Option<Broker> {
        let partitions = self.topics.get(topic)?;
        let found = partitions.iter().find(|p| p.partition == partition)?;
        self.brokers.get(&found.leader).cloned()
    }

    fn merge(&mut self, response: MetadataResponse) {
        for broker in response.brokers {
            self.brokers.insert(broker.node_id, broker);
        }

        for topic in response.topics {
            if topic.name == OFFSETS_TOPIC {
                continue;
            }
            if topic.error_code != KafkaCode::None {
                tracing::warn!(
                    "Metadata for topic {} returned {:?}",
                    topic.name,
                    topic.error_code
                );
                continue;
            }
            let mut partitions = topic
                .partitions
                .iter()
                .map(|p| TopicPartition {
                    topic: topic.name.clone(),
                    partition: p.partition_index,
                    leader: p.leader_id,
                })
                .collect::<Vec<_>>();
            partitions.sort_by_key(|p| p.partition);
            tracing::debug!(
                "Caching {} partitions for topic {}",
                partitions.len(),
                topic.name
            );
            self.topics.insert(topic.name, partitions);
        }
    }
}

/// Lazily filled broker and partition leader cache.
pub struct MetadataCache {
    transport: Arc<dyn Transport>,
    seeds: Vec<BrokerAddress>,
    next_seed: AtomicUsize,
    cluster: RwLock<ClusterMetadata>,
    refresh: AsyncMutex<()>,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("seeds", &self.seeds)
            .finish()
    }
}

impl MetadataCache {
    pub fn new(transport: Arc<dyn Transport>, seeds: Vec<BrokerAddress>) -> Result<Self> {
        if seeds.is_empty() {
            return Err(Error::MissingBrokerConfigOptions);
        }
        Ok(Self {
            transport,
            seeds,
            next_seed: AtomicUsize::new(0),
            cluster: RwLock::new(ClusterMetadata::default()),
            refresh: AsyncMutex::new(()),
        })
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Seeds followed by every broker discovered so far.
    async fn candidates(&self) -> Vec<BrokerAddress> {
        let cluster = self.cluster.read().await;
        let mut candidates = self.seeds.clone();
        let mut discovered = cluster
            .brokers
            .values()
            .filter_map(|b| b.addr().ok())
            .filter(|addr| !candidates.contains(addr))
            .collect::<Vec<_>>();
        discovered.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        candidates.extend(discovered);
        candidates
    }

    /// Pick brokers in turn for requests that any broker can answer.
    pub async fn any_broker(&self) -> BrokerAddress {
        let mut candidates = self.candidates().await;
        let index = self.next_seed.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.swap_remove(index)
    }

    pub async fn broker(&self, node_id: i32) -> Option<Broker> {
        self.cluster.read().await.brokers.get(&node_id).cloned()
    }

    pub async fn brokers(&self) -> Vec<Broker> {
        let mut brokers = self
            .cluster
            .read()
            .await
            .brokers
            .values()
            .cloned()
            .collect::<Vec<_>>();
        brokers.sort_by_key(|b| b.node_id);
        brokers
    }

    #[instrument(name = "metadata-fetch", level = "debug", skip(self))]
    async fn fetch(&self, topics: &[&str]) -> Result<MetadataResponse> {
        let candidates = self.candidates().await;
        let start = self.next_seed.fetch_add(1, Ordering::Relaxed);
        let mut last_error = Error::MissingBrokerConfigOptions;

        for attempt in 0..candidates.len() {
            let broker = &candidates[(start + attempt) % candidates.len()];
            tracing::debug!("Requesting metadata for {:?} from {}", topics, broker);
            match client::send::<_, MetadataResponse>(
                self.transport.as_ref(),
                broker,
                MetadataRequest::new(topics),
            )
            .await
            {
                Ok(response) => return Ok(response),
                Err(err @ (Error::IoError(_) | Error::Timeout)) => {
                    tracing::warn!("Metadata request to {} failed {:?}", broker, err);
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error)
    }

    /// Re-query a topic, replacing whatever was cached for it.
    pub async fn refresh_topic(&self, topic: &str) -> Result<()> {
        let _guard = self.refresh.lock().await;
        self.refresh_locked(topic).await
    }

    async fn refresh_locked(&self, topic: &str) -> Result<()> {
        let response = self.fetch(&[topic]).await?;
        self.cluster.write().await.merge(response);
        Ok(())
    }

    // double checked: whoever waited on the refresh lock may find the
    // entry already filled by the previous holder
    async fn refresh_if_missing<F>(&self, topic: &str, present: F) -> Result<()>
    where
        F: Fn(&ClusterMetadata) -> bool,
    {
        let _guard = self.refresh.lock().await;
        if present(&*self.cluster.read().await) {
            return Ok(());
        }
        self.refresh_locked(topic).await
    }

    /// The broker leading `topic`/`partition`.
    pub async fn leader_for(&self, topic: &str, partition: i32) -> Result<Broker> {
        if topic.is_empty() {
            return Err(Error::ArgumentError("topic name is empty".to_owned()));
        }
        if let Some(broker) = self.cluster.read().await.leader(topic, partition) {
            return Ok(broker);
        }

        self.refresh_if_missing(topic, |cluster| {
            cluster.leader(topic, partition).is_some()
        })
        .await?;

        let cluster = self.cluster.read().await;
        if let Some(broker) = cluster.leader(topic, partition) {
            return Ok(broker);
        }
        tracing::error!("ERROR: no leader for {}:{}", topic, partition);
        let known = cluster
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().any(|p| p.partition == partition))
            .unwrap_or(false);
        if known {
            Err(Error::NoLeaderForTopicPartition(topic.to_owned(), partition))
        } else {
            Err(Error::KafkaError(KafkaCode::NotLeaderForPartition))
        }
    }

    pub async fn leader_address(&self, topic: &str, partition: i32) -> Result<BrokerAddress> {
        self.leader_for(topic, partition).await?.addr()
    }

    /// Every partition of `topic` with its leader, sorted by partition id.
    pub async fn topic_partitions(&self, topic: &str) -> Result<Vec<TopicPartition>> {
        if topic.is_empty() {
            return Err(Error::ArgumentError("topic name is empty".to_owned()));
        }
        let cached = self.cluster.read().await.topics.get(topic).cloned();
        let partitions = match cached {
            Some(partitions) => partitions,
            None => {
                self.refresh_if_missing(topic, |cluster| cluster.topics.contains_key(topic))
                    .await?;
                self.cluster
                    .read()
                    .await
                    .topics
                    .get(topic)
                    .cloned()
                    .unwrap_or_default()
            }
        };

        if partitions.is_empty() {
            return Err(Error::NoPartitionsForTopic(topic.to_owned()));
        }
        Ok(partitions)
    }

    /// Sorted partition ids of `topic`.
    pub async fn partitions_for(&self, topic: &str) -> Result<Vec<i32>> {
        Ok(self
            .topic_partitions(topic)
            .await?
            .into_iter()
            .map(|p| p.partition)
            .collect())
    }
}

/// How a producer spreads messages over the partitions of a topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartitionStrategy {
    #[default]
    RoundRobin,
    Random,
}

/// Chooses the partition for the next local operation on a topic.
#[derive(Debug)]
pub struct PartitionDispatcher {
    metadata: Arc<MetadataCache>,
    strategy: PartitionStrategy,
    counters: Mutex<HashMap<String, usize>>,
}

impl PartitionDispatcher {
    pub fn new(metadata: Arc<MetadataCache>, strategy: PartitionStrategy) -> Self {
        Self {
            metadata,
            strategy,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    /// Only partitions with a leader are handed out.
    pub async fn next_partition(&self, topic: &str) -> Result<TopicPartition> {
        let mut partitions = self.metadata.topic_partitions(topic).await?;
        partitions.retain(TopicPartition::has_leader);
        if partitions.is_empty() {
            return Err(Error::KafkaError(KafkaCode::LeaderNotAvailable));
        }
        let index = match self.strategy {
            PartitionStrategy::RoundRobin => {
                let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
                let counter = counters.entry(topic.to_owned()).or_insert(0);
                let index = *counter % partitions.len();
                *counter = counter.wrapping_add(1);
                index
            }
            PartitionStrategy::Random => rand::thread_rng().gen_range(0..partitions.len()),
        };
        Ok(partitions.swap_remove(index))
    }
}

//! Consumption progress and offset commits.
//!
//! An [`OffsetRecorder`] is built for one assignment of one group member.
//! For every assigned partition it keeps the next offset to read (`saved`)
//! and the last offset the broker acknowledged (`committed`); `-1` means
//! not resolved yet. `committed <= saved` always holds.
//!
//! Commits are batched: [`OffsetRecorder::advance`] only talks to the
//! broker once enough offsets piled up *and* enough time passed since the
//! previous commit, unless the caller forces it.
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::instrument;

use crate::{
    client,
    coordinator::Coordinator,
    error::{Error, Result},
    metadata::MetadataCache,
    protocol::{
        list_offsets::request::OffsetTime, ListOffsetsRequest, ListOffsetsResponse,
        OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest, OffsetFetchResponse,
    },
};

pub const DEFAULT_COMMIT_BATCH_SIZE: i64 = 10;
pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_secs(2);

/// Offset of a partition that is not resolved yet.
pub const UNKNOWN_OFFSET: i64 = -1;

/// When advancing offsets turns into a commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    /// Uncommitted offsets needed before a commit.
    pub batch_size: i64,
    /// Minimum time between two unforced commits.
    pub min_interval: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            min_interval: DEFAULT_COMMIT_INTERVAL,
        }
    }
}

impl CommitPolicy {
    pub fn batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOffsets {
    /// Next offset to read.
    pub saved: i64,
    /// Last offset acknowledged by the broker.
    pub committed: i64,
}

impl Default for PartitionOffsets {
    fn default() -> Self {
        Self {
            saved: UNKNOWN_OFFSET,
            committed: UNKNOWN_OFFSET,
        }
    }
}

impl PartitionOffsets {
    fn is_dirty(&self) -> bool {
        self.saved > self.committed
    }
}

pub struct OffsetRecorder {
    coordinator: Arc<Coordinator>,
    metadata: Arc<MetadataCache>,
    policy: CommitPolicy,
    epoch: u64,
    ledger: BTreeMap<(String, i32), PartitionOffsets>,
    last_commit: Instant,
}

impl std::fmt::Debug for OffsetRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffsetRecorder")
            .field("group_id", &self.coordinator.group_id())
            .field("epoch", &self.epoch)
            .field("ledger", &self.ledger)
            .finish()
    }
}

impl OffsetRecorder {
    /// A fresh ledger for the coordinator's current assignment.
    pub fn new(
        coordinator: Arc<Coordinator>,
        metadata: Arc<MetadataCache>,
        policy: CommitPolicy,
    ) -> Self {
        let epoch = coordinator.epoch();
        let ledger = coordinator
            .assignment()
            .partition_assignments
            .iter()
            .flat_map(|assigned| {
                assigned
                    .partitions
                    .iter()
                    .map(|p| ((assigned.topic_name.clone(), *p), PartitionOffsets::default()))
            })
            .collect::<BTreeMap<_, _>>();
        tracing::debug!(
            "Offset ledger for group {} epoch {} covers {:?}",
            coordinator.group_id(),
            epoch,
            ledger.keys()
        );

        Self {
            coordinator,
            metadata,
            policy,
            epoch,
            ledger,
            last_commit: Instant::now(),
        }
    }

    /// `false` once the coordinator moved to another assignment.
    pub fn is_current(&self) -> bool {
        self.epoch == self.coordinator.epoch()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Assigned partitions of `topic`, sorted.
    pub fn partitions(&self, topic: &str) -> Vec<i32> {
        self.ledger
            .keys()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| *p)
            .collect()
    }

    pub fn offsets(&self, topic: &str, partition: i32) -> Option<PartitionOffsets> {
        self.ledger.get(&(topic.to_owned(), partition)).copied()
    }

    fn entry(&mut self, topic: &str, partition: i32) -> Result<&mut PartitionOffsets> {
        self.ledger
            .get_mut(&(topic.to_owned(), partition))
            .ok_or_else(|| {
                Error::ArgumentError(format!("{}:{} is not assigned", topic, partition))
            })
    }

    /// The next offset to read, resolved on first use from the group's
    /// committed offset or else the earliest retained offset.
    pub async fn get_saved_offset(&mut self, topic: &str, partition: i32) -> Result<i64> {
        let saved = self.entry(topic, partition)?.saved;
        if saved != UNKNOWN_OFFSET {
            return Ok(saved);
        }

        let resolved = match self.fetch_committed(topic, partition).await? {
            Some(offset) => offset,
            None => self.fetch_earliest(topic, partition).await?,
        };
        tracing::debug!("Resolved {}:{} to offset {}", topic, partition, resolved);

        let entry = self.entry(topic, partition)?;
        entry.saved = resolved;
        entry.committed = resolved;
        Ok(resolved)
    }

    async fn fetch_committed(&self, topic: &str, partition: i32) -> Result<Option<i64>> {
        let coordinator = self.coordinator.coordinator().await?;
        let mut request = OffsetFetchRequest::new(self.coordinator.group_id());
        request.add(topic, partition);
        let response: OffsetFetchResponse =
            client::send(self.metadata.transport().as_ref(), &coordinator, request).await?;
        response.committed_offset(topic, partition)
    }

    async fn fetch_earliest(&self, topic: &str, partition: i32) -> Result<i64> {
        let leader = self.metadata.leader_address(topic, partition).await?;
        let mut request = ListOffsetsRequest::new();
        request.add(topic, partition, OffsetTime::Earliest, 1);
        let response: ListOffsetsResponse =
            client::send(self.metadata.transport().as_ref(), &leader, request).await?;
        Ok(response.offset_for(topic, partition)?.unwrap_or(0))
    }

    /// Record that `offset` was consumed. Returns whether a commit was
    /// sent.
    pub async fn advance(
        &mut self,
        topic: &str,
        partition: i32,
        offset: i64,
        force_commit: bool,
    ) -> Result<bool> {
        let batch_size = self.policy.batch_size;
        let entry = self.entry(topic, partition)?;
        let next = match offset.checked_add(1) {
            Some(next) if next >= entry.saved => next,
            _ => {
                return Err(Error::OffsetOutOfRange {
                    topic: topic.to_owned(),
                    partition,
                    saved: entry.saved,
                    offset,
                })
            }
        };
        entry.saved = next;
        let pending = entry.saved - entry.committed.max(0);

        let due = force_commit
            || (pending >= batch_size && self.last_commit.elapsed() >= self.policy.min_interval);
        if !due {
            return Ok(false);
        }
        self.commit().await
    }

    /// Commit every partition with uncommitted progress.
    pub async fn flush(&mut self) -> Result<bool> {
        self.commit().await
    }

    /// Final commit of a ledger whose assignment was replaced. Partitions
    /// that moved to another member are skipped so their new owner's
    /// progress is never overwritten.
    pub async fn hand_off(&mut self) -> Result<bool> {
        if self.is_current() {
            return self.commit().await;
        }
        let kept = self.coordinator.assignment();
        let moved = self
            .ledger
            .keys()
            .filter(|(topic, partition)| !kept.partitions_for(topic).contains(partition))
            .cloned()
            .collect::<Vec<_>>();
        if !moved.is_empty() {
            tracing::info!("Not committing {:?}, they moved to another member", moved);
        }
        self.commit_where(|topic, partition| kept.partitions_for(topic).contains(&partition))
            .await
    }

    async fn commit(&mut self) -> Result<bool> {
        self.commit_where(|_, _| true).await
    }

    #[instrument(name = "offset-commit", level = "debug", skip(self, keep))]
    async fn commit_where<F>(&mut self, keep: F) -> Result<bool>
    where
        F: Fn(&str, i32) -> bool,
    {
        let mut request = OffsetCommitRequest::new(self.coordinator.group_id());
        let mut committing = vec![];
        for ((topic, partition), offsets) in self.ledger.iter() {
            if offsets.is_dirty() && keep(topic, *partition) {
                request.add(topic, *partition, offsets.saved, None);
                committing.push(((topic.clone(), *partition), offsets.saved));
            }
        }
        if request.is_empty() {
            return Ok(false);
        }

        let coordinator = self.coordinator.coordinator().await?;
        let response: OffsetCommitResponse =
            client::send(self.metadata.transport().as_ref(), &coordinator, request).await?;
        response.is_error()?;

        for (key, offset) in committing {
            if let Some(entry) = self.ledger.get_mut(&key) {
                entry.committed = entry.committed.max(offset);
            }
        }
        self.last_commit = Instant::now();
        tracing::info!(
            "Committed offsets for group {}: {:?}",
            self.coordinator.group_id(),
            self.ledger
        );
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        coordinator::CoordinatorConfig,
        error::KafkaCode,
        network::BrokerAddress,
        protocol::{
            commit_offset, list_offsets, offset_fetch, ApiKey, MemberAssignment,
            PartitionAssignment, RequestBody, ResponseBody, SyncGroupResponse,
        },
        testing::{metadata_response, solo_group_reply, FakeTransport},
    };

    // offsets committed so far, shared with the fake broker
    type Commits = Arc<Mutex<Vec<(String, i32, i64)>>>;

    fn broker(committed: Option<i64>, earliest: i64, commits: Commits) -> Arc<FakeTransport> {
        FakeTransport::new(metadata_response("purchases", 2, 1), move |_, body| {
            if let Some(reply) = solo_group_reply(body) {
                return Ok(reply);
            }
            Ok(ledger_reply(body, committed, earliest, &commits))
        })
    }

    fn ledger_reply(
        body: &RequestBody,
        committed: Option<i64>,
        earliest: i64,
        commits: &Commits,
    ) -> ResponseBody {
        match body {
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
                                committed_offset: committed.unwrap_or(-1),
                                metadata: None,
                                error_code: KafkaCode::None,
                            })
                            .collect(),
                    })
                    .collect(),
            }
            .into(),
            RequestBody::Offsets(req) => ListOffsetsResponse {
                topics: req
                    .topics
                    .iter()
                    .map(|t| list_offsets::response::Topic {
                        name: t.name.clone(),
                        partitions: t
                            .partitions
                            .iter()
                            .map(|p| list_offsets::response::Partition {
                                partition_index: p.partition_index,
                                error_code: KafkaCode::None,
                                offsets: vec![earliest],
                            })
                            .collect(),
                    })
                    .collect(),
            }
            .into(),
            RequestBody::OffsetCommit(req) => {
                let mut topics = vec![];
                for topic in req.topics.iter() {
                    let mut partitions = vec![];
                    for p in topic.partitions.iter() {
                        commits.lock().unwrap().push((
                            topic.name.clone(),
                            p.partition_index,
                            p.committed_offset,
                        ));
                        partitions.push(commit_offset::response::Partition {
                            partition_index: p.partition_index,
                            error_code: KafkaCode::None,
                        });
                    }
                    topics.push(commit_offset::response::Topic {
                        name: topic.name.clone(),
                        partitions,
                    });
                }
                OffsetCommitResponse { topics }.into()
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    async fn recorder(transport: Arc<FakeTransport>, policy: CommitPolicy) -> OffsetRecorder {
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
        coordinator.join().await.unwrap();
        OffsetRecorder::new(coordinator, metadata, policy)
    }

    fn eager() -> CommitPolicy {
        CommitPolicy::default().min_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn ledger_starts_unknown() {
        let transport = broker(None, 0, Commits::default());
        let recorder = recorder(transport, eager()).await;

        assert_eq!(recorder.partitions("purchases"), vec![0, 1]);
        assert_eq!(
            recorder.offsets("purchases", 1),
            Some(PartitionOffsets {
                saved: -1,
                committed: -1
            })
        );
        assert!(recorder.is_current());
    }

    #[tokio::test]
    async fn resolves_committed_offset_first() {
        let transport = broker(Some(42), 7, Commits::default());
        let mut recorder = recorder(transport.clone(), eager()).await;

        assert_eq!(recorder.get_saved_offset("purchases", 0).await.unwrap(), 42);
        assert_eq!(transport.count(ApiKey::Offsets), 0);
        assert_eq!(
            recorder.offsets("purchases", 0),
            Some(PartitionOffsets {
                saved: 42,
                committed: 42
            })
        );

        // cached afterwards
        recorder.get_saved_offset("purchases", 0).await.unwrap();
        assert_eq!(transport.count(ApiKey::OffsetFetch), 1);
    }

    #[tokio::test]
    async fn falls_back_to_earliest_offset() {
        let transport = broker(None, 7, Commits::default());
        let mut recorder = recorder(transport.clone(), eager()).await;

        assert_eq!(recorder.get_saved_offset("purchases", 1).await.unwrap(), 7);
        assert_eq!(transport.count(ApiKey::Offsets), 1);
        match &transport.bodies(ApiKey::Offsets)[0] {
            RequestBody::Offsets(req) => {
                assert_eq!(req.topics[0].partitions[0].timestamp, -2);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn unassigned_partitions_are_rejected() {
        let transport = broker(None, 0, Commits::default());
        let mut recorder = recorder(transport.clone(), eager()).await;

        assert!(matches!(
            recorder.get_saved_offset("purchases", 9).await,
            Err(Error::ArgumentError(_))
        ));
        assert!(recorder.advance("other", 0, 1, false).await.is_err());
        assert_eq!(transport.count(ApiKey::OffsetFetch), 0);
    }

    #[tokio::test]
    async fn stale_offsets_are_out_of_range() {
        let commits = Commits::default();
        let mut recorder = recorder(broker(Some(10), 0, commits.clone()), eager()).await;
        recorder.get_saved_offset("purchases", 0).await.unwrap();

        assert_eq!(
            recorder.advance("purchases", 0, 5, false).await,
            Err(Error::OffsetOutOfRange {
                topic: "purchases".to_owned(),
                partition: 0,
                saved: 10,
                offset: 5
            })
        );
        // re-acknowledging the last consumed offset is fine
        assert_eq!(recorder.advance("purchases", 0, 9, false).await, Ok(false));
        assert!(commits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn commits_in_batches() {
        let commits = Commits::default();
        let mut recorder = recorder(broker(Some(0), 0, commits.clone()), eager()).await;
        recorder.get_saved_offset("purchases", 0).await.unwrap();

        for offset in 0..9 {
            assert!(!recorder.advance("purchases", 0, offset, false).await.unwrap());
        }
        assert!(recorder.advance("purchases", 0, 9, false).await.unwrap());
        assert_eq!(*commits.lock().unwrap(), vec![("purchases".to_owned(), 0, 10)]);

        let offsets = recorder.offsets("purchases", 0).unwrap();
        assert_eq!(offsets.saved, 10);
        assert_eq!(offsets.committed, 10);
    }

    #[tokio::test]
    async fn commits_wait_for_the_interval() {
        let commits = Commits::default();
        let transport = broker(Some(0), 0, commits.clone());
        let mut recorder = recorder(transport, CommitPolicy::default()).await;
        recorder.get_saved_offset("purchases", 0).await.unwrap();

        for offset in 0..50 {
            recorder.advance("purchases", 0, offset, false).await.unwrap();
        }
        assert!(commits.lock().unwrap().is_empty());

        assert!(recorder.advance("purchases", 0, 50, true).await.unwrap());
        assert_eq!(*commits.lock().unwrap(), vec![("purchases".to_owned(), 0, 51)]);
    }

    #[tokio::test]
    async fn forced_commit_skips_clean_partitions() {
        let commits = Commits::default();
        let mut recorder = recorder(broker(Some(3), 0, commits.clone()), eager()).await;
        recorder.get_saved_offset("purchases", 0).await.unwrap();
        recorder.get_saved_offset("purchases", 1).await.unwrap();

        assert!(recorder.advance("purchases", 1, 3, true).await.unwrap());
        assert_eq!(*commits.lock().unwrap(), vec![("purchases".to_owned(), 1, 4)]);

        // nothing left to commit
        assert!(!recorder.flush().await.unwrap());
        assert!(!recorder.advance("purchases", 1, 3, true).await.unwrap());
        assert_eq!(commits.lock().unwrap().len(), 1);

        for partition in [0, 1] {
            let offsets = recorder.offsets("purchases", partition).unwrap();
            assert!(offsets.committed <= offsets.saved);
        }
    }

    #[tokio::test]
    async fn detects_reassignment() {
        let transport = broker(None, 0, Commits::default());
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
        coordinator.join().await.unwrap();

        let recorder = OffsetRecorder::new(coordinator.clone(), metadata, eager());
        assert!(recorder.is_current());
        coordinator.rebalance().await.unwrap();
        assert!(!recorder.is_current());
    }

    #[tokio::test]
    async fn last_representable_offset_is_out_of_range() {
        let commits = Commits::default();
        let mut recorder = recorder(broker(Some(10), 0, commits.clone()), eager()).await;
        recorder.get_saved_offset("purchases", 0).await.unwrap();

        assert_eq!(
            recorder.advance("purchases", 0, i64::MAX, true).await,
            Err(Error::OffsetOutOfRange {
                topic: "purchases".to_owned(),
                partition: 0,
                saved: 10,
                offset: i64::MAX
            })
        );
        assert_eq!(recorder.offsets("purchases", 0).unwrap().saved, 10);
        assert!(commits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hand_off_skips_partitions_that_moved() {
        let commits = Commits::default();
        let recorded = commits.clone();
        let mut syncs = 0;
        // the second generation only keeps partition 0 for this member
        let transport = FakeTransport::new(metadata_response("purchases", 2, 1), move |_, body| {
            if let RequestBody::SyncGroup(_) = body {
                syncs += 1;
                if syncs > 1 {
                    return Ok(SyncGroupResponse {
                        error_code: KafkaCode::None,
                        assignment: MemberAssignment::new(vec![PartitionAssignment::new(
                            "purchases",
                            vec![0],
                        )]),
                    }
                    .into());
                }
            }
            if let Some(reply) = solo_group_reply(body) {
                return Ok(reply);
            }
            Ok(ledger_reply(body, Some(0), 0, &recorded))
        });
        let mut recorder = recorder(transport, CommitPolicy::default()).await;
        recorder.get_saved_offset("purchases", 0).await.unwrap();
        recorder.get_saved_offset("purchases", 1).await.unwrap();
        recorder.advance("purchases", 0, 3, false).await.unwrap();
        recorder.advance("purchases", 1, 5, false).await.unwrap();
        assert!(commits.lock().unwrap().is_empty());

        recorder.coordinator.rebalance().await.unwrap();
        assert!(!recorder.is_current());
        assert_eq!(recorder.hand_off().await, Ok(true));
        assert_eq!(*commits.lock().unwrap(), vec![("purchases".to_owned(), 0, 4)]);

        // nothing left to hand off for the kept partition
        assert_eq!(recorder.hand_off().await, Ok(false));
    }

    #[tokio::test]
    async fn hand_off_of_a_current_ledger_commits_everything() {
        let commits = Commits::default();
        let transport = broker(Some(0), 0, commits.clone());
        let mut recorder = recorder(transport, CommitPolicy::default()).await;
        recorder.get_saved_offset("purchases", 0).await.unwrap();
        recorder.get_saved_offset("purchases", 1).await.unwrap();
        recorder.advance("purchases", 0, 1, false).await.unwrap();
        recorder.advance("purchases", 1, 2, false).await.unwrap();

        assert_eq!(recorder.hand_off().await, Ok(true));
        assert_eq!(
            *commits.lock().unwrap(),
            vec![("purchases".to_owned(), 0, 2), ("purchases".to_owned(), 1, 3)]
        );
    }
}

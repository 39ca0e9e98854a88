//! Consumer group membership.
//!
//! A [`Coordinator`] is one member of one group. It resolves the group's
//! coordinator broker, runs the JoinGroup/SyncGroup handshake, keeps the
//! membership alive with heartbeats and rejoins when the broker announces
//! a rebalance.
//!
//! ```text
//!  Unknown ──> Joining ──> AwaitingSync ──> Stable
//!                 ^                           │
//!                 └──── RebalanceInProgress ──┘
//!
//!  exhausted retries or a fatal error ──> Down
//! ```
//!
//! When this member is elected leader it computes the assignment for the
//! whole group with [`crate::assignor::assign`] and ships it in its
//! SyncGroup request. Followers send an empty SyncGroup and receive their
//! share in the response.
//!
//! Every completed handshake bumps [`Coordinator::epoch`] and publishes
//! the new state on the channel returned by [`Coordinator::subscribe`],
//! which is how consumers notice that their assignment changed.
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Duration,
};

use tokio::{
    sync::{watch, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tracing::instrument;

use crate::{
    assignor::{self, CONSUMER_PROTOCOL_TYPE, ROUND_ROBIN_PROTOCOL},
    client,
    error::{Error, KafkaCode, Result},
    metadata::MetadataCache,
    network::BrokerAddress,
    protocol::{
        join_group::response::Member, Assignment, DescribeGroupsRequest, DescribeGroupsResponse,
        FindCoordinatorRequest, FindCoordinatorResponse, HeartbeatRequest, HeartbeatResponse,
        JoinGroupRequest, JoinGroupResponse, LeaveGroupRequest, LeaveGroupResponse,
        ListGroupsRequest, ListGroupsResponse, MemberAssignment, Protocol, SyncGroupRequest,
        SyncGroupResponse,
    },
};

pub const DEFAULT_SESSION_TIMEOUT_MS: i32 = 10000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_REBALANCE_RETRIES: usize = 20;
pub const DEFAULT_REBALANCE_RETRY_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No handshake has completed yet, or the member left.
    Unknown,
    Joining,
    AwaitingSync,
    Stable,
    /// A rebalance failed for good.
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub session_timeout_ms: i32,
    pub heartbeat_interval_ms: u64,
    pub rebalance_retries: usize,
    pub rebalance_retry_delay_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            rebalance_retries: DEFAULT_REBALANCE_RETRIES,
            rebalance_retry_delay_ms: DEFAULT_REBALANCE_RETRY_DELAY_MS,
        }
    }
}

impl CoordinatorConfig {
    pub fn session_timeout_ms(mut self, session_timeout_ms: i32) -> Self {
        self.session_timeout_ms = session_timeout_ms;
        self
    }

    pub fn heartbeat_interval_ms(mut self, heartbeat_interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = heartbeat_interval_ms;
        self
    }

    pub fn rebalance_retries(mut self, rebalance_retries: usize) -> Self {
        self.rebalance_retries = rebalance_retries;
        self
    }

    pub fn rebalance_retry_delay_ms(mut self, rebalance_retry_delay_ms: u64) -> Self {
        self.rebalance_retry_delay_ms = rebalance_retry_delay_ms;
        self
    }
}

/// What the last handshake told this member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Membership {
    /// Assigned by the broker, empty until the first join.
    pub member_id: String,
    pub generation_id: i32,
    pub leader_id: String,
    /// Only filled while this member leads the group.
    pub members: Vec<Member>,
    pub assignment: MemberAssignment,
}

impl Membership {
    pub fn is_leader(&self) -> bool {
        !self.member_id.is_empty() && self.member_id == self.leader_id
    }
}

pub struct Coordinator {
    group_id: String,
    topics: Vec<String>,
    config: CoordinatorConfig,
    metadata: Arc<MetadataCache>,
    coordinator: Mutex<Option<BrokerAddress>>,
    membership: Mutex<Membership>,
    // held for the whole join/sync handshake
    rebalancing: AsyncMutex<()>,
    epoch: AtomicU64,
    state: watch::Sender<CoordinatorState>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("group_id", &self.group_id)
            .field("topics", &self.topics)
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Coordinator {
    pub fn new(
        group_id: &str,
        topics: &[String],
        metadata: Arc<MetadataCache>,
        config: CoordinatorConfig,
    ) -> Result<Arc<Self>> {
        if group_id.is_empty() {
            return Err(Error::ArgumentError("group id is empty".to_owned()));
        }
        if topics.is_empty() || topics.iter().any(|t| t.is_empty()) {
            return Err(Error::ArgumentError(
                "a group member needs at least one named topic".to_owned(),
            ));
        }
        let (state, _) = watch::channel(CoordinatorState::Unknown);
        Ok(Arc::new(Self {
            group_id: group_id.to_owned(),
            topics: topics.to_vec(),
            config,
            metadata,
            coordinator: Mutex::new(None),
            membership: Mutex::new(Membership::default()),
            rebalancing: AsyncMutex::new(()),
            epoch: AtomicU64::new(0),
            state,
            heartbeat: Mutex::new(None),
        }))
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    /// Counts completed handshakes and departures. A consumer holding an
    /// older value is working from a stale assignment.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn membership(&self) -> Membership {
        lock(&self.membership).clone()
    }

    pub fn assignment(&self) -> MemberAssignment {
        lock(&self.membership).assignment.clone()
    }

    fn set_state(&self, state: CoordinatorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(
                "Group {} moved from {:?} to {:?}",
                self.group_id,
                previous,
                state
            );
        }
    }

    /// The broker coordinating this group, looked up once and then cached.
    pub async fn coordinator(&self) -> Result<BrokerAddress> {
        if let Some(address) = lock(&self.coordinator).clone() {
            return Ok(address);
        }

        let broker = self.metadata.any_broker().await;
        let response: FindCoordinatorResponse = client::send(
            self.metadata.transport().as_ref(),
            &broker,
            FindCoordinatorRequest::new(&self.group_id),
        )
        .await?;
        response.is_error()?;

        let address = response.broker().addr()?;
        tracing::info!("Coordinator for group {} is {}", self.group_id, address);
        *lock(&self.coordinator) = Some(address.clone());
        Ok(address)
    }

    /// Join the group, wait for the first assignment and start the
    /// heartbeat task.
    pub async fn join(self: &Arc<Self>) -> Result<()> {
        self.rebalance().await?;

        let mut heartbeat = lock(&self.heartbeat);
        if heartbeat.as_ref().map(|h| h.is_finished()).unwrap_or(true) {
            let interval = Duration::from_millis(self.config.heartbeat_interval_ms.max(1));
            *heartbeat = Some(tokio::spawn(heartbeat_loop(Arc::downgrade(self), interval)));
        }
        Ok(())
    }

    /// Run the join/sync handshake until it sticks. Only one rebalance
    /// runs at a time; a concurrent caller waits for its outcome.
    pub async fn rebalance(&self) -> Result<()> {
        let _running = match self.rebalancing.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("Rebalance of {} already running", self.group_id);
                drop(self.rebalancing.lock().await);
                return match self.state() {
                    CoordinatorState::Stable => Ok(()),
                    state => Err(Error::CoordinatorNotReady(state)),
                };
            }
        };
        self.rebalance_with_retries().await
    }

    #[instrument(name = "group-rebalance", level = "debug", skip(self), fields(group = %self.group_id))]
    async fn rebalance_with_retries(&self) -> Result<()> {
        let mut last_code = KafkaCode::Unknown;
        for attempt in 1..=self.config.rebalance_retries {
            match self.join_and_sync().await {
                Ok(()) => return Ok(()),
                Err(Error::KafkaError(code)) if code.is_rebalance_race() => {
                    tracing::info!(
                        "Rebalance attempt {} of group {} hit {:?}, retrying",
                        attempt,
                        self.group_id,
                        code
                    );
                    if code == KafkaCode::UnknownMemberId {
                        lock(&self.membership).member_id.clear();
                    }
                    last_code = code;
                    tokio::time::sleep(Duration::from_millis(self.config.rebalance_retry_delay_ms))
                        .await;
                }
                Err(err) => {
                    tracing::error!("ERROR: Rebalance of group {} failed {:?}", self.group_id, err);
                    self.set_state(CoordinatorState::Down);
                    return Err(err);
                }
            }
        }

        tracing::error!(
            "ERROR: Gave up rebalancing group {} after {} attempts",
            self.group_id,
            self.config.rebalance_retries
        );
        self.set_state(CoordinatorState::Down);
        Err(Error::RetriesExhausted(last_code))
    }

    async fn join_and_sync(&self) -> Result<()> {
        self.set_state(CoordinatorState::Joining);
        let coordinator = self.coordinator().await?;
        let transport = self.metadata.transport().as_ref();

        let member_id = lock(&self.membership).member_id.clone();
        let join: JoinGroupResponse = client::send(
            transport,
            &coordinator,
            JoinGroupRequest::new(
                &self.group_id,
                self.config.session_timeout_ms,
                &member_id,
                CONSUMER_PROTOCOL_TYPE,
                vec![Protocol::new(ROUND_ROBIN_PROTOCOL, &self.topics)],
            ),
        )
        .await?;
        join.is_error()?;

        tracing::debug!(
            "Joined group {} as {} in generation {}, leader {}",
            self.group_id,
            join.member_id,
            join.generation_id,
            join.leader
        );
        {
            let mut membership = lock(&self.membership);
            membership.member_id = join.member_id.clone();
            membership.generation_id = join.generation_id;
            membership.leader_id = join.leader.clone();
            membership.members = if join.is_leader() {
                join.members.clone()
            } else {
                vec![]
            };
        }

        self.set_state(CoordinatorState::AwaitingSync);
        let assignments = if join.is_leader() {
            self.assign(&join.members).await?
        } else {
            vec![]
        };

        let sync: SyncGroupResponse = client::send(
            transport,
            &coordinator,
            SyncGroupRequest::new(
                &self.group_id,
                join.generation_id,
                &join.member_id,
                assignments,
            ),
        )
        .await?;
        sync.is_error()?;

        tracing::info!(
            "Member {} of group {} was assigned {:?}",
            join.member_id,
            self.group_id,
            sync.assignment.partition_assignments
        );
        lock(&self.membership).assignment = sync.assignment;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.set_state(CoordinatorState::Stable);
        Ok(())
    }

    // leader only
    async fn assign(&self, members: &[Member]) -> Result<Vec<Assignment>> {
        let mut topic_partitions = BTreeMap::new();
        for topic in assignor::subscribed_topics(members) {
            match self.metadata.partitions_for(&topic).await {
                Ok(partitions) => {
                    topic_partitions.insert(topic, partitions);
                }
                Err(Error::NoPartitionsForTopic(_)) => {
                    tracing::warn!("Topic {} has no partitions to assign", topic);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(assignor::assign(members, &topic_partitions))
    }

    /// Send one heartbeat. A rebalance announced by the broker is carried
    /// out before returning, keeping the current member id.
    pub async fn heartbeat(&self) -> Result<()> {
        let (member_id, generation_id) = {
            let membership = lock(&self.membership);
            (membership.member_id.clone(), membership.generation_id)
        };
        if member_id.is_empty() {
            return Err(Error::NotAMember);
        }
        if self.state() != CoordinatorState::Stable {
            tracing::trace!("Skipping heartbeat of {} while not stable", self.group_id);
            return Ok(());
        }

        let coordinator = self.coordinator().await?;
        let response: HeartbeatResponse = client::send(
            self.metadata.transport().as_ref(),
            &coordinator,
            HeartbeatRequest::new(&self.group_id, generation_id, &member_id),
        )
        .await?;

        match response.error_code {
            KafkaCode::None => Ok(()),
            code if code.is_rebalance_race() => {
                tracing::info!("Group {} is rebalancing ({:?})", self.group_id, code);
                self.rebalance().await
            }
            code => {
                tracing::error!("ERROR: Heartbeat of group {} failed {:?}", self.group_id, code);
                Err(Error::KafkaError(code))
            }
        }
    }

    /// Wait for the state to become `Stable`. Giving up, or reaching
    /// `Down`, is reported as [`Error::CoordinatorNotReady`].
    pub async fn wait_until_stable(&self, timeout: Duration) -> Result<()> {
        let mut states = self.subscribe();
        let reached = tokio::time::timeout(timeout, async {
            states
                .wait_for(|s| matches!(s, CoordinatorState::Stable | CoordinatorState::Down))
                .await
                .map(|state| *state)
        })
        .await;

        match reached {
            Ok(Ok(CoordinatorState::Stable)) => Ok(()),
            _ => Err(Error::CoordinatorNotReady(self.state())),
        }
    }

    /// Stop heartbeating and leave the group.
    pub async fn leave(&self) -> Result<()> {
        self.stop_heartbeat();

        let member_id = lock(&self.membership).member_id.clone();
        if member_id.is_empty() {
            return Err(Error::NotAMember);
        }

        let coordinator = self.coordinator().await?;
        let response: LeaveGroupResponse = client::send(
            self.metadata.transport().as_ref(),
            &coordinator,
            LeaveGroupRequest::new(&self.group_id, &member_id),
        )
        .await?;
        response.is_error()?;

        tracing::info!("Member {} left group {}", member_id, self.group_id);
        *lock(&self.membership) = Membership::default();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.set_state(CoordinatorState::Unknown);
        Ok(())
    }

    fn stop_heartbeat(&self) {
        if let Some(handle) = lock(&self.heartbeat).take() {
            handle.abort();
        }
    }

    pub async fn list_groups(&self) -> Result<ListGroupsResponse> {
        let coordinator = self.coordinator().await?;
        let response: ListGroupsResponse = client::send(
            self.metadata.transport().as_ref(),
            &coordinator,
            ListGroupsRequest,
        )
        .await?;
        response.is_error()?;
        Ok(response)
    }

    pub async fn describe_groups<T: AsRef<str>>(&self, groups: &[T]) -> Result<DescribeGroupsResponse> {
        let coordinator = self.coordinator().await?;
        client::send(
            self.metadata.transport().as_ref(),
            &coordinator,
            DescribeGroupsRequest::new(groups),
        )
        .await
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

async fn heartbeat_loop(coordinator: Weak<Coordinator>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let coordinator = match coordinator.upgrade() {
            Some(coordinator) => coordinator,
            None => break,
        };
        if let Err(err) = coordinator.heartbeat().await {
            tracing::warn!(
                "Heartbeat for group {} failed {:?}",
                coordinator.group_id,
                err
            );
            if coordinator.state() == CoordinatorState::Down {
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        protocol::{ApiKey, RequestBody, ResponseBody},
        testing::{metadata_response, FakeTransport},
    };

    const MEMBER: &str = "member-1";

    fn coordinator_response() -> ResponseBody {
        FindCoordinatorResponse {
            error_code: KafkaCode::None,
            node_id: 1,
            host: "broker1".to_owned(),
            port: 9092,
        }
        .into()
    }

    fn join_response(member_id: &str, leader: &str, members: Vec<Member>) -> ResponseBody {
        JoinGroupResponse {
            error_code: KafkaCode::None,
            generation_id: 1,
            protocol_name: ROUND_ROBIN_PROTOCOL.to_owned(),
            leader: leader.to_owned(),
            member_id: member_id.to_owned(),
            members,
        }
        .into()
    }

    fn join_error(code: KafkaCode) -> ResponseBody {
        JoinGroupResponse {
            error_code: code,
            generation_id: -1,
            protocol_name: String::new(),
            leader: String::new(),
            member_id: String::new(),
            members: vec![],
        }
        .into()
    }

    fn heartbeat_response(code: KafkaCode) -> ResponseBody {
        HeartbeatResponse { error_code: code }.into()
    }

    // a one member group: the leader's own assignment is echoed back
    fn echo_sync(request: &SyncGroupRequest) -> ResponseBody {
        let assignment = request
            .assignments
            .iter()
            .find(|a| a.member_id == request.member_id)
            .map(|a| a.assignment.clone())
            .unwrap_or_default();
        SyncGroupResponse {
            error_code: KafkaCode::None,
            assignment,
        }
        .into()
    }

    fn solo_member(topics: &[&str]) -> Vec<Member> {
        vec![Member {
            member_id: MEMBER.to_owned(),
            metadata: crate::protocol::ProtocolMetadata::new(topics),
        }]
    }

    fn group(transport: Arc<FakeTransport>, config: CoordinatorConfig) -> Arc<Coordinator> {
        let metadata = Arc::new(
            MetadataCache::new(transport, vec![BrokerAddress::new("seed", 9092)]).unwrap(),
        );
        Coordinator::new("group", &["purchases".to_owned()], metadata, config).unwrap()
    }

    fn fast_config() -> CoordinatorConfig {
        CoordinatorConfig::default()
            .rebalance_retry_delay_ms(1)
            .heartbeat_interval_ms(60_000)
    }

    // scripted single member group; `heartbeats` is played back in order,
    // then every heartbeat succeeds
    fn solo_group(heartbeats: Vec<KafkaCode>) -> Arc<FakeTransport> {
        let mut heartbeats = heartbeats.into_iter();
        FakeTransport::new(metadata_response("purchases", 4, 2), move |_, body| {
            Ok(match body {
                RequestBody::GroupCoordinator(_) => coordinator_response(),
                RequestBody::JoinGroup(_) => {
                    join_response(MEMBER, MEMBER, solo_member(&["purchases"]))
                }
                RequestBody::SyncGroup(req) => echo_sync(req),
                RequestBody::Heartbeat(_) => {
                    heartbeat_response(heartbeats.next().unwrap_or(KafkaCode::None))
                }
                RequestBody::LeaveGroup(_) => LeaveGroupResponse {
                    error_code: KafkaCode::None,
                }
                .into(),
                other => panic!("unexpected request {:?}", other),
            })
        })
    }

    #[tokio::test]
    async fn leader_assigns_itself_everything() {
        let transport = solo_group(vec![]);
        let coordinator = group(transport.clone(), fast_config());
        assert_eq!(coordinator.state(), CoordinatorState::Unknown);

        coordinator.join().await.unwrap();

        assert_eq!(coordinator.state(), CoordinatorState::Stable);
        assert_eq!(coordinator.epoch(), 1);
        let membership = coordinator.membership();
        assert!(membership.is_leader());
        assert_eq!(membership.generation_id, 1);
        assert_eq!(membership.assignment.partitions_for("purchases"), &[0, 1, 2, 3]);
        assert_eq!(transport.count(ApiKey::GroupCoordinator), 1);

        let joins = transport.bodies(ApiKey::JoinGroup);
        match &joins[0] {
            RequestBody::JoinGroup(req) => {
                assert_eq!(req.member_id, "");
                assert_eq!(req.protocol_type, CONSUMER_PROTOCOL_TYPE);
                assert_eq!(req.protocols[0].metadata.subscription, vec!["purchases"]);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn follower_receives_leader_assignment() {
        let transport = FakeTransport::new(metadata_response("purchases", 4, 1), |_, body| {
            Ok(match body {
                RequestBody::GroupCoordinator(_) => coordinator_response(),
                RequestBody::JoinGroup(_) => join_response(MEMBER, "member-0", vec![]),
                RequestBody::SyncGroup(req) => {
                    assert!(req.assignments.is_empty());
                    SyncGroupResponse {
                        error_code: KafkaCode::None,
                        assignment: MemberAssignment::new(vec![
                            crate::protocol::PartitionAssignment::new("purchases", vec![1, 3]),
                        ]),
                    }
                    .into()
                }
                other => panic!("unexpected request {:?}", other),
            })
        });
        let coordinator = group(transport.clone(), fast_config());

        coordinator.join().await.unwrap();

        assert!(!coordinator.membership().is_leader());
        assert!(coordinator.membership().members.is_empty());
        assert_eq!(coordinator.assignment().partitions_for("purchases"), &[1, 3]);
        // followers never look at partition metadata
        assert_eq!(transport.count(ApiKey::Metadata), 0);
    }

    #[tokio::test]
    async fn heartbeat_rebalance_rejoins_as_same_member() {
        let transport = solo_group(vec![KafkaCode::RebalanceInProgress]);
        let coordinator = group(transport.clone(), fast_config());
        coordinator.join().await.unwrap();

        coordinator.heartbeat().await.unwrap();

        assert_eq!(coordinator.state(), CoordinatorState::Stable);
        assert_eq!(coordinator.epoch(), 2);
        let joins = transport.bodies(ApiKey::JoinGroup);
        assert_eq!(joins.len(), 2);
        match &joins[1] {
            RequestBody::JoinGroup(req) => assert_eq!(req.member_id, MEMBER),
            other => panic!("unexpected request {:?}", other),
        }
        assert_eq!(transport.count(ApiKey::SyncGroup), 2);

        coordinator.heartbeat().await.unwrap();
        assert_eq!(transport.count(ApiKey::JoinGroup), 2);
    }

    #[tokio::test]
    async fn join_retries_through_rebalance_races() {
        let failures = Arc::new(AtomicUsize::new(2));
        let remaining = failures.clone();
        let transport = FakeTransport::new(metadata_response("purchases", 2, 1), move |_, body| {
            Ok(match body {
                RequestBody::GroupCoordinator(_) => coordinator_response(),
                RequestBody::JoinGroup(_) => {
                    if remaining.load(Ordering::SeqCst) > 0 {
                        remaining.fetch_sub(1, Ordering::SeqCst);
                        join_error(KafkaCode::RebalanceInProgress)
                    } else {
                        join_response(MEMBER, MEMBER, solo_member(&["purchases"]))
                    }
                }
                RequestBody::SyncGroup(req) => echo_sync(req),
                other => panic!("unexpected request {:?}", other),
            })
        });
        let coordinator = group(transport.clone(), fast_config());

        coordinator.join().await.unwrap();
        assert_eq!(transport.count(ApiKey::JoinGroup), 3);
        assert_eq!(coordinator.state(), CoordinatorState::Stable);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_rebalance_waits_for_the_running_one() {
        let failures = Arc::new(AtomicUsize::new(0));
        let remaining = failures.clone();
        let transport = FakeTransport::new(metadata_response("purchases", 2, 1), move |_, body| {
            Ok(match body {
                RequestBody::GroupCoordinator(_) => coordinator_response(),
                RequestBody::JoinGroup(_) => {
                    if remaining.load(Ordering::SeqCst) > 0 {
                        remaining.fetch_sub(1, Ordering::SeqCst);
                        join_error(KafkaCode::RebalanceInProgress)
                    } else {
                        join_response(MEMBER, MEMBER, solo_member(&["purchases"]))
                    }
                }
                RequestBody::SyncGroup(req) => echo_sync(req),
                other => panic!("unexpected request {:?}", other),
            })
        });
        let coordinator = group(
            transport.clone(),
            fast_config().rebalance_retry_delay_ms(20),
        );
        coordinator.join().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Stable);

        // the first rebalance is parked in its retry delay when the second
        // one arrives
        failures.store(1, Ordering::SeqCst);
        let (first, joins_seen_by_second) = tokio::join!(coordinator.rebalance(), async {
            coordinator.rebalance().await.unwrap();
            transport.count(ApiKey::JoinGroup)
        });
        first.unwrap();
        assert_eq!(joins_seen_by_second, 3);
        assert_eq!(transport.count(ApiKey::JoinGroup), 3);
        assert_eq!(coordinator.state(), CoordinatorState::Stable);
    }

    #[tokio::test]
    async fn exhausted_retries_are_fatal() {
        let transport = FakeTransport::new(metadata_response("purchases", 2, 1), |_, body| {
            Ok(match body {
                RequestBody::GroupCoordinator(_) => coordinator_response(),
                RequestBody::JoinGroup(_) => join_error(KafkaCode::RebalanceInProgress),
                other => panic!("unexpected request {:?}", other),
            })
        });
        let coordinator = group(transport.clone(), fast_config().rebalance_retries(5));

        assert_eq!(
            coordinator.join().await,
            Err(Error::RetriesExhausted(KafkaCode::RebalanceInProgress))
        );
        assert_eq!(coordinator.state(), CoordinatorState::Down);
        assert_eq!(transport.count(ApiKey::JoinGroup), 5);
        assert_eq!(
            coordinator.wait_until_stable(Duration::from_millis(10)).await,
            Err(Error::CoordinatorNotReady(CoordinatorState::Down))
        );
    }

    #[tokio::test]
    async fn unknown_member_rejoins_with_empty_id() {
        let mut joins = 0;
        let transport = FakeTransport::new(metadata_response("purchases", 2, 1), move |_, body| {
            Ok(match body {
                RequestBody::GroupCoordinator(_) => coordinator_response(),
                RequestBody::JoinGroup(_) => {
                    joins += 1;
                    if joins == 2 {
                        join_error(KafkaCode::UnknownMemberId)
                    } else {
                        join_response(MEMBER, MEMBER, solo_member(&["purchases"]))
                    }
                }
                RequestBody::SyncGroup(req) => echo_sync(req),
                RequestBody::Heartbeat(_) => heartbeat_response(KafkaCode::UnknownMemberId),
                other => panic!("unexpected request {:?}", other),
            })
        });
        let coordinator = group(transport.clone(), fast_config());
        coordinator.join().await.unwrap();

        coordinator.heartbeat().await.unwrap();

        let member_ids = transport
            .bodies(ApiKey::JoinGroup)
            .into_iter()
            .map(|body| match body {
                RequestBody::JoinGroup(req) => req.member_id,
                other => panic!("unexpected request {:?}", other),
            })
            .collect::<Vec<_>>();
        assert_eq!(member_ids, vec!["", MEMBER, ""]);
        assert_eq!(coordinator.state(), CoordinatorState::Stable);
    }

    #[tokio::test]
    async fn fatal_heartbeat_error_is_surfaced() {
        let transport = solo_group(vec![KafkaCode::GroupAuthorizationFailed]);
        let coordinator = group(transport, fast_config());
        coordinator.join().await.unwrap();

        assert_eq!(
            coordinator.heartbeat().await,
            Err(Error::KafkaError(KafkaCode::GroupAuthorizationFailed))
        );
    }

    #[tokio::test]
    async fn heartbeat_task_runs_on_its_own() {
        let transport = solo_group(vec![]);
        let coordinator = group(transport.clone(), fast_config().heartbeat_interval_ms(10));
        coordinator.join().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(transport.count(ApiKey::Heartbeat) >= 2);

        coordinator.leave().await.unwrap();
        let sent = transport.count(ApiKey::Heartbeat);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.count(ApiKey::Heartbeat), sent);
    }

    #[tokio::test]
    async fn leave_resets_membership() {
        let transport = solo_group(vec![]);
        let coordinator = group(transport.clone(), fast_config());

        assert_eq!(coordinator.leave().await, Err(Error::NotAMember));
        assert_eq!(coordinator.heartbeat().await, Err(Error::NotAMember));

        coordinator.join().await.unwrap();
        coordinator.leave().await.unwrap();

        match &transport.bodies(ApiKey::LeaveGroup)[0] {
            RequestBody::LeaveGroup(req) => {
                assert_eq!(req.group_id, "group");
                assert_eq!(req.member_id, MEMBER);
            }
            other => panic!("unexpected request {:?}", other),
        }
        assert_eq!(coordinator.state(), CoordinatorState::Unknown);
        assert_eq!(coordinator.membership(), Membership::default());
        assert_eq!(coordinator.epoch(), 2);
    }

    #[tokio::test]
    async fn wait_until_stable_times_out() {
        let transport = solo_group(vec![]);
        let coordinator = group(transport, fast_config());

        assert_eq!(
            coordinator.wait_until_stable(Duration::from_millis(10)).await,
            Err(Error::CoordinatorNotReady(CoordinatorState::Unknown))
        );

        let mut states = coordinator.subscribe();
        coordinator.join().await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), CoordinatorState::Stable);
        coordinator
            .wait_until_stable(Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_bad_arguments() {
        let transport = solo_group(vec![]);
        let metadata = Arc::new(
            MetadataCache::new(transport, vec![BrokerAddress::new("seed", 9092)]).unwrap(),
        );
        assert!(Coordinator::new("", &["t".to_owned()], metadata.clone(), fast_config()).is_err());
        assert!(Coordinator::new("g", &[], metadata.clone(), fast_config()).is_err());
        assert!(Coordinator::new("g", &[String::new()], metadata, fast_config()).is_err());
    }
}

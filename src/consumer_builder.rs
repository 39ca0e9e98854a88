use std::sync::Arc;
use std::time::Duration;

use crate::{
    client::{Client, ClientConfig, Transport},
    consumer::{Consumer, ConsumerConfig},
    coordinator::{Coordinator, CoordinatorConfig},
    error::{Error, Result},
    metadata::MetadataCache,
    offset_recorder::CommitPolicy,
};

/// Configure a [`Consumer`].
///
/// Every consumer built here owns its client, metadata cache and group
/// coordinator. Nothing is shared behind the caller's back.
#[derive(Clone, Debug)]
pub struct ConsumerBuilder {
    client_config: ClientConfig,
    group_id: String,
    topics: Vec<String>,
    coordinator_config: CoordinatorConfig,
    config: ConsumerConfig,
}

impl ConsumerBuilder {
    /// Start a consumer builder for a member of `group_id` reading `topics`.
    pub fn new<T: AsRef<str>, U: AsRef<str>>(
        bootstrap_addrs: &[T],
        group_id: &str,
        topics: &[U],
    ) -> Result<Self> {
        if group_id.is_empty() {
            return Err(Error::ArgumentError("group id is empty".to_owned()));
        }
        Ok(Self {
            client_config: ClientConfig::new(bootstrap_addrs)?,
            group_id: group_id.to_owned(),
            topics: topics.iter().map(|t| t.as_ref().to_owned()).collect(),
            coordinator_config: CoordinatorConfig::default(),
            config: ConsumerConfig::default(),
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

    /// The maximum time the broker waits for `min_bytes` to accumulate.
    pub fn max_wait_ms(&mut self, max_wait_ms: i32) -> &mut Self {
        self.config.max_wait_ms = max_wait_ms;
        self
    }

    /// The minimum bytes to accumulate in the response.
    pub fn min_bytes(&mut self, min_bytes: i32) -> &mut Self {
        self.config.min_bytes = min_bytes;
        self
    }

    /// The maximum bytes to fetch from one partition.
    pub fn max_bytes(&mut self, max_bytes: i32) -> &mut Self {
        self.config.max_bytes = max_bytes;
        self
    }

    /// How long a fetch waits for the group to become stable.
    pub fn stable_wait(&mut self, stable_wait: Duration) -> &mut Self {
        self.config.stable_wait = stable_wait;
        self
    }

    pub fn commit_policy(&mut self, commit_policy: CommitPolicy) -> &mut Self {
        self.config.commit_policy = commit_policy;
        self
    }

    pub fn session_timeout_ms(&mut self, session_timeout_ms: i32) -> &mut Self {
        self.coordinator_config.session_timeout_ms = session_timeout_ms;
        self
    }

    pub fn heartbeat_interval_ms(&mut self, heartbeat_interval_ms: u64) -> &mut Self {
        self.coordinator_config.heartbeat_interval_ms = heartbeat_interval_ms;
        self
    }

    /// How many join/sync rounds a rebalance may take, and the pause between them.
    pub fn rebalance_retries(&mut self, retries: usize, delay_ms: u64) -> &mut Self {
        self.coordinator_config.rebalance_retries = retries;
        self.coordinator_config.rebalance_retry_delay_ms = delay_ms;
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn coordinator_config(&self) -> &CoordinatorConfig {
        &self.coordinator_config
    }

    /// Build the consumer over a pooled TCP [`Client`]. Call
    /// [`Consumer::join`] before fetching.
    pub fn build(&self) -> Result<Arc<Consumer>> {
        let client = Client::new(self.client_config.clone());
        self.build_with_transport(Arc::new(client))
    }

    pub fn build_with_transport(&self, transport: Arc<dyn Transport>) -> Result<Arc<Consumer>> {
        let metadata = Arc::new(MetadataCache::new(
            transport,
            self.client_config.bootstrap_addrs.clone(),
        )?);
        let coordinator = Coordinator::new(
            &self.group_id,
            &self.topics,
            metadata.clone(),
            self.coordinator_config.clone(),
        )?;
        Ok(Arc::new(Consumer::new(
            coordinator,
            metadata,
            self.config.clone(),
        )))
    }
}

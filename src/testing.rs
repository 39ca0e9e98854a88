//! Scripted transport for unit tests.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    client::Transport,
    error::{Error, KafkaCode, Result},
    network::BrokerAddress,
    protocol::{
        join_group::response::Member,
        metadata::response::{Partition, Topic},
        ApiKey, Broker, FindCoordinatorResponse, HeartbeatResponse, JoinGroupResponse,
        LeaveGroupResponse, MetadataResponse, RequestBody, ResponseBody, SyncGroupResponse,
    },
};

type Handler = Box<dyn FnMut(&BrokerAddress, &RequestBody) -> Result<ResponseBody> + Send>;

/// Answers metadata requests from a fixed response and everything else
/// through a handler closure. Every submitted request is recorded.
pub struct FakeTransport {
    metadata: Mutex<MetadataResponse>,
    handler: Mutex<Option<Handler>>,
    requests: Mutex<Vec<(BrokerAddress, RequestBody)>>,
}

impl FakeTransport {
    pub fn metadata(metadata: MetadataResponse) -> Arc<Self> {
        Arc::new(Self {
            metadata: Mutex::new(metadata),
            handler: Mutex::new(None),
            requests: Mutex::new(vec![]),
        })
    }

    pub fn new<F>(metadata: MetadataResponse, handler: F) -> Arc<Self>
    where
        F: FnMut(&BrokerAddress, &RequestBody) -> Result<ResponseBody> + Send + 'static,
    {
        let transport = Self::metadata(metadata);
        transport.set_handler(handler);
        transport
    }

    pub fn set_handler<F>(&self, handler: F)
    where
        F: FnMut(&BrokerAddress, &RequestBody) -> Result<ResponseBody> + Send + 'static,
    {
        *self.handler.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn set_metadata(&self, metadata: MetadataResponse) {
        *self.metadata.lock().unwrap() = metadata;
    }

    pub fn requests(&self) -> Vec<(BrokerAddress, RequestBody)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bodies(&self, api_key: ApiKey) -> Vec<RequestBody> {
        self.requests()
            .into_iter()
            .map(|(_, body)| body)
            .filter(|body| body.api_key() == api_key)
            .collect()
    }

    pub fn count(&self, api_key: ApiKey) -> usize {
        self.bodies(api_key).len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn submit(&self, broker: &BrokerAddress, body: RequestBody) -> Result<ResponseBody> {
        self.requests
            .lock()
            .unwrap()
            .push((broker.clone(), body.clone()));

        if let RequestBody::Metadata(_) = body {
            return Ok(self.metadata.lock().unwrap().clone().into());
        }
        match self.handler.lock().unwrap().as_mut() {
            Some(handler) => handler(broker, &body),
            None => Err(Error::IoError(std::io::ErrorKind::ConnectionRefused)),
        }
    }
}

/// Metadata for one topic whose partitions are spread over `brokers`
/// nodes numbered from 1, each listening on `brokerN:9092`.
pub fn metadata_response(topic: &str, partitions: i32, brokers: i32) -> MetadataResponse {
    MetadataResponse {
        brokers: (1..=brokers)
            .map(|node_id| Broker {
                node_id,
                host: format!("broker{}", node_id),
                port: 9092,
            })
            .collect(),
        topics: vec![Topic {
            error_code: KafkaCode::None,
            name: topic.to_owned(),
            partitions: (0..partitions)
                .map(|partition_index| {
                    let leader_id = partition_index % brokers + 1;
                    Partition {
                        error_code: KafkaCode::None,
                        partition_index,
                        leader_id,
                        replica_nodes: vec![leader_id],
                        isr_nodes: vec![leader_id],
                    }
                })
                .collect(),
        }],
    }
}

pub const MEMBER_ID: &str = "member-1";

/// Answers the membership requests of a group whose only member leads
/// itself, echoing the leader's own assignment back in SyncGroup.
pub fn solo_group_reply(body: &RequestBody) -> Option<ResponseBody> {
    let reply: ResponseBody = match body {
        RequestBody::GroupCoordinator(_) => FindCoordinatorResponse {
            error_code: KafkaCode::None,
            node_id: 1,
            host: "broker1".to_owned(),
            port: 9092,
        }
        .into(),
        RequestBody::JoinGroup(req) => JoinGroupResponse {
            error_code: KafkaCode::None,
            generation_id: 1,
            protocol_name: req.protocols[0].name.clone(),
            leader: MEMBER_ID.to_owned(),
            member_id: MEMBER_ID.to_owned(),
            members: vec![Member {
                member_id: MEMBER_ID.to_owned(),
                metadata: req.protocols[0].metadata.clone(),
            }],
        }
        .into(),
        RequestBody::SyncGroup(req) => SyncGroupResponse {
            error_code: KafkaCode::None,
            assignment: req
                .assignments
                .iter()
                .find(|a| a.member_id == req.member_id)
                .map(|a| a.assignment.clone())
                .unwrap_or_default(),
        }
        .into(),
        RequestBody::Heartbeat(_) => HeartbeatResponse {
            error_code: KafkaCode::None,
        }
        .into(),
        RequestBody::LeaveGroup(_) => LeaveGroupResponse {
            error_code: KafkaCode::None,
        }
        .into(),
        _ => return None,
    };
    Some(reply)
}

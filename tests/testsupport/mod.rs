//! An in-process broker speaking just enough of the protocol for the
//! integration tests: one node, in-memory partition logs, one group
//! whose every member leads itself.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use franz::prelude::{
    bytes::Bytes,
    encode::{encode_with_length, ToByte},
    protocol::{
        commit_offset, fetch, join_group, list_offsets, metadata, offset_fetch, produce, Broker,
        FindCoordinatorResponse, HeartbeatResponse, JoinGroupResponse, LeaveGroupResponse,
        MemberAssignment, Message, MessageSet, MessageSetEntry, MetadataResponse, Request,
        RequestBody, Response, ResponseBody, SyncGroupResponse,
    },
    Compression, KafkaCode,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub const MEMBER_ID: &str = "member-1";
const NODE_ID: i32 = 1;

#[derive(Debug, Default)]
struct State {
    partitions: HashMap<String, i32>,
    logs: HashMap<(String, i32), Vec<Message>>,
    commits: HashMap<(String, i32), i64>,
    correlation_ids: Vec<i32>,
    connections: usize,
}

pub struct MockBroker {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    handle: JoinHandle<()>,
}

impl MockBroker {
    /// Listen on an ephemeral local port, serving `topics` as
    /// `(name, partition count)`.
    pub async fn start(topics: &[(&str, i32)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State {
            partitions: topics
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
            ..Default::default()
        }));

        let accepting = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepting.lock().unwrap().connections += 1;
                tokio::spawn(serve(socket, addr, accepting.clone()));
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn bootstrap(&self) -> String {
        self.addr.to_string()
    }

    /// Number of sockets accepted so far.
    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    /// Correlation ids in the order requests arrived.
    pub fn correlation_ids(&self) -> Vec<i32> {
        self.state.lock().unwrap().correlation_ids.clone()
    }

    /// The values stored in one partition log.
    pub fn values(&self, topic: &str, partition: i32) -> Vec<Bytes> {
        self.state
            .lock()
            .unwrap()
            .logs
            .get(&(topic.to_owned(), partition))
            .map(|log| log.iter().filter_map(|m| m.value.clone()).collect())
            .unwrap_or_default()
    }

    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .commits
            .get(&(topic.to_owned(), partition))
            .copied()
    }

    /// Append messages to a partition as if another producer wrote them.
    pub fn append(&self, topic: &str, partition: i32, values: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let log = state.logs.entry((topic.to_owned(), partition)).or_default();
        log.extend(
            values
                .iter()
                .map(|v| Message::new(None, Some(Bytes::from(v.to_string())))),
        );
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut socket: TcpStream, addr: SocketAddr, state: Arc<Mutex<State>>) {
    loop {
        let length = match socket.read_i32().await {
            Ok(length) => length,
            Err(_) => return,
        };
        let mut frame = vec![0; length as usize];
        if socket.read_exact(&mut frame).await.is_err() {
            return;
        }
        let request = match Request::try_from(Bytes::from(frame)) {
            Ok(request) => request,
            Err(err) => {
                tracing::error!("mock broker could not parse a request {:?}", err);
                return;
            }
        };

        let correlation_id = request.header.correlation_id;
        let reply = {
            let mut state = state.lock().unwrap();
            state.correlation_ids.push(correlation_id);
            answer(&mut state, addr, request.body)
        };
        let Some(body) = reply else {
            continue;
        };

        let mut buffer = vec![];
        encode_with_length(&mut buffer, |buffer| {
            Response::new(correlation_id, body).encode(buffer)
        })
        .unwrap();
        if socket.write_all(&buffer).await.is_err() {
            return;
        }
    }
}

fn answer(state: &mut State, addr: SocketAddr, body: RequestBody) -> Option<ResponseBody> {
    let reply: ResponseBody = match body {
        RequestBody::Metadata(req) => {
            let names: Vec<String> = if req.topics.is_empty() {
                state.partitions.keys().cloned().collect()
            } else {
                req.topics
            };
            MetadataResponse {
                brokers: vec![broker(addr)],
                topics: names
                    .into_iter()
                    .map(|name| match state.partitions.get(&name) {
                        Some(count) => metadata::response::Topic {
                            error_code: KafkaCode::None,
                            name,
                            partitions: (0..*count)
                                .map(|partition_index| metadata::response::Partition {
                                    error_code: KafkaCode::None,
                                    partition_index,
                                    leader_id: NODE_ID,
                                    replica_nodes: vec![NODE_ID],
                                    isr_nodes: vec![NODE_ID],
                                })
                                .collect(),
                        },
                        None => metadata::response::Topic {
                            error_code: KafkaCode::UnknownTopicOrPartition,
                            name,
                            partitions: vec![],
                        },
                    })
                    .collect(),
            }
            .into()
        }
        RequestBody::Produce(req) => {
            let acks = req.required_acks;
            let mut responses = vec![];
            for topic in req.topics {
                let mut partition_responses = vec![];
                for data in topic.partitions {
                    let log = state
                        .logs
                        .entry((topic.name.clone(), data.partition))
                        .or_default();
                    let base_offset = log.len() as i64;
                    log.extend(data.message_set.entries.into_iter().map(|e| e.message));
                    partition_responses.push(produce::response::PartitionResponse {
                        index: data.partition,
                        error_code: KafkaCode::None,
                        base_offset,
                    });
                }
                responses.push(produce::response::TopicProduceResponse {
                    name: topic.name,
                    partition_responses,
                });
            }
            if acks == 0 {
                return None;
            }
            produce::response::ProduceResponse { responses }.into()
        }
        RequestBody::Fetch(req) => fetch::response::FetchResponse {
            topics: req
                .topics
                .into_iter()
                .map(|topic| fetch::response::Topic {
                    partitions: topic
                        .partitions
                        .iter()
                        .map(|p| {
                            let log = state
                                .logs
                                .get(&(topic.topic_name.clone(), p.partition_index))
                                .cloned()
                                .unwrap_or_default();
                            let entries = log
                                .into_iter()
                                .enumerate()
                                .skip(p.offset.max(0) as usize)
                                .map(|(offset, message)| MessageSetEntry {
                                    offset: offset as i64,
                                    message,
                                })
                                .collect::<Vec<_>>();
                            fetch::response::Partition {
                                id: p.partition_index,
                                error_code: KafkaCode::None,
                                high_water_mark: p.offset.max(0) + entries.len() as i64,
                                message_set: MessageSet {
                                    compression: Compression::None,
                                    entries,
                                },
                            }
                        })
                        .collect(),
                    name: topic.topic_name,
                })
                .collect(),
        }
        .into(),
        RequestBody::Offsets(req) => list_offsets::response::ListOffsetsResponse {
            topics: req
                .topics
                .into_iter()
                .map(|topic| list_offsets::response::Topic {
                    partitions: topic
                        .partitions
                        .iter()
                        .map(|p| {
                            let end = state
                                .logs
                                .get(&(topic.name.clone(), p.partition_index))
                                .map(|log| log.len() as i64)
                                .unwrap_or_default();
                            // -2 asks for the earliest offset
                            let offset = if p.timestamp == -2 { 0 } else { end };
                            list_offsets::response::Partition {
                                partition_index: p.partition_index,
                                error_code: KafkaCode::None,
                                offsets: vec![offset],
                            }
                        })
                        .collect(),
                    name: topic.name,
                })
                .collect(),
        }
        .into(),
        RequestBody::OffsetCommit(req) => commit_offset::response::OffsetCommitResponse {
            topics: req
                .topics
                .into_iter()
                .map(|topic| {
                    for p in topic.partitions.iter() {
                        state
                            .commits
                            .insert((topic.name.clone(), p.partition_index), p.committed_offset);
                    }
                    commit_offset::response::Topic {
                        partitions: topic
                            .partitions
                            .iter()
                            .map(|p| commit_offset::response::Partition {
                                partition_index: p.partition_index,
                                error_code: KafkaCode::None,
                            })
                            .collect(),
                        name: topic.name,
                    }
                })
                .collect(),
        }
        .into(),
        RequestBody::OffsetFetch(req) => offset_fetch::response::OffsetFetchResponse {
            topics: req
                .topics
                .into_iter()
                .map(|topic| offset_fetch::response::Topic {
                    partitions: topic
                        .partition_indexes
                        .iter()
                        .map(|&partition_index| offset_fetch::response::Partition {
                            partition_index,
                            committed_offset: state
                                .commits
                                .get(&(topic.name.clone(), partition_index))
                                .copied()
                                .unwrap_or(-1),
                            metadata: None,
                            error_code: KafkaCode::None,
                        })
                        .collect(),
                    name: topic.name,
                })
                .collect(),
        }
        .into(),
        RequestBody::GroupCoordinator(_) => FindCoordinatorResponse {
            error_code: KafkaCode::None,
            node_id: NODE_ID,
            host: addr.ip().to_string(),
            port: addr.port() as i32,
        }
        .into(),
        RequestBody::JoinGroup(req) => JoinGroupResponse {
            error_code: KafkaCode::None,
            generation_id: 1,
            protocol_name: req.protocols[0].name.clone(),
            leader: MEMBER_ID.to_owned(),
            member_id: MEMBER_ID.to_owned(),
            members: vec![join_group::response::Member {
                member_id: MEMBER_ID.to_owned(),
                metadata: req.protocols[0].metadata.clone(),
            }],
        }
        .into(),
        RequestBody::SyncGroup(req) => SyncGroupResponse {
            error_code: KafkaCode::None,
            assignment: req
                .assignments
                .into_iter()
                .find(|a| a.member_id == req.member_id)
                .map(|a| a.assignment)
                .unwrap_or_else(MemberAssignment::default),
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
        other => {
            tracing::warn!("mock broker ignores {:?}", other.api_key());
            return None;
        }
    };
    Some(reply)
}

fn broker(addr: SocketAddr) -> Broker {
    Broker {
        node_id: NODE_ID,
        host: addr.ip().to_string(),
        port: addr.port() as i32,
    }
}

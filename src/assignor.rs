//! Leader side partition assignment.
//!
//! Each topic is handled on its own: the members that subscribed to it
//! are taken in the order the join response listed them, and partition
//! `i` of the sorted partition list goes to member `i % n`. A member
//! that did not subscribe to a topic gets nothing from it.
//!
//! The result depends on member order, so a rebalance may move every
//! partition even when membership barely changed.
use std::collections::{BTreeMap, BTreeSet};

use crate::protocol::{join_group::response::Member, Assignment, MemberAssignment, PartitionAssignment};

/// Name of the only assignment protocol this client offers.
pub const ROUND_ROBIN_PROTOCOL: &str = "roundrobin";
/// Protocol type of regular consumers.
pub const CONSUMER_PROTOCOL_TYPE: &str = "consumer";

/// Every topic some member subscribed to, sorted.
pub fn subscribed_topics(members: &[Member]) -> Vec<String> {
    members
        .iter()
        .flat_map(|m| m.metadata.subscription.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Split the partitions of every topic between the members subscribed
/// to it. `topic_partitions` holds sorted partition ids per topic; topics
/// missing from it assign nothing. Every member gets an entry, even an
/// empty one.
pub fn assign(members: &[Member], topic_partitions: &BTreeMap<String, Vec<i32>>) -> Vec<Assignment> {
    let mut per_member: Vec<Vec<PartitionAssignment>> = vec![vec![]; members.len()];

    for (topic, partitions) in topic_partitions {
        let subscribers = members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.metadata.subscription.iter().any(|t| t == topic))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        if subscribers.is_empty() {
            continue;
        }

        let mut split = vec![vec![]; subscribers.len()];
        for (i, partition) in partitions.iter().enumerate() {
            split[i % subscribers.len()].push(*partition);
        }

        for (member_index, partitions) in subscribers.into_iter().zip(split) {
            if !partitions.is_empty() {
                per_member[member_index].push(PartitionAssignment::new(topic, partitions));
            }
        }
    }

    members
        .iter()
        .zip(per_member)
        .map(|(member, partitions)| {
            tracing::info!(
                "Assigning {:?} to member {}",
                partitions,
                member.member_id
            );
            Assignment::new(&member.member_id, MemberAssignment::new(partitions))
        })
        .collect()
}

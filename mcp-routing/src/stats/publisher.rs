/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Collaborators the statistics managers publish through.
//!
//! Managers never send anything themselves: a change asks the
//! [`PublishScheduler`] for a delayed task, and the task eventually calls
//! back into the manager, which hands its state to a
//! [`SubCoveringFilterPublisher`]. [`AttributePublisher`] is the publisher
//! used in production; it encodes each payload and stores it as a membership
//! attribute through an [`AttributeSink`].

use crate::error::ClusterResult;
use crate::membership::remote_server_record::RemoteServerRecord;
use crate::membership::removed_servers::RemovedServers;
use crate::stats::local_monitoring::{HaStatus, HealthStatus};
use crate::stats::RetainedStatsMap;
use crate::wire::attributes::{self, ForwardingEndpoint, LocalServerInfo};
use crate::wire::filter_tags;
use crate::wire::sub_covering_filter::RemoteSubscriptionStats;
use bytes::Bytes;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const ATTRIBUTE_PUBLISHER_TAG: &str = "AttributePublisher:";
const ATTRIBUTE_PUBLISHER_FN_PUBLISH_TAG: &str = "publish:";

/// Timer collaborator that runs a manager's publish operation later.
///
/// A task handed over is fire-and-forget; implementations must tolerate the
/// manager having been closed by the time the task runs.
pub trait PublishScheduler: Send + Sync {
    fn schedule_publish_retained_task(&self, delay: Duration) -> ClusterResult<()>;

    fn schedule_publish_monitoring_task(&self, delay: Duration) -> ClusterResult<()>;
}

/// Sends this node's statistics to its peers. Returns the sequence number
/// the payload was published with.
pub trait SubCoveringFilterPublisher: Send + Sync {
    fn publish_retained_stats(&self, stats: &RetainedStatsMap) -> ClusterResult<i64>;

    fn publish_monitoring_status(&self, health: HealthStatus, ha: HaStatus)
        -> ClusterResult<i64>;
}

/// Key/value store replicated to peers by the membership service.
pub trait AttributeSink: Send + Sync {
    fn set_attribute(&self, key: &str, value: Bytes) -> ClusterResult<()>;
}

#[derive(Debug, Default)]
struct SequenceNumbers {
    retained: AtomicI64,
    monitoring: AtomicI64,
    removed_servers: AtomicI64,
    restored_not_in_view: AtomicI64,
    subscription_stats: AtomicI64,
}

fn next(counter: &AtomicI64) -> i64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

/// Encodes payloads and stores them as attributes, one sequence per kind.
pub struct AttributePublisher {
    name: String,
    sink: Arc<dyn AttributeSink>,
    sqn: SequenceNumbers,
}

impl AttributePublisher {
    pub fn new(name: &str, sink: Arc<dyn AttributeSink>) -> Self {
        Self {
            name: name.to_string(),
            sink,
            sqn: SequenceNumbers::default(),
        }
    }

    fn store(&self, key: &str, sqn: i64, value: Bytes) -> ClusterResult<i64> {
        debug!(
            "{}:{}:{} {key} sqn={sqn} len={}",
            self.name,
            ATTRIBUTE_PUBLISHER_TAG,
            ATTRIBUTE_PUBLISHER_FN_PUBLISH_TAG,
            value.len()
        );
        self.sink.set_attribute(key, value)?;
        Ok(sqn)
    }

    pub fn publish_removed_servers(&self, removed: &RemovedServers) -> ClusterResult<i64> {
        let sqn = next(&self.sqn.removed_servers);
        let payload = attributes::encode_removed_servers(sqn, removed)?;
        self.store(filter_tags::REMOVED_SERVERS_LIST, sqn, payload)
    }

    pub fn publish_restored_not_in_view(
        &self,
        records: &[RemoteServerRecord],
    ) -> ClusterResult<i64> {
        let sqn = next(&self.sqn.restored_not_in_view);
        let payload = attributes::encode_restored_not_in_view(sqn, records)?;
        self.store(filter_tags::RESTORED_NOT_IN_VIEW, sqn, payload)
    }

    pub fn publish_subscription_stats(
        &self,
        stats: &RemoteSubscriptionStats,
    ) -> ClusterResult<i64> {
        let sqn = next(&self.sqn.subscription_stats);
        let payload = attributes::encode_subscription_stats(sqn, stats)?;
        self.store(filter_tags::WCSUB_STATS, sqn, payload)
    }

    pub fn publish_local_server_info(&self, info: &LocalServerInfo) -> ClusterResult<()> {
        self.store(filter_tags::LOCAL_SERVER_INFO, 0, info.encode()?)?;
        Ok(())
    }

    pub fn publish_forwarding_endpoint(&self, endpoint: &ForwardingEndpoint) -> ClusterResult<()> {
        self.store(filter_tags::FWD_ENDPOINT, 0, endpoint.encode()?)?;
        Ok(())
    }
}

impl SubCoveringFilterPublisher for AttributePublisher {
    fn publish_retained_stats(&self, stats: &RetainedStatsMap) -> ClusterResult<i64> {
        let sqn = next(&self.sqn.retained);
        let payload = attributes::encode_retained_stats(
            sqn,
            stats.iter().map(|(uid, data)| (uid.as_str(), data.as_ref())),
        )?;
        self.store(filter_tags::RETAINED_STATS, sqn, payload)
    }

    fn publish_monitoring_status(
        &self,
        health: HealthStatus,
        ha: HaStatus,
    ) -> ClusterResult<i64> {
        let sqn = next(&self.sqn.monitoring);
        let payload = attributes::encode_monitoring_status(sqn, health, ha);
        self.store(filter_tags::MONITORING_STATUS, sqn, payload)
    }
}

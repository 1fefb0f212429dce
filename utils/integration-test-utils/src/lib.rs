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

//! Recording and call-counting fakes of the `mcp-routing` collaborator
//! traits, shared by the integration tests.

use bytes::Bytes;
use mcp_routing::forwarding::{ProtocolRemoteServerCallback, ProtocolRsEvent, ProtocolRsEventType};
use mcp_routing::membership::{AttributeMap, ViewKeeper};
use mcp_routing::stats::local_monitoring::{HaStatus, HealthStatus};
use mcp_routing::stats::RetainedStatsMap;
use mcp_routing::{
    AttributeSink, ClusterHandle, ClusterResult, ProtocolHandle, PublishScheduler,
    SubCoveringFilterPublisher,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;
use std::time::Duration;
use tracing::debug;

static INIT_LOGGING: Once = Once::new();

/// Installs a `tracing` subscriber honoring `RUST_LOG`, once per process.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Records every publish request instead of running it.
#[derive(Default)]
pub struct CountingScheduler {
    retained: Mutex<Vec<Duration>>,
    monitoring: Mutex<Vec<Duration>>,
}

impl CountingScheduler {
    pub fn retained_count(&self) -> usize {
        self.retained.lock().len()
    }

    pub fn monitoring_count(&self) -> usize {
        self.monitoring.lock().len()
    }

    pub fn retained_delays(&self) -> Vec<Duration> {
        self.retained.lock().clone()
    }

    pub fn monitoring_delays(&self) -> Vec<Duration> {
        self.monitoring.lock().clone()
    }
}

impl PublishScheduler for CountingScheduler {
    fn schedule_publish_retained_task(&self, delay: Duration) -> ClusterResult<()> {
        self.retained.lock().push(delay);
        Ok(())
    }

    fn schedule_publish_monitoring_task(&self, delay: Duration) -> ClusterResult<()> {
        self.monitoring.lock().push(delay);
        Ok(())
    }
}

/// Keeps a copy of everything handed to it for publication.
#[derive(Default)]
pub struct RecordingPublisher {
    retained: Mutex<Vec<RetainedStatsMap>>,
    monitoring: Mutex<Vec<(HealthStatus, HaStatus)>>,
}

impl RecordingPublisher {
    pub fn retained(&self) -> Vec<RetainedStatsMap> {
        self.retained.lock().clone()
    }

    pub fn monitoring(&self) -> Vec<(HealthStatus, HaStatus)> {
        self.monitoring.lock().clone()
    }
}

impl SubCoveringFilterPublisher for RecordingPublisher {
    fn publish_retained_stats(&self, stats: &RetainedStatsMap) -> ClusterResult<i64> {
        let mut retained = self.retained.lock();
        retained.push(stats.clone());
        Ok(retained.len() as i64)
    }

    fn publish_monitoring_status(&self, health: HealthStatus, ha: HaStatus) -> ClusterResult<i64> {
        let mut monitoring = self.monitoring.lock();
        monitoring.push((health, ha));
        Ok(monitoring.len() as i64)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewTransition {
    Connected(ClusterHandle),
    Disconnected(ClusterHandle),
}

#[derive(Default)]
pub struct RecordingViewKeeper {
    transitions: Mutex<Vec<ViewTransition>>,
}

impl RecordingViewKeeper {
    pub fn transitions(&self) -> Vec<ViewTransition> {
        self.transitions.lock().clone()
    }
}

impl ViewKeeper for RecordingViewKeeper {
    fn node_forwarding_connected(&self, node: ClusterHandle) -> ClusterResult<()> {
        self.transitions.lock().push(ViewTransition::Connected(node));
        Ok(())
    }

    fn node_forwarding_disconnected(&self, node: ClusterHandle) -> ClusterResult<()> {
        self.transitions
            .lock()
            .push(ViewTransition::Disconnected(node));
        Ok(())
    }
}

/// An owned copy of one [`ProtocolRsEvent`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    pub event_type: ProtocolRsEventType,
    pub protocol_handle: Option<ProtocolHandle>,
    pub server_uid: String,
    pub address: Option<String>,
    pub cluster_handle: Option<ClusterHandle>,
}

/// Records each event and answers `Create` with a fresh protocol handle.
#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<RecordedEvent>>,
    next_handle: AtomicU64,
}

impl RecordingCallback {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl ProtocolRemoteServerCallback for RecordingCallback {
    fn on_remote_server_event(
        &self,
        event: &ProtocolRsEvent<'_>,
    ) -> ClusterResult<Option<ProtocolHandle>> {
        self.events.lock().push(RecordedEvent {
            event_type: event.event_type,
            protocol_handle: event.protocol_handle,
            server_uid: event.server_uid.to_string(),
            address: event.address.map(str::to_string),
            cluster_handle: event.cluster_handle,
        });
        if event.event_type == ProtocolRsEventType::Create {
            let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(Some(ProtocolHandle(handle)));
        }
        Ok(None)
    }
}

/// Stands in for the membership service: stores the latest value per key.
#[derive(Default)]
pub struct InMemoryAttributeSink {
    attributes: Mutex<AttributeMap>,
    writes: AtomicU64,
}

impl InMemoryAttributeSink {
    /// What a peer would currently see for this node.
    pub fn snapshot(&self) -> AttributeMap {
        self.attributes.lock().clone()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.attributes.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Bytes> {
        self.attributes.lock().remove(key)
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl AttributeSink for InMemoryAttributeSink {
    fn set_attribute(&self, key: &str, value: Bytes) -> ClusterResult<()> {
        debug!("InMemoryAttributeSink: {key} len={}", value.len());
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.attributes.lock().insert(key.to_string(), value);
        Ok(())
    }
}

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

use crate::config::ControlPlaneConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::forwarding::{ForwardingControlAdapter, RemoteServerInfo};
use crate::handles::{ClusterHandle, EngineHandle, ProtocolHandle};
use crate::membership::peer_attributes::{AttributeMap, PeerAttributeState, RemovedServersDelta};
use crate::membership::remote_server_record::RemoteServerRecord;
use crate::membership::removed_servers::RemovedServers;
use crate::membership::view_notify_event::ViewKeeper;
use crate::observability::LogListener;
use crate::runtime::publish_scheduler::TokioPublishScheduler;
use crate::stats::global_retained::GlobalRetainedStatsManager;
use crate::stats::local_monitoring::{HaStatus, HealthStatus, LocalMonitoringManager};
use crate::stats::local_retained::LocalRetainedStatsManager;
use crate::stats::publisher::{AttributePublisher, AttributeSink, PublishScheduler};
use crate::wire::attributes::{ForwardingEndpoint, LocalServerInfo};
use crate::wire::sub_covering_filter::RemoteSubscriptionStats;
use crate::wire::ATTR_VERSION;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

const CONTROL_PLANE_TAG: &str = "ClusterControlPlane:";
const CONTROL_PLANE_FN_NEW_TAG: &str = "new():";
const CONTROL_PLANE_FN_START_TAG: &str = "start():";
const CONTROL_PLANE_FN_CLOSE_TAG: &str = "close():";
const CONTROL_PLANE_FN_REMOVED_TAG: &str = "add_removed_server():";
const CONTROL_PLANE_FN_PEER_TAG: &str = "on_peer_attributes():";
const CONTROL_PLANE_FN_VIEW_TAG: &str = "view_keeper:";
const CONTROL_PLANE_FN_CHANNEL_TAG: &str = "forwarding_channel:";
const CONTROL_PLANE_FN_TEAR_DOWN_TAG: &str = "tear_down_removed_servers():";

/// What one round of peer attribute delivery changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerUpdate {
    pub retained_stats: bool,
    pub monitoring_status: bool,
    pub subscription_stats: bool,
    pub removed_servers: RemovedServersDelta,
    pub restored_not_in_view: Vec<RemoteServerRecord>,
}

/// A forwarding channel the protocol layer created for one peer.
#[derive(Clone, Debug)]
struct ForwardingChannel {
    protocol_handle: ProtocolHandle,
    engine_handle: EngineHandle,
    server_name: String,
    server_uid: String,
}

/// Owns every control-plane component of one cluster member and routes
/// local updates out and peer attributes in.
pub struct ClusterControlPlane {
    name: String,
    config: ControlPlaneConfig,
    log_listener: LogListener,
    publisher: Arc<AttributePublisher>,
    local_retained: Arc<LocalRetainedStatsManager>,
    local_monitoring: Arc<LocalMonitoringManager>,
    global_retained: GlobalRetainedStatsManager,
    forwarding: ForwardingControlAdapter,
    removed_servers: Mutex<RemovedServers>,
    peers: Mutex<HashMap<ClusterHandle, PeerAttributeState>>,
    channels: Mutex<HashMap<ClusterHandle, ForwardingChannel>>,
}

impl ClusterControlPlane {
    pub fn new(
        config: ControlPlaneConfig,
        sink: Arc<dyn AttributeSink>,
        scheduler: Arc<dyn PublishScheduler>,
    ) -> ClusterResult<Self> {
        config.validate()?;
        let name = config.name.clone();
        debug!(
            "{}:{}:{} uid={} server_name={}",
            name, CONTROL_PLANE_TAG, CONTROL_PLANE_FN_NEW_TAG, config.server_uid, config.server_name
        );

        let publisher = Arc::new(AttributePublisher::new(&name, sink));
        let local_retained = Arc::new(LocalRetainedStatsManager::new(
            &name,
            scheduler.clone(),
            config.publish_retained_delay(),
        ));
        local_retained.set_sub_covering_filter_publisher(publisher.clone());
        let local_monitoring = Arc::new(LocalMonitoringManager::new(
            &name,
            scheduler,
            config.publish_monitoring_delay(),
        ));
        local_monitoring.set_sub_covering_filter_publisher(publisher.clone());

        Ok(Self {
            log_listener: config.log_listener(),
            global_retained: GlobalRetainedStatsManager::new(&name),
            forwarding: ForwardingControlAdapter::new(&name),
            removed_servers: Mutex::new(RemovedServers::new()),
            peers: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            name,
            config,
            publisher,
            local_retained,
            local_monitoring,
        })
    }

    /// Builds a control plane whose delayed publications run on `handle`.
    pub fn with_tokio(
        config: ControlPlaneConfig,
        sink: Arc<dyn AttributeSink>,
        handle: Handle,
    ) -> ClusterResult<Arc<Self>> {
        let scheduler = Arc::new(TokioPublishScheduler::new(&config.name, handle));
        let plane = Arc::new(Self::new(config, sink, scheduler.clone())?);
        scheduler.bind_retained(&plane.local_retained)?;
        scheduler.bind_monitoring(&plane.local_monitoring)?;
        Ok(plane)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    pub fn server_uid(&self) -> &str {
        &self.config.server_uid
    }

    pub fn log_listener(&self) -> &LogListener {
        &self.log_listener
    }

    pub fn publisher(&self) -> &Arc<AttributePublisher> {
        &self.publisher
    }

    pub fn local_retained(&self) -> &Arc<LocalRetainedStatsManager> {
        &self.local_retained
    }

    pub fn local_monitoring(&self) -> &Arc<LocalMonitoringManager> {
        &self.local_monitoring
    }

    pub fn global_retained(&self) -> &GlobalRetainedStatsManager {
        &self.global_retained
    }

    pub fn forwarding(&self) -> &ForwardingControlAdapter {
        &self.forwarding
    }

    /// Advertises the local server and opens the `started` gate of both
    /// local managers.
    pub fn start(&self, endpoint: Option<&ForwardingEndpoint>) -> ClusterResult<()> {
        let version = ATTR_VERSION as i16;
        self.publisher.publish_local_server_info(&LocalServerInfo {
            supported_version: version,
            used_version: version,
            server_name: self.config.server_name.clone(),
        })?;
        if let Some(endpoint) = endpoint {
            self.publisher.publish_forwarding_endpoint(endpoint)?;
        }
        self.local_retained.start()?;
        self.local_monitoring.start()?;
        info!(
            "{}:{}:{} started",
            self.name, CONTROL_PLANE_TAG, CONTROL_PLANE_FN_START_TAG
        );
        Ok(())
    }

    pub fn recovery_completed(&self) -> ClusterResult<()> {
        self.local_retained.recovery_completed()?;
        self.local_monitoring.recovery_completed()
    }

    pub fn close(&self) {
        self.forwarding.close();
        self.local_retained.close();
        self.local_monitoring.close();
        self.global_retained.close();
        self.peers.lock().clear();
        self.channels.lock().clear();
        info!(
            "{}:{}:{} closed",
            self.name, CONTROL_PLANE_TAG, CONTROL_PLANE_FN_CLOSE_TAG
        );
    }

    pub fn update_retained_stats(&self, uid: &str, data: Option<&[u8]>) -> ClusterResult<()> {
        self.local_retained.update_retained_stats(uid, data)
    }

    pub fn set_health_status(&self, health: HealthStatus) -> ClusterResult<()> {
        self.local_monitoring.set_health_status(health)
    }

    pub fn set_ha_status(&self, ha: HaStatus) -> ClusterResult<()> {
        self.local_monitoring.set_ha_status(ha)
    }

    pub fn publish_subscription_stats(&self, stats: &RemoteSubscriptionStats) -> ClusterResult<i64> {
        self.publisher.publish_subscription_stats(stats)
    }

    /// Records an administrative removal and republishes the list when the
    /// set changed. The local server cannot be removed this way.
    pub fn add_removed_server(&self, uid: &str, incarnation_number: i64) -> ClusterResult<bool> {
        if uid.is_empty() {
            return Err(ClusterError::NullArgument("uid"));
        }
        if uid == self.config.server_uid {
            return Err(ClusterError::Error(format!(
                "{}: cannot remove the local server {uid}",
                self.name
            )));
        }

        let mut removed = self.removed_servers.lock();
        let changed = removed.add(uid, incarnation_number);
        debug!(
            "{}:{}:{} uid={uid} inc={incarnation_number} changed={changed}",
            self.name, CONTROL_PLANE_TAG, CONTROL_PLANE_FN_REMOVED_TAG
        );
        if changed {
            self.publisher.publish_removed_servers(&removed)?;
        }
        Ok(changed)
    }

    pub fn removed_servers(&self) -> RemovedServers {
        self.removed_servers.lock().clone()
    }

    /// Applies every attribute kind a peer published.
    ///
    /// The peer's state is created on first contact. Servers the peer newly
    /// reports as removed are dropped from the view, from the global
    /// statistics cache and from the protocol layer. A removed-servers list
    /// naming the local server fails with
    /// [`ClusterError::LocalServerRemoved`] after the other kinds have been
    /// applied and a changed set has been republished.
    pub fn on_peer_attributes(
        &self,
        node: ClusterHandle,
        uid: &str,
        attrs: &AttributeMap,
    ) -> ClusterResult<PeerUpdate> {
        if uid.is_empty() {
            return Err(ClusterError::NullArgument("uid"));
        }

        let mut peers = self.peers.lock();
        let mut peer = match peers.remove(&node) {
            Some(peer) if peer.uid() == uid => peer,
            Some(stale) => {
                warn!(
                    "{}:{}:{} {node} was {}, now {uid}",
                    self.name,
                    CONTROL_PLANE_TAG,
                    CONTROL_PLANE_FN_PEER_TAG,
                    stale.uid()
                );
                PeerAttributeState::new(uid, node)
            }
            None => PeerAttributeState::new(uid, node),
        };

        let result = self.deliver_peer_attributes(&mut peer, &peers, attrs);
        peers.insert(node, peer);
        drop(peers);

        let update = result?;
        self.tear_down_removed_servers(&update.removed_servers.newly_removed)?;
        Ok(update)
    }

    fn deliver_peer_attributes(
        &self,
        peer: &mut PeerAttributeState,
        others: &HashMap<ClusterHandle, PeerAttributeState>,
        attrs: &AttributeMap,
    ) -> ClusterResult<PeerUpdate> {
        let mut update = PeerUpdate {
            retained_stats: peer.deliver_retained_changes(attrs, &self.global_retained)?,
            monitoring_status: peer.deliver_monitoring_changes(attrs)?,
            subscription_stats: peer.deliver_subscription_stats(attrs)?,
            ..Default::default()
        };

        let mut removed = self.removed_servers.lock();
        update.restored_not_in_view =
            peer.deliver_restored_not_in_view(attrs, &self.config.server_uid, |uid| {
                removed.contains(uid) || others.values().any(|other| other.uid() == uid)
            })?;

        let local_uid = self.config.server_uid.as_str();
        let before = removed.clone();
        let delta = match peer.deliver_removed_servers_changes(attrs, &mut removed, local_uid) {
            Ok(delta) => delta,
            Err(err) => {
                error!(
                    "{}:{}:{} {} {err}",
                    self.name,
                    CONTROL_PLANE_TAG,
                    CONTROL_PLANE_FN_PEER_TAG,
                    peer.handle()
                );
                if *removed != before {
                    self.publisher.publish_removed_servers(&removed)?;
                }
                return Err(err);
            }
        };
        if delta.changed {
            self.publisher.publish_removed_servers(&removed)?;
        }
        update.removed_servers = delta;
        Ok(update)
    }

    /// Drops every peer whose uid was newly removed, with its cached
    /// statistics and its forwarding channel.
    fn tear_down_removed_servers(&self, removed_uids: &[String]) -> ClusterResult<()> {
        if removed_uids.is_empty() {
            return Ok(());
        }
        let local_uid = self.config.server_uid.as_str();
        let is_torn_down = |uid: &str| uid != local_uid && removed_uids.iter().any(|r| r == uid);

        let mut nodes: HashMap<ClusterHandle, String> = HashMap::new();
        {
            let mut peers = self.peers.lock();
            peers.retain(|node, peer| {
                if is_torn_down(peer.uid()) {
                    nodes.insert(*node, peer.uid().to_string());
                    return false;
                }
                true
            });
        }
        for (node, channel) in self.channels.lock().iter() {
            if is_torn_down(&channel.server_uid) {
                nodes
                    .entry(*node)
                    .or_insert_with(|| channel.server_uid.clone());
            }
        }

        for (node, uid) in nodes {
            info!(
                "{}:{}:{} {node} uid={uid}",
                self.name, CONTROL_PLANE_TAG, CONTROL_PLANE_FN_TEAR_DOWN_TAG
            );
            self.global_retained.on_retained_stats_remove(node, &uid)?;
            self.remove_forwarding_channel(node)?;
        }
        Ok(())
    }

    /// Forgets a peer that left the view along with its retained statistics
    /// and its forwarding channel.
    pub fn on_peer_left(&self, node: ClusterHandle) -> ClusterResult<bool> {
        let peer = self.peers.lock().remove(&node);
        if let Some(peer) = &peer {
            self.global_retained.on_retained_stats_remove(node, peer.uid())?;
        }
        let had_channel = self.remove_forwarding_channel(node)?;
        Ok(peer.is_some() || had_channel)
    }

    /// Asks the protocol layer for a forwarding channel to `server` and keeps
    /// its handle until the peer leaves or is removed.
    pub fn add_forwarding_channel(
        &self,
        server: &RemoteServerInfo,
        node: ClusterHandle,
        engine_handle: EngineHandle,
    ) -> ClusterResult<Option<ProtocolHandle>> {
        let protocol_handle = self.forwarding.add(server, node, engine_handle)?;
        if let Some(protocol_handle) = protocol_handle {
            debug!(
                "{}:{}:{} {node} uid={} {protocol_handle:?}",
                self.name, CONTROL_PLANE_TAG, CONTROL_PLANE_FN_CHANNEL_TAG, server.server_uid
            );
            self.channels.lock().insert(
                node,
                ForwardingChannel {
                    protocol_handle,
                    engine_handle,
                    server_name: server.server_name.clone(),
                    server_uid: server.server_uid.clone(),
                },
            );
        }
        Ok(protocol_handle)
    }

    pub fn connect_forwarding_channel(
        &self,
        server: &RemoteServerInfo,
        node: ClusterHandle,
    ) -> ClusterResult<()> {
        let channel = self.channel(node)?;
        self.forwarding
            .connect(channel.protocol_handle, server, node, channel.engine_handle)
    }

    pub fn disconnect_forwarding_channel(&self, node: ClusterHandle) -> ClusterResult<()> {
        let channel = self.channel(node)?;
        self.forwarding.disconnect(
            channel.protocol_handle,
            &channel.server_name,
            &channel.server_uid,
            node,
            channel.engine_handle,
        )
    }

    pub fn forwarding_channel(&self, node: ClusterHandle) -> Option<ProtocolHandle> {
        self.channels
            .lock()
            .get(&node)
            .map(|channel| channel.protocol_handle)
    }

    fn channel(&self, node: ClusterHandle) -> ClusterResult<ForwardingChannel> {
        self.channels.lock().get(&node).cloned().ok_or_else(|| {
            ClusterError::Error(format!("{}: no forwarding channel for {node}", self.name))
        })
    }

    fn remove_forwarding_channel(&self, node: ClusterHandle) -> ClusterResult<bool> {
        let Some(channel) = self.channels.lock().remove(&node) else {
            return Ok(false);
        };
        debug!(
            "{}:{}:{} {node} uid={} removed",
            self.name, CONTROL_PLANE_TAG, CONTROL_PLANE_FN_CHANNEL_TAG, channel.server_uid
        );
        self.forwarding.remove(
            channel.protocol_handle,
            &channel.server_name,
            &channel.server_uid,
            node,
            channel.engine_handle,
        )?;
        Ok(true)
    }

    pub fn peer_status(&self, node: ClusterHandle) -> Option<(HealthStatus, HaStatus)> {
        self.peers
            .lock()
            .get(&node)
            .map(|peer| (peer.health_status(), peer.ha_status()))
    }

    pub fn peer_subscription_stats(&self, node: ClusterHandle) -> Option<RemoteSubscriptionStats> {
        self.peers
            .lock()
            .get(&node)
            .and_then(|peer| peer.subscription_stats().cloned())
    }

    pub fn is_forwarding_connected(&self, node: ClusterHandle) -> bool {
        self.peers
            .lock()
            .get(&node)
            .is_some_and(PeerAttributeState::is_forwarding_connected)
    }

    fn set_forwarding_connected(&self, node: ClusterHandle, connected: bool) -> ClusterResult<()> {
        let mut peers = self.peers.lock();
        let Some(peer) = peers.get_mut(&node) else {
            return Err(ClusterError::Error(format!(
                "{}: {node} is not in the view",
                self.name
            )));
        };
        debug!(
            "{}:{}:{} {node} uid={} connected={connected}",
            self.name,
            CONTROL_PLANE_TAG,
            CONTROL_PLANE_FN_VIEW_TAG,
            peer.uid()
        );
        peer.set_forwarding_connected(connected);
        Ok(())
    }
}

impl ViewKeeper for ClusterControlPlane {
    fn node_forwarding_connected(&self, node: ClusterHandle) -> ClusterResult<()> {
        self.set_forwarding_connected(node, true)
    }

    fn node_forwarding_disconnected(&self, node: ClusterHandle) -> ClusterResult<()> {
        self.set_forwarding_connected(node, false)
    }
}

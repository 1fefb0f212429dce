//! Applies attributes received from a peer to the local view.
//!
//! A peer publishes each payload kind under its own key with a sequence
//! number. A payload is applied only when its sequence number is newer than
//! the last one applied for that peer and kind, so redelivered or reordered
//! attribute maps are harmless.

use crate::error::{ClusterError, ClusterResult};
use crate::handles::ClusterHandle;
use crate::membership::remote_server_record::RemoteServerRecord;
use crate::membership::removed_servers::RemovedServers;
use crate::stats::global_retained::GlobalRetainedStatsManager;
use crate::stats::local_monitoring::{HaStatus, HealthStatus};
use crate::wire::attributes;
use crate::wire::buffer::WireReader;
use crate::wire::filter_tags;
use crate::wire::sub_covering_filter::RemoteSubscriptionStats;
use crate::wire::ATTR_VERSION;
use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, error};

const PEER_ATTRIBUTES_TAG: &str = "PeerAttributeState:";
const PEER_ATTRIBUTES_FN_RETAINED_TAG: &str = "deliver_retained_changes:";
const PEER_ATTRIBUTES_FN_MONITORING_TAG: &str = "deliver_monitoring_changes:";
const PEER_ATTRIBUTES_FN_REMOVED_TAG: &str = "deliver_removed_servers_changes:";
const PEER_ATTRIBUTES_FN_RESTORED_TAG: &str = "deliver_restored_not_in_view:";

/// Attributes a peer currently publishes, keyed by filter tag.
pub type AttributeMap = HashMap<String, Bytes>;

/// Outcome of folding a peer's removed-servers list into the local set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemovedServersDelta {
    pub changed: bool,
    pub newly_removed: Vec<String>,
}

/// What this node knows about one peer's published attributes.
#[derive(Clone, Debug)]
pub struct PeerAttributeState {
    uid: String,
    handle: ClusterHandle,
    sqn_retained_stats: i64,
    sqn_monitoring_status: i64,
    sqn_removed_servers: i64,
    sqn_restored_not_in_view: i64,
    sqn_subscription_stats: i64,
    health: HealthStatus,
    ha: HaStatus,
    subscription_stats: Option<RemoteSubscriptionStats>,
    forwarding_connected: bool,
}

fn newer(payload: Option<&Bytes>, last: i64) -> ClusterResult<Option<(i64, WireReader)>> {
    let Some(payload) = payload else {
        return Ok(None);
    };
    let (sqn, reader) = attributes::read_sqn(payload.clone())?;
    Ok((sqn > last).then_some((sqn, reader)))
}

impl PeerAttributeState {
    pub fn new(uid: &str, handle: ClusterHandle) -> Self {
        Self {
            uid: uid.to_string(),
            handle,
            sqn_retained_stats: 0,
            sqn_monitoring_status: 0,
            sqn_removed_servers: 0,
            sqn_restored_not_in_view: 0,
            sqn_subscription_stats: 0,
            health: HealthStatus::Unknown,
            ha: HaStatus::Unknown,
            subscription_stats: None,
            forwarding_connected: false,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn handle(&self) -> ClusterHandle {
        self.handle
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health
    }

    pub fn ha_status(&self) -> HaStatus {
        self.ha
    }

    pub fn subscription_stats(&self) -> Option<&RemoteSubscriptionStats> {
        self.subscription_stats.as_ref()
    }

    pub fn is_forwarding_connected(&self) -> bool {
        self.forwarding_connected
    }

    pub fn set_forwarding_connected(&mut self, connected: bool) {
        self.forwarding_connected = connected;
    }

    /// Installs a newer retained-stats payload into `global`. Returns whether
    /// one was applied.
    pub fn deliver_retained_changes(
        &mut self,
        attrs: &AttributeMap,
        global: &GlobalRetainedStatsManager,
    ) -> ClusterResult<bool> {
        let Some((sqn, mut reader)) =
            newer(attrs.get(filter_tags::RETAINED_STATS), self.sqn_retained_stats)?
        else {
            return Ok(false);
        };
        let stats = attributes::read_retained_stats(&mut reader)?;
        global.on_retained_stats_change(self.handle, &self.uid, stats)?;
        self.sqn_retained_stats = sqn;
        debug!(
            "{PEER_ATTRIBUTES_TAG}:{PEER_ATTRIBUTES_FN_RETAINED_TAG} uid={} sqn={sqn}",
            self.uid
        );
        Ok(true)
    }

    /// Applies a newer monitoring payload. A peer that stopped publishing the
    /// attribute is reset to `Unknown`.
    pub fn deliver_monitoring_changes(&mut self, attrs: &AttributeMap) -> ClusterResult<bool> {
        let Some(payload) = attrs.get(filter_tags::MONITORING_STATUS) else {
            debug!(
                "{PEER_ATTRIBUTES_TAG}:{PEER_ATTRIBUTES_FN_MONITORING_TAG} uid={} no attribute, resetting to Unknown",
                self.uid
            );
            self.health = HealthStatus::Unknown;
            self.ha = HaStatus::Unknown;
            return Ok(false);
        };
        let Some((sqn, mut reader)) = newer(Some(payload), self.sqn_monitoring_status)? else {
            return Ok(false);
        };
        let (health, ha) = attributes::read_monitoring_status(&mut reader)?;
        self.sqn_monitoring_status = sqn;
        self.health = health;
        self.ha = ha;
        debug!(
            "{PEER_ATTRIBUTES_TAG}:{PEER_ATTRIBUTES_FN_MONITORING_TAG} uid={} sqn={sqn} health={health:?} ha={ha:?}",
            self.uid
        );
        Ok(true)
    }

    /// Folds a newer removed-servers list into `removed`.
    ///
    /// Fails with [`ClusterError::LocalServerRemoved`] when the list newly
    /// names `local_uid`; the merge itself has been applied by then.
    pub fn deliver_removed_servers_changes(
        &mut self,
        attrs: &AttributeMap,
        removed: &mut RemovedServers,
        local_uid: &str,
    ) -> ClusterResult<RemovedServersDelta> {
        let Some((sqn, mut reader)) =
            newer(attrs.get(filter_tags::REMOVED_SERVERS_LIST), self.sqn_removed_servers)?
        else {
            return Ok(RemovedServersDelta::default());
        };
        let mut newly_removed = Vec::new();
        let changed = removed.read_merge(ATTR_VERSION, &mut reader, &mut newly_removed)?;
        self.sqn_removed_servers = sqn;
        debug!(
            "{PEER_ATTRIBUTES_TAG}:{PEER_ATTRIBUTES_FN_REMOVED_TAG} from={} sqn={sqn} changed={changed} new={newly_removed:?}",
            self.uid
        );

        if newly_removed.iter().any(|uid| uid == local_uid) {
            error!(
                "{PEER_ATTRIBUTES_TAG}:{PEER_ATTRIBUTES_FN_REMOVED_TAG} local server {local_uid} is on the removed servers list published by {}",
                self.uid
            );
            return Err(ClusterError::LocalServerRemoved(local_uid.to_string()));
        }
        Ok(RemovedServersDelta {
            changed,
            newly_removed,
        })
    }

    pub fn deliver_subscription_stats(&mut self, attrs: &AttributeMap) -> ClusterResult<bool> {
        let Some((sqn, mut reader)) =
            newer(attrs.get(filter_tags::WCSUB_STATS), self.sqn_subscription_stats)?
        else {
            return Ok(false);
        };
        self.subscription_stats = Some(attributes::read_subscription_stats(&mut reader)?);
        self.sqn_subscription_stats = sqn;
        Ok(true)
    }

    /// Returns the servers a peer restored from its store that are neither
    /// the local server nor already known according to `is_known`.
    pub fn deliver_restored_not_in_view(
        &mut self,
        attrs: &AttributeMap,
        local_uid: &str,
        is_known: impl Fn(&str) -> bool,
    ) -> ClusterResult<Vec<RemoteServerRecord>> {
        let Some((sqn, mut reader)) = newer(
            attrs.get(filter_tags::RESTORED_NOT_IN_VIEW),
            self.sqn_restored_not_in_view,
        )?
        else {
            return Ok(Vec::new());
        };
        let records = attributes::read_restored_not_in_view(&mut reader)?;
        self.sqn_restored_not_in_view = sqn;
        let total = records.len();
        let fresh: Vec<_> = records
            .into_iter()
            .filter(|record| record.server_uid() != local_uid && !is_known(record.server_uid()))
            .collect();
        debug!(
            "{PEER_ATTRIBUTES_TAG}:{PEER_ATTRIBUTES_FN_RESTORED_TAG} from={} sqn={sqn} records={total} new={}",
            self.uid,
            fresh.len()
        );
        Ok(fresh)
    }
}

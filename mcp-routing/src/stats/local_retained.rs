//! This node's retained-message statistics, one opaque blob per server UID.

use crate::error::{ClusterError, ClusterResult};
use crate::stats::publish_gates::PublishGates;
use crate::stats::publisher::{PublishScheduler, SubCoveringFilterPublisher};
use crate::stats::RetainedStatsMap;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

const LOCAL_RETAINED_STATS_TAG: &str = "LocalRetainedStatsManager:";
const LOCAL_RETAINED_STATS_FN_UPDATE_TAG: &str = "update_retained_stats:";
const LOCAL_RETAINED_STATS_FN_PUBLISH_TAG: &str = "publish_retained_stats:";
const LOCAL_RETAINED_STATS_FN_CLOSE_TAG: &str = "close:";

struct RetainedState {
    stats: RetainedStatsMap,
    gates: PublishGates,
    publisher: Option<Arc<dyn SubCoveringFilterPublisher>>,
}

pub struct LocalRetainedStatsManager {
    name: String,
    publish_delay: Duration,
    scheduler: Arc<dyn PublishScheduler>,
    state: Mutex<RetainedState>,
}

impl LocalRetainedStatsManager {
    pub fn new(name: &str, scheduler: Arc<dyn PublishScheduler>, publish_delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            publish_delay,
            scheduler,
            state: Mutex::new(RetainedState {
                stats: RetainedStatsMap::new(),
                gates: PublishGates::default(),
                publisher: None,
            }),
        }
    }

    pub fn set_sub_covering_filter_publisher(&self, publisher: Arc<dyn SubCoveringFilterPublisher>) {
        self.state.lock().publisher = Some(publisher);
    }

    pub fn start(&self) -> ClusterResult<()> {
        let schedule = self.state.lock().gates.start();
        self.schedule_if(schedule)
    }

    pub fn recovery_completed(&self) -> ClusterResult<()> {
        let schedule = self.state.lock().gates.recovery_completed();
        self.schedule_if(schedule)
    }

    /// Drops every stored blob and stops future scheduling. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        let dropped = state.stats.len();
        state.stats.clear();
        if state.gates.close() {
            info!(
                "{}:{}:{} closed, dropped {dropped} entries",
                self.name, LOCAL_RETAINED_STATS_TAG, LOCAL_RETAINED_STATS_FN_CLOSE_TAG
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().gates.is_closed()
    }

    /// Installs a copy of `data` for `uid`, or deletes the entry when `data`
    /// is `None`.
    ///
    /// Deleting an absent entry succeeds. A publish is scheduled only when
    /// the stored content actually changed and every gate is open.
    pub fn update_retained_stats(&self, uid: &str, data: Option<&[u8]>) -> ClusterResult<()> {
        if uid.is_empty() {
            return Err(ClusterError::NullArgument("uid"));
        }

        let schedule = {
            let mut state = self.state.lock();
            let changed = match data {
                None => state.stats.remove(uid).is_some(),
                Some(data) => {
                    if state.stats.get(uid).is_some_and(|current| current[..] == *data) {
                        false
                    } else {
                        state
                            .stats
                            .insert(uid.to_string(), Bytes::copy_from_slice(data));
                        true
                    }
                }
            };
            trace!(
                "{}:{}:{} uid={uid} len={:?} changed={changed}",
                self.name,
                LOCAL_RETAINED_STATS_TAG,
                LOCAL_RETAINED_STATS_FN_UPDATE_TAG,
                data.map(<[u8]>::len)
            );
            changed && state.gates.on_change()
        };
        self.schedule_if(schedule)
    }

    pub fn retained_stats(&self, uid: &str) -> Option<Bytes> {
        self.state.lock().stats.get(uid).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().stats.is_empty()
    }

    /// Hands the whole map to the publisher and returns its sequence number.
    pub fn publish_retained_stats(&self) -> ClusterResult<i64> {
        let state = self.state.lock();
        let Some(publisher) = state.publisher.as_ref() else {
            return Err(ClusterError::NullPointer("publisher"));
        };
        let sqn = publisher.publish_retained_stats(&state.stats)?;
        debug!(
            "{}:{}:{} entries={} sqn={sqn}",
            self.name,
            LOCAL_RETAINED_STATS_TAG,
            LOCAL_RETAINED_STATS_FN_PUBLISH_TAG,
            state.stats.len()
        );
        Ok(sqn)
    }

    fn schedule_if(&self, schedule: bool) -> ClusterResult<()> {
        if schedule {
            self.scheduler
                .schedule_publish_retained_task(self.publish_delay)?;
        }
        Ok(())
    }
}

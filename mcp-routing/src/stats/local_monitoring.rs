//! This node's health and HA status, published to peers on change.

use crate::error::{ClusterError, ClusterResult};
use crate::stats::publish_gates::PublishGates;
use crate::stats::publisher::{PublishScheduler, SubCoveringFilterPublisher};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const LOCAL_MONITORING_TAG: &str = "LocalMonitoringManager:";
const LOCAL_MONITORING_FN_SET_TAG: &str = "set_status:";
const LOCAL_MONITORING_FN_PUBLISH_TAG: &str = "publish_monitoring_status:";
const LOCAL_MONITORING_FN_CLOSE_TAG: &str = "close:";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HealthStatus {
    #[default]
    Unknown = 0,
    Green = 1,
    Yellow = 2,
    Red = 3,
}

impl HealthStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Green),
            2 => Some(Self::Yellow),
            3 => Some(Self::Red),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HaStatus {
    #[default]
    Unknown = 0,
    Disabled = 1,
    PrimarySingle = 2,
    PrimaryPair = 3,
    Standby = 4,
    Error = 9,
}

impl HaStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Disabled),
            2 => Some(Self::PrimarySingle),
            3 => Some(Self::PrimaryPair),
            4 => Some(Self::Standby),
            9 => Some(Self::Error),
            _ => None,
        }
    }
}

struct MonitoringState {
    health: HealthStatus,
    ha: HaStatus,
    gates: PublishGates,
    publisher: Option<Arc<dyn SubCoveringFilterPublisher>>,
}

/// Owns the local `(health, HA)` pair.
///
/// A change is published through the scheduler only once the manager is
/// started and recovered and until it is closed. A change made earlier is
/// published when the last gate opens.
pub struct LocalMonitoringManager {
    name: String,
    publish_delay: Duration,
    scheduler: Arc<dyn PublishScheduler>,
    state: Mutex<MonitoringState>,
}

impl LocalMonitoringManager {
    pub fn new(name: &str, scheduler: Arc<dyn PublishScheduler>, publish_delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            publish_delay,
            scheduler,
            state: Mutex::new(MonitoringState {
                health: HealthStatus::Unknown,
                ha: HaStatus::Unknown,
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

    pub fn close(&self) {
        if self.state.lock().gates.close() {
            info!(
                "{}:{}:{} closed",
                self.name, LOCAL_MONITORING_TAG, LOCAL_MONITORING_FN_CLOSE_TAG
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().gates.is_closed()
    }

    pub fn set_health_status(&self, health: HealthStatus) -> ClusterResult<()> {
        let schedule = {
            let mut state = self.state.lock();
            if state.health == health {
                return Ok(());
            }
            debug!(
                "{}:{}:{} health {:?} -> {:?}",
                self.name, LOCAL_MONITORING_TAG, LOCAL_MONITORING_FN_SET_TAG, state.health, health
            );
            state.health = health;
            state.gates.on_change()
        };
        self.schedule_if(schedule)
    }

    pub fn set_ha_status(&self, ha: HaStatus) -> ClusterResult<()> {
        let schedule = {
            let mut state = self.state.lock();
            if state.ha == ha {
                return Ok(());
            }
            debug!(
                "{}:{}:{} ha {:?} -> {:?}",
                self.name, LOCAL_MONITORING_TAG, LOCAL_MONITORING_FN_SET_TAG, state.ha, ha
            );
            state.ha = ha;
            state.gates.on_change()
        };
        self.schedule_if(schedule)
    }

    pub fn health_status(&self) -> HealthStatus {
        self.state.lock().health
    }

    pub fn ha_status(&self) -> HaStatus {
        self.state.lock().ha
    }

    /// Hands the current pair to the publisher and returns its sequence number.
    pub fn publish_monitoring_status(&self) -> ClusterResult<i64> {
        let state = self.state.lock();
        let Some(publisher) = state.publisher.as_ref() else {
            return Err(ClusterError::NullPointer("publisher"));
        };
        let sqn = publisher.publish_monitoring_status(state.health, state.ha)?;
        debug!(
            "{}:{}:{} health={:?} ha={:?} sqn={sqn}",
            self.name, LOCAL_MONITORING_TAG, LOCAL_MONITORING_FN_PUBLISH_TAG, state.health, state.ha
        );
        Ok(sqn)
    }

    fn schedule_if(&self, schedule: bool) -> ClusterResult<()> {
        if schedule {
            self.scheduler
                .schedule_publish_monitoring_task(self.publish_delay)?;
        }
        Ok(())
    }
}

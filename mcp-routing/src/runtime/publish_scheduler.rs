//! Delayed publication of local statistics on a tokio runtime.

use crate::error::{ClusterError, ClusterResult};
use crate::stats::local_monitoring::LocalMonitoringManager;
use crate::stats::local_retained::LocalRetainedStatsManager;
use crate::stats::publisher::PublishScheduler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

const PUBLISH_SCHEDULER_TAG: &str = "TokioPublishScheduler:";
const PUBLISH_SCHEDULER_FN_RETAINED_TAG: &str = "publish_retained_task:";
const PUBLISH_SCHEDULER_FN_MONITORING_TAG: &str = "publish_monitoring_task:";

/// Runs each publish request as a task that sleeps the requested delay and
/// then calls back into the bound manager.
///
/// Managers are held through `Weak` references; a task whose manager is
/// gone or closed does nothing. While a task is pending for a manager,
/// further requests for it are folded into that task.
pub struct TokioPublishScheduler {
    name: String,
    handle: Handle,
    retained: OnceLock<Weak<LocalRetainedStatsManager>>,
    monitoring: OnceLock<Weak<LocalMonitoringManager>>,
    retained_pending: Arc<AtomicBool>,
    monitoring_pending: Arc<AtomicBool>,
}

impl TokioPublishScheduler {
    pub fn new(name: &str, handle: Handle) -> Self {
        Self {
            name: name.to_string(),
            handle,
            retained: OnceLock::new(),
            monitoring: OnceLock::new(),
            retained_pending: Arc::new(AtomicBool::new(false)),
            monitoring_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn bind_retained(&self, manager: &Arc<LocalRetainedStatsManager>) -> ClusterResult<()> {
        self.retained
            .set(Arc::downgrade(manager))
            .map_err(|_| ClusterError::Error("retained stats manager already bound".to_string()))
    }

    pub fn bind_monitoring(&self, manager: &Arc<LocalMonitoringManager>) -> ClusterResult<()> {
        self.monitoring
            .set(Arc::downgrade(manager))
            .map_err(|_| ClusterError::Error("monitoring manager already bound".to_string()))
    }
}

impl PublishScheduler for TokioPublishScheduler {
    fn schedule_publish_retained_task(&self, delay: Duration) -> ClusterResult<()> {
        let manager = self
            .retained
            .get()
            .cloned()
            .ok_or(ClusterError::NullPointer("retained_stats_manager"))?;
        if self.retained_pending.swap(true, Ordering::AcqRel) {
            trace!(
                "{}:{}:{} already pending",
                self.name,
                PUBLISH_SCHEDULER_TAG,
                PUBLISH_SCHEDULER_FN_RETAINED_TAG
            );
            return Ok(());
        }

        let pending = self.retained_pending.clone();
        let name = self.name.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::Release);
            let Some(manager) = manager.upgrade() else {
                debug!("{name}:{PUBLISH_SCHEDULER_TAG}:{PUBLISH_SCHEDULER_FN_RETAINED_TAG} manager dropped");
                return;
            };
            if manager.is_closed() {
                return;
            }
            if let Err(error) = manager.publish_retained_stats() {
                warn!("{name}:{PUBLISH_SCHEDULER_TAG}:{PUBLISH_SCHEDULER_FN_RETAINED_TAG} publish failed: {error}");
            }
        });
        Ok(())
    }

    fn schedule_publish_monitoring_task(&self, delay: Duration) -> ClusterResult<()> {
        let manager = self
            .monitoring
            .get()
            .cloned()
            .ok_or(ClusterError::NullPointer("monitoring_manager"))?;
        if self.monitoring_pending.swap(true, Ordering::AcqRel) {
            trace!(
                "{}:{}:{} already pending",
                self.name,
                PUBLISH_SCHEDULER_TAG,
                PUBLISH_SCHEDULER_FN_MONITORING_TAG
            );
            return Ok(());
        }

        let pending = self.monitoring_pending.clone();
        let name = self.name.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::Release);
            let Some(manager) = manager.upgrade() else {
                debug!("{name}:{PUBLISH_SCHEDULER_TAG}:{PUBLISH_SCHEDULER_FN_MONITORING_TAG} manager dropped");
                return;
            };
            if manager.is_closed() {
                return;
            }
            if let Err(error) = manager.publish_monitoring_status() {
                warn!("{name}:{PUBLISH_SCHEDULER_TAG}:{PUBLISH_SCHEDULER_FN_MONITORING_TAG} publish failed: {error}");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::TokioPublishScheduler;
    use crate::error::{ClusterError, ClusterResult};
    use crate::stats::local_monitoring::{HaStatus, HealthStatus, LocalMonitoringManager};
    use crate::stats::local_retained::LocalRetainedStatsManager;
    use crate::stats::publisher::{PublishScheduler, SubCoveringFilterPublisher};
    use crate::stats::RetainedStatsMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::runtime::Handle;

    #[derive(Default)]
    struct RecordingPublisher {
        retained: Mutex<Vec<usize>>,
        monitoring: Mutex<Vec<(HealthStatus, HaStatus)>>,
    }

    impl SubCoveringFilterPublisher for RecordingPublisher {
        fn publish_retained_stats(&self, stats: &RetainedStatsMap) -> ClusterResult<i64> {
            let mut retained = self.retained.lock().expect("lock retained");
            retained.push(stats.len());
            Ok(retained.len() as i64)
        }

        fn publish_monitoring_status(
            &self,
            health: HealthStatus,
            ha: HaStatus,
        ) -> ClusterResult<i64> {
            let mut monitoring = self.monitoring.lock().expect("lock monitoring");
            monitoring.push((health, ha));
            Ok(monitoring.len() as i64)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn requests_while_pending_coalesce_into_one_publish() {
        let scheduler = Arc::new(TokioPublishScheduler::new("test", Handle::current()));
        let manager = Arc::new(LocalRetainedStatsManager::new(
            "test",
            scheduler.clone(),
            Duration::from_millis(100),
        ));
        let publisher = Arc::new(RecordingPublisher::default());
        manager.set_sub_covering_filter_publisher(publisher.clone());
        scheduler.bind_retained(&manager).expect("bind");
        manager.start().expect("start");
        manager.recovery_completed().expect("recovered");

        manager.update_retained_stats("a", Some(&b"1"[..])).expect("a");
        manager.update_retained_stats("b", Some(&b"2"[..])).expect("b");
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(*publisher.retained.lock().expect("lock"), vec![2]);

        manager.update_retained_stats("a", None).expect("delete");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*publisher.retained.lock().expect("lock"), vec![2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn task_firing_after_close_skips_publication() {
        let scheduler = Arc::new(TokioPublishScheduler::new("test", Handle::current()));
        let manager = Arc::new(LocalMonitoringManager::new(
            "test",
            scheduler.clone(),
            Duration::from_millis(50),
        ));
        let publisher = Arc::new(RecordingPublisher::default());
        manager.set_sub_covering_filter_publisher(publisher.clone());
        scheduler.bind_monitoring(&manager).expect("bind");
        manager.start().expect("start");
        manager.recovery_completed().expect("recovered");

        manager
            .set_health_status(HealthStatus::Green)
            .expect("set health");
        manager.close();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(publisher.monitoring.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn unbound_manager_is_a_null_pointer() {
        let scheduler = TokioPublishScheduler::new("test", Handle::current());

        assert_eq!(
            scheduler.schedule_publish_retained_task(Duration::ZERO),
            Err(ClusterError::NullPointer("retained_stats_manager"))
        );
        assert_eq!(
            scheduler.schedule_publish_monitoring_task(Duration::ZERO),
            Err(ClusterError::NullPointer("monitoring_manager"))
        );
    }

    #[tokio::test]
    async fn binding_twice_is_rejected() {
        let scheduler = Arc::new(TokioPublishScheduler::new("test", Handle::current()));
        let manager = Arc::new(LocalMonitoringManager::new(
            "test",
            scheduler.clone(),
            Duration::ZERO,
        ));

        scheduler.bind_monitoring(&manager).expect("bind");
        assert!(scheduler.bind_monitoring(&manager).is_err());
    }
}

//! Runtime helper delivering view notifications on a dedicated thread.

use crate::error::{ClusterError, ClusterResult};
use crate::membership::view_notify_event::ViewNotifyEvent;
use std::thread::{self, JoinHandle};
use tokio::runtime::Builder;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

const VIEW_DISPATCH_TAG: &str = "ViewNotifyDispatcher:";
const VIEW_DISPATCH_FN_LOOP_TAG: &str = "view_notify_loop:";

/// Queue in front of the delivery thread. Events are delivered one at a time
/// in submission order.
pub struct ViewNotifyDispatcher {
    name: String,
    sender: Option<UnboundedSender<ViewNotifyEvent>>,
    worker: Option<JoinHandle<usize>>,
}

impl ViewNotifyDispatcher {
    pub fn dispatch(&self, event: ViewNotifyEvent) -> ClusterResult<()> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(ClusterError::Closed);
        };
        sender.send(event).map_err(|_| ClusterError::Closed)
    }

    /// Stops accepting events, waits for the queued ones to be delivered and
    /// returns how many events the thread delivered successfully.
    pub fn shutdown(mut self) -> ClusterResult<usize> {
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return Ok(0);
        };
        let delivered = worker.join().map_err(|_| {
            ClusterError::Error(format!("{}: view notify thread panicked", self.name))
        })?;
        info!(
            "{}:{} shut down after {delivered} deliveries",
            self.name, VIEW_DISPATCH_TAG
        );
        Ok(delivered)
    }
}

impl Drop for ViewNotifyDispatcher {
    fn drop(&mut self) {
        // The thread exits once the queue drains.
        self.sender.take();
    }
}

async fn view_notify_loop(name: String, mut receiver: UnboundedReceiver<ViewNotifyEvent>) -> usize {
    let mut delivered = 0;
    while let Some(event) = receiver.recv().await {
        let description = event.to_string();
        match event.deliver() {
            Ok(()) => {
                delivered += 1;
                debug!("{name}:{VIEW_DISPATCH_TAG}:{VIEW_DISPATCH_FN_LOOP_TAG} delivered {description}");
            }
            Err(error) => {
                warn!("{name}:{VIEW_DISPATCH_TAG}:{VIEW_DISPATCH_FN_LOOP_TAG} {description} failed: {error}");
            }
        }
    }
    delivered
}

pub fn spawn_view_notify_loop(name: &str) -> ClusterResult<ViewNotifyDispatcher> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| ClusterError::Error(format!("Failed to create Tokio runtime: {error}")))?;
    let (sender, receiver) = mpsc::unbounded_channel();

    let thread_name = name.to_string();
    let worker = thread::Builder::new()
        .name(format!("{name}-view-notify"))
        .spawn(move || runtime.block_on(view_notify_loop(thread_name, receiver)))
        .map_err(|error| ClusterError::Error(format!("Failed to spawn view notify thread: {error}")))?;

    Ok(ViewNotifyDispatcher {
        name: name.to_string(),
        sender: Some(sender),
        worker: Some(worker),
    })
}

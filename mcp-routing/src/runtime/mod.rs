//! Runtime integration layer.
//!
//! Keeps timers, threads and queues out of the managers: the scheduler
//! collaborator is backed by a tokio runtime handle, and view notifications
//! are delivered on a dedicated thread.

pub mod publish_scheduler;
pub mod view_dispatch;

pub use publish_scheduler::TokioPublishScheduler;
pub use view_dispatch::{spawn_view_notify_loop, ViewNotifyDispatcher};

//! Membership-view transitions delivered to the view keeper.

use crate::error::{ClusterError, ClusterResult};
use crate::handles::ClusterHandle;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Weak};
use tracing::debug;

const VIEW_NOTIFY_EVENT_TAG: &str = "ViewNotifyEvent:";
const VIEW_NOTIFY_EVENT_FN_DELIVER_TAG: &str = "deliver:";

/// Receiver of forwarding-channel transitions.
pub trait ViewKeeper: Send + Sync {
    fn node_forwarding_connected(&self, node: ClusterHandle) -> ClusterResult<()>;

    fn node_forwarding_disconnected(&self, node: ClusterHandle) -> ClusterResult<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewNotifyEventType {
    #[default]
    None,
    IncomingProtocolRsConnected,
    IncomingProtocolRsDisconnected,
}

/// One view transition.
///
/// The event holds a non-owning reference to its keeper and is consumed by
/// [`ViewNotifyEvent::deliver`], so it can be delivered at most once.
#[derive(Default)]
pub struct ViewNotifyEvent {
    event_type: ViewNotifyEventType,
    node: Option<ClusterHandle>,
    view_keeper: Option<Weak<dyn ViewKeeper>>,
}

impl ViewNotifyEvent {
    pub fn new(
        event_type: ViewNotifyEventType,
        node: ClusterHandle,
        view_keeper: &Arc<dyn ViewKeeper>,
    ) -> Self {
        Self {
            event_type,
            node: Some(node),
            view_keeper: Some(Arc::downgrade(view_keeper)),
        }
    }

    pub fn incoming_protocol_rs_connected(
        node: ClusterHandle,
        view_keeper: &Arc<dyn ViewKeeper>,
    ) -> Self {
        Self::new(
            ViewNotifyEventType::IncomingProtocolRsConnected,
            node,
            view_keeper,
        )
    }

    pub fn incoming_protocol_rs_disconnected(
        node: ClusterHandle,
        view_keeper: &Arc<dyn ViewKeeper>,
    ) -> Self {
        Self::new(
            ViewNotifyEventType::IncomingProtocolRsDisconnected,
            node,
            view_keeper,
        )
    }

    pub fn event_type(&self) -> ViewNotifyEventType {
        self.event_type
    }

    pub fn node(&self) -> Option<ClusterHandle> {
        self.node
    }

    /// Dispatches the event and returns the keeper's result.
    ///
    /// Fails with [`ClusterError::NullPointer`] when the keeper is gone and
    /// [`ClusterError::Error`] for an event of type `None`.
    pub fn deliver(self) -> ClusterResult<()> {
        let Some(view_keeper) = self.view_keeper.as_ref().and_then(Weak::upgrade) else {
            return Err(ClusterError::NullPointer("view_keeper"));
        };
        let Some(node) = self.node else {
            return Err(ClusterError::Error(format!("{self}: no node handle")));
        };

        debug!("{VIEW_NOTIFY_EVENT_TAG}:{VIEW_NOTIFY_EVENT_FN_DELIVER_TAG} {self}");
        match self.event_type {
            ViewNotifyEventType::IncomingProtocolRsConnected => {
                view_keeper.node_forwarding_connected(node)
            }
            ViewNotifyEventType::IncomingProtocolRsDisconnected => {
                view_keeper.node_forwarding_disconnected(node)
            }
            ViewNotifyEventType::None => Err(ClusterError::Error(format!(
                "{self}: unexpected event type"
            ))),
        }
    }
}

impl Display for ViewNotifyEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.node {
            Some(node) => write!(f, "ViewNotifyEvent({:?}, {node})", self.event_type),
            None => write!(f, "ViewNotifyEvent({:?})", self.event_type),
        }
    }
}

impl std::fmt::Debug for ViewNotifyEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewNotifyEvent")
            .field("event_type", &self.event_type)
            .field("node", &self.node)
            .field("has_view_keeper", &self.view_keeper.is_some())
            .finish()
    }
}

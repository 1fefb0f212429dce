//! Cluster membership bookkeeping.
//!
//! - `remote_server_record`: a peer's `(uid, name, incarnation)` identity.
//! - `removed_servers`: the gossiped set of servers administratively removed
//!   from the cluster.
//! - `view_notify_event`: one-shot notifications of forwarding connectivity
//!   changes, delivered to a [`ViewKeeper`].
//! - `peer_attributes`: applies the attributes a peer publishes to the
//!   local view.

pub mod peer_attributes;
pub mod remote_server_record;
pub mod removed_servers;
pub mod view_notify_event;

pub use peer_attributes::{AttributeMap, PeerAttributeState, RemovedServersDelta};
pub use remote_server_record::RemoteServerRecord;
pub use removed_servers::RemovedServers;
pub use view_notify_event::{ViewKeeper, ViewNotifyEvent, ViewNotifyEventType};

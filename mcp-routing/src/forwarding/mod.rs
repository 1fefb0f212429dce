//! Remote-server forwarding control.
//!
//! The control plane tells the protocol layer when a forwarding channel to a
//! peer must be created, connected, disconnected or removed, and when the
//! local server leaves the cluster.

pub mod forwarding_control;

pub use forwarding_control::{
    ForwardingControlAdapter, ProtocolRemoteServerCallback, ProtocolRsEvent, ProtocolRsEventType,
    RemoteServerInfo,
};

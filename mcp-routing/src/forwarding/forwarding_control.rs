//! Forwards remote-server lifecycle events to the protocol layer.

use crate::error::{ClusterError, ClusterResult};
use crate::handles::{ClusterHandle, EngineHandle, ProtocolHandle};
use parking_lot::ReentrantMutex;
use std::cell::{Cell, RefCell};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{debug, info};

const FORWARDING_CONTROL_TAG: &str = "ForwardingControlAdapter:";
const FORWARDING_CONTROL_FN_FORWARD_TAG: &str = "forward:";
const FORWARDING_CONTROL_FN_CLOSE_TAG: &str = "close:";

/// Kind of lifecycle event, with the values the protocol layer expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ProtocolRsEventType {
    Create = 1,
    Connect = 2,
    Disconnect = 3,
    Remove = 4,
    Term = 99,
}

impl Display for ProtocolRsEventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Create => "CREATE",
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::Remove => "REMOVE",
            Self::Term => "TERM",
        };
        f.write_str(name)
    }
}

/// Where and how to reach a remote server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteServerInfo {
    pub server_name: String,
    pub server_uid: String,
    pub address: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Everything handed to the protocol callback for one event.
///
/// Fields not meaningful for an event kind are `None` or empty: `Create`
/// carries no protocol handle, `Term` carries no server at all.
#[derive(Clone, Copy, Debug)]
pub struct ProtocolRsEvent<'a> {
    pub event_type: ProtocolRsEventType,
    pub protocol_handle: Option<ProtocolHandle>,
    pub server_name: &'a str,
    pub server_uid: &'a str,
    pub address: Option<&'a str>,
    pub port: u16,
    pub use_tls: bool,
    pub cluster_handle: Option<ClusterHandle>,
    pub engine_handle: Option<EngineHandle>,
}

impl<'a> ProtocolRsEvent<'a> {
    fn new(event_type: ProtocolRsEventType) -> Self {
        Self {
            event_type,
            protocol_handle: None,
            server_name: "",
            server_uid: "",
            address: None,
            port: 0,
            use_tls: false,
            cluster_handle: None,
            engine_handle: None,
        }
    }

    fn with_server(mut self, server: &'a RemoteServerInfo) -> Self {
        self.server_name = &server.server_name;
        self.server_uid = &server.server_uid;
        self.address = Some(server.address.as_str());
        self.port = server.port;
        self.use_tls = server.use_tls;
        self
    }
}

/// The protocol layer's handler for remote-server lifecycle events.
///
/// On `Create` the protocol returns the handle it assigned to the new
/// server; other events return `None`.
pub trait ProtocolRemoteServerCallback: Send + Sync {
    fn on_remote_server_event(
        &self,
        event: &ProtocolRsEvent<'_>,
    ) -> ClusterResult<Option<ProtocolHandle>>;
}

#[derive(Default)]
struct AdapterState {
    closed: Cell<bool>,
    callback: RefCell<Option<Arc<dyn ProtocolRemoteServerCallback>>>,
}

/// Bridges the control plane to the single registered protocol callback.
///
/// Every operation runs under a re-entrant lock, and the callback is invoked
/// with the lock held, so a callback may call back into the adapter on the
/// same thread. Once closed, every operation succeeds without forwarding.
pub struct ForwardingControlAdapter {
    name: String,
    state: ReentrantMutex<AdapterState>,
}

impl ForwardingControlAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ReentrantMutex::new(AdapterState::default()),
        }
    }

    pub fn register_protocol_callback(&self, callback: Arc<dyn ProtocolRemoteServerCallback>) {
        let state = self.state.lock();
        *state.callback.borrow_mut() = Some(callback);
    }

    /// Latches the adapter closed. Irreversible.
    pub fn close(&self) {
        let state = self.state.lock();
        if !state.closed.replace(true) {
            info!(
                "{}:{}:{} closed",
                self.name, FORWARDING_CONTROL_TAG, FORWARDING_CONTROL_FN_CLOSE_TAG
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.get()
    }

    /// Announces a newly discovered server. Returns the protocol's handle for
    /// it, or `None` when the adapter is closed.
    pub fn add(
        &self,
        server: &RemoteServerInfo,
        cluster_handle: ClusterHandle,
        engine_handle: EngineHandle,
    ) -> ClusterResult<Option<ProtocolHandle>> {
        let mut event = ProtocolRsEvent::new(ProtocolRsEventType::Create).with_server(server);
        event.cluster_handle = Some(cluster_handle);
        event.engine_handle = Some(engine_handle);
        self.forward(&event)
    }

    pub fn connect(
        &self,
        protocol_handle: ProtocolHandle,
        server: &RemoteServerInfo,
        cluster_handle: ClusterHandle,
        engine_handle: EngineHandle,
    ) -> ClusterResult<()> {
        let mut event = ProtocolRsEvent::new(ProtocolRsEventType::Connect).with_server(server);
        event.protocol_handle = Some(protocol_handle);
        event.cluster_handle = Some(cluster_handle);
        event.engine_handle = Some(engine_handle);
        self.forward(&event).map(|_| ())
    }

    pub fn disconnect(
        &self,
        protocol_handle: ProtocolHandle,
        server_name: &str,
        server_uid: &str,
        cluster_handle: ClusterHandle,
        engine_handle: EngineHandle,
    ) -> ClusterResult<()> {
        self.forward_for_server(
            ProtocolRsEventType::Disconnect,
            protocol_handle,
            server_name,
            server_uid,
            cluster_handle,
            engine_handle,
        )
    }

    pub fn remove(
        &self,
        protocol_handle: ProtocolHandle,
        server_name: &str,
        server_uid: &str,
        cluster_handle: ClusterHandle,
        engine_handle: EngineHandle,
    ) -> ClusterResult<()> {
        self.forward_for_server(
            ProtocolRsEventType::Remove,
            protocol_handle,
            server_name,
            server_uid,
            cluster_handle,
            engine_handle,
        )
    }

    /// Tells the protocol the local server left the cluster.
    pub fn term(&self) -> ClusterResult<()> {
        self.forward(&ProtocolRsEvent::new(ProtocolRsEventType::Term))
            .map(|_| ())
    }

    fn forward_for_server(
        &self,
        event_type: ProtocolRsEventType,
        protocol_handle: ProtocolHandle,
        server_name: &str,
        server_uid: &str,
        cluster_handle: ClusterHandle,
        engine_handle: EngineHandle,
    ) -> ClusterResult<()> {
        let mut event = ProtocolRsEvent::new(event_type);
        event.protocol_handle = Some(protocol_handle);
        event.server_name = server_name;
        event.server_uid = server_uid;
        event.cluster_handle = Some(cluster_handle);
        event.engine_handle = Some(engine_handle);
        self.forward(&event).map(|_| ())
    }

    fn forward(&self, event: &ProtocolRsEvent<'_>) -> ClusterResult<Option<ProtocolHandle>> {
        let state = self.state.lock();
        if state.closed.get() {
            debug!(
                "{}:{}:{} closed, dropping {} for {}",
                self.name,
                FORWARDING_CONTROL_TAG,
                FORWARDING_CONTROL_FN_FORWARD_TAG,
                event.event_type,
                event.server_uid
            );
            return Ok(None);
        }
        // Clone out so the RefCell borrow ends before a re-entrant call.
        let Some(callback) = state.callback.borrow().clone() else {
            return Err(ClusterError::NullPointer("protocol_callback"));
        };
        debug!(
            "{}:{}:{} {} uid={} name={}",
            self.name,
            FORWARDING_CONTROL_TAG,
            FORWARDING_CONTROL_FN_FORWARD_TAG,
            event.event_type,
            event.server_uid,
            event.server_name
        );
        callback.on_remote_server_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ForwardingControlAdapter, ProtocolRemoteServerCallback, ProtocolRsEvent,
        ProtocolRsEventType, RemoteServerInfo,
    };
    use crate::error::{ClusterError, ClusterResult};
    use crate::handles::{ClusterHandle, EngineHandle, ProtocolHandle};
    use std::sync::{Arc, Mutex, OnceLock, Weak};

    #[derive(Default)]
    struct CountingCallback {
        events: Mutex<Vec<(ProtocolRsEventType, Option<ProtocolHandle>, String)>>,
    }

    impl ProtocolRemoteServerCallback for CountingCallback {
        fn on_remote_server_event(
            &self,
            event: &ProtocolRsEvent<'_>,
        ) -> ClusterResult<Option<ProtocolHandle>> {
            self.events.lock().expect("lock events").push((
                event.event_type,
                event.protocol_handle,
                event.server_uid.to_string(),
            ));
            match event.event_type {
                ProtocolRsEventType::Create => Ok(Some(ProtocolHandle(100))),
                ProtocolRsEventType::Remove => Err(ClusterError::Error("busy".to_string())),
                _ => Ok(None),
            }
        }
    }

    fn server() -> RemoteServerInfo {
        RemoteServerInfo {
            server_name: "broker-b".to_string(),
            server_uid: "uid-b".to_string(),
            address: "10.0.0.2".to_string(),
            port: 9104,
            use_tls: false,
        }
    }

    #[test]
    fn operations_forward_kind_and_return_callback_result() {
        let adapter = ForwardingControlAdapter::new("test");
        let callback = Arc::new(CountingCallback::default());
        adapter.register_protocol_callback(callback.clone());

        let handle = adapter
            .add(&server(), ClusterHandle(1), EngineHandle(2))
            .expect("add");
        assert_eq!(handle, Some(ProtocolHandle(100)));
        adapter
            .connect(ProtocolHandle(100), &server(), ClusterHandle(1), EngineHandle(2))
            .expect("connect");
        adapter
            .disconnect(
                ProtocolHandle(100),
                "broker-b",
                "uid-b",
                ClusterHandle(1),
                EngineHandle(2),
            )
            .expect("disconnect");
        assert_eq!(
            adapter.remove(
                ProtocolHandle(100),
                "broker-b",
                "uid-b",
                ClusterHandle(1),
                EngineHandle(2)
            ),
            Err(ClusterError::Error("busy".to_string()))
        );
        adapter.term().expect("term");

        let events = callback.events.lock().expect("lock events");
        let kinds: Vec<_> = events.iter().map(|(kind, _, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProtocolRsEventType::Create,
                ProtocolRsEventType::Connect,
                ProtocolRsEventType::Disconnect,
                ProtocolRsEventType::Remove,
                ProtocolRsEventType::Term,
            ]
        );
        assert_eq!(events[0].1, None);
        assert_eq!(events[1].1, Some(ProtocolHandle(100)));
        assert_eq!(events[4].2, "");
    }

    #[test]
    fn missing_callback_is_a_null_pointer() {
        let adapter = ForwardingControlAdapter::new("test");
        assert_eq!(
            adapter.term(),
            Err(ClusterError::NullPointer("protocol_callback"))
        );
    }

    #[test]
    fn closed_adapter_succeeds_without_invoking_callback() {
        let adapter = ForwardingControlAdapter::new("test");
        let callback = Arc::new(CountingCallback::default());
        adapter.register_protocol_callback(callback.clone());

        adapter.close();
        adapter.close();

        assert!(adapter.is_closed());
        assert_eq!(
            adapter.add(&server(), ClusterHandle(1), EngineHandle(2)),
            Ok(None)
        );
        assert_eq!(
            adapter.remove(ProtocolHandle(1), "n", "u", ClusterHandle(1), EngineHandle(2)),
            Ok(())
        );
        assert!(callback.events.lock().expect("lock events").is_empty());

        let unregistered = ForwardingControlAdapter::new("test");
        unregistered.close();
        assert_eq!(unregistered.term(), Ok(()));
    }

    struct ReentrantCallback {
        adapter: OnceLock<Weak<ForwardingControlAdapter>>,
        calls: Mutex<Vec<ProtocolRsEventType>>,
    }

    impl ProtocolRemoteServerCallback for ReentrantCallback {
        fn on_remote_server_event(
            &self,
            event: &ProtocolRsEvent<'_>,
        ) -> ClusterResult<Option<ProtocolHandle>> {
            self.calls.lock().expect("lock calls").push(event.event_type);
            if event.event_type == ProtocolRsEventType::Disconnect {
                let adapter = self
                    .adapter
                    .get()
                    .and_then(Weak::upgrade)
                    .expect("adapter alive");
                adapter.remove(
                    event.protocol_handle.expect("protocol handle"),
                    event.server_name,
                    event.server_uid,
                    event.cluster_handle.expect("cluster handle"),
                    event.engine_handle.expect("engine handle"),
                )?;
            }
            Ok(None)
        }
    }

    #[test]
    fn callback_may_reenter_adapter_on_same_thread() {
        let adapter = Arc::new(ForwardingControlAdapter::new("test"));
        let callback = Arc::new(ReentrantCallback {
            adapter: OnceLock::new(),
            calls: Mutex::new(Vec::new()),
        });
        callback
            .adapter
            .set(Arc::downgrade(&adapter))
            .expect("bind adapter once");
        adapter.register_protocol_callback(callback.clone());

        adapter
            .disconnect(ProtocolHandle(5), "n", "u", ClusterHandle(1), EngineHandle(1))
            .expect("disconnect");

        assert_eq!(
            *callback.calls.lock().expect("lock calls"),
            vec![ProtocolRsEventType::Disconnect, ProtocolRsEventType::Remove]
        );
    }
}

use integration_test_utils::{
    init_logging, InMemoryAttributeSink, RecordingCallback, RecordingViewKeeper, ViewTransition,
};
use mcp_routing::forwarding::{ProtocolRsEventType, RemoteServerInfo};
use mcp_routing::membership::{AttributeMap, ViewKeeper, ViewNotifyEvent};
use mcp_routing::runtime::spawn_view_notify_loop;
use mcp_routing::stats::local_monitoring::HealthStatus;
use mcp_routing::wire::attributes::read_sqn;
use mcp_routing::wire::filter_tags;
use mcp_routing::{
    ClusterControlPlane, ClusterHandle, ControlPlaneConfig, EngineHandle, ProtocolHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

#[tokio::test(start_paused = true)]
async fn tokio_scheduler_publishes_after_configured_delay() {
    init_logging();
    let sink = Arc::new(InMemoryAttributeSink::default());
    let mut config = ControlPlaneConfig::new("uid-a", "broker-a");
    config.publish_monitoring_delay_ms = 200;
    let plane = ClusterControlPlane::with_tokio(config, sink.clone(), Handle::current())
        .expect("control plane");
    plane.start(None).expect("start");
    plane.recovery_completed().expect("recovered");

    plane.set_health_status(HealthStatus::Yellow).expect("health");
    plane.set_health_status(HealthStatus::Red).expect("health");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sink.get(filter_tags::MONITORING_STATUS).is_none());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let payload = sink.get(filter_tags::MONITORING_STATUS).expect("published");
    let (sqn, _) = read_sqn(payload).expect("sqn");
    assert_eq!(sqn, 1);
}

#[test]
fn view_events_reach_the_control_plane_on_the_dispatch_thread() {
    let plane = Arc::new(
        ClusterControlPlane::new(
            ControlPlaneConfig::new("uid-a", "broker-a"),
            Arc::new(InMemoryAttributeSink::default()),
            Arc::new(integration_test_utils::CountingScheduler::default()),
        )
        .expect("control plane"),
    );
    plane
        .on_peer_attributes(ClusterHandle(3), "uid-b", &AttributeMap::new())
        .expect("peer");
    let keeper: Arc<dyn ViewKeeper> = plane.clone();

    let dispatcher = spawn_view_notify_loop("dispatch").expect("spawn");
    dispatcher
        .dispatch(ViewNotifyEvent::incoming_protocol_rs_connected(ClusterHandle(3), &keeper))
        .expect("dispatch");
    assert_eq!(dispatcher.shutdown(), Ok(1));

    assert!(plane.is_forwarding_connected(ClusterHandle(3)));
}

#[test]
fn recording_view_keeper_sees_both_transitions() {
    let recording = Arc::new(RecordingViewKeeper::default());
    let keeper: Arc<dyn ViewKeeper> = recording.clone();

    ViewNotifyEvent::incoming_protocol_rs_connected(ClusterHandle(1), &keeper)
        .deliver()
        .expect("connected");
    ViewNotifyEvent::incoming_protocol_rs_disconnected(ClusterHandle(1), &keeper)
        .deliver()
        .expect("disconnected");

    assert_eq!(
        recording.transitions(),
        vec![
            ViewTransition::Connected(ClusterHandle(1)),
            ViewTransition::Disconnected(ClusterHandle(1)),
        ]
    );
}

#[test]
fn forwarding_lifecycle_through_the_control_plane() {
    let plane = ClusterControlPlane::new(
        ControlPlaneConfig::new("uid-a", "broker-a"),
        Arc::new(InMemoryAttributeSink::default()),
        Arc::new(integration_test_utils::CountingScheduler::default()),
    )
    .expect("control plane");
    let callback = Arc::new(RecordingCallback::default());
    plane.forwarding().register_protocol_callback(callback.clone());
    let server = RemoteServerInfo {
        server_name: "broker-b".to_string(),
        server_uid: "uid-b".to_string(),
        address: "10.0.0.2".to_string(),
        port: 9104,
        use_tls: true,
    };

    let handle = plane
        .add_forwarding_channel(&server, ClusterHandle(2), EngineHandle(20))
        .expect("add")
        .expect("protocol handle");
    assert_eq!(handle, ProtocolHandle(1));
    assert_eq!(plane.forwarding_channel(ClusterHandle(2)), Some(handle));
    plane
        .connect_forwarding_channel(&server, ClusterHandle(2))
        .expect("connect");

    plane.close();
    plane
        .forwarding()
        .remove(handle, "broker-b", "uid-b", ClusterHandle(2), EngineHandle(20))
        .expect("remove after close");
    assert_eq!(plane.on_peer_left(ClusterHandle(2)), Ok(false));

    let kinds: Vec<_> = callback.events().iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, vec![ProtocolRsEventType::Create, ProtocolRsEventType::Connect]);
    assert_eq!(callback.events()[0].address.as_deref(), Some("10.0.0.2"));
}

use integration_test_utils::{
    init_logging, CountingScheduler, InMemoryAttributeSink, RecordingCallback,
};
use mcp_routing::forwarding::{ProtocolRsEventType, RemoteServerInfo};
use mcp_routing::stats::global_retained::{export_block_size, EXPORT_HEADER_LEN};
use mcp_routing::stats::local_monitoring::{HaStatus, HealthStatus};
use mcp_routing::stats::RetainedStatsItem;
use mcp_routing::wire::filter_tags;
use mcp_routing::wire::attributes::read_sqn;
use mcp_routing::{
    ClusterControlPlane, ClusterError, ClusterHandle, ControlPlaneConfig, EngineHandle,
    ProtocolHandle,
};
use std::sync::Arc;

struct Node {
    sink: Arc<InMemoryAttributeSink>,
    plane: ClusterControlPlane,
}

fn node(uid: &str) -> Node {
    init_logging();
    let sink = Arc::new(InMemoryAttributeSink::default());
    let plane = ClusterControlPlane::new(
        ControlPlaneConfig::new(uid, &format!("{uid}-broker")),
        sink.clone(),
        Arc::new(CountingScheduler::default()),
    )
    .expect("control plane");
    plane.start(None).expect("start");
    plane.recovery_completed().expect("recovered");
    Node { sink, plane }
}

#[test]
fn retained_stats_flow_from_publisher_to_export_block() {
    let a = node("uid-a");
    let b = node("uid-b");

    a.plane
        .update_retained_stats("t1", Some(&b"12345"[..]))
        .expect("t1");
    a.plane
        .update_retained_stats("t2", Some(&[7u8; 16][..]))
        .expect("t2");
    a.plane
        .update_retained_stats("t3", Some(&b"ok"[..]))
        .expect("t3");
    a.plane
        .local_retained()
        .publish_retained_stats()
        .expect("publish");

    let update = b
        .plane
        .on_peer_attributes(ClusterHandle(1), "uid-a", &a.sink.snapshot())
        .expect("deliver");
    assert!(update.retained_stats);

    let lookup = b
        .plane
        .global_retained()
        .lookup_retained_stats("uid-a")
        .expect("lookup")
        .expect("found");
    let expected = export_block_size(&[
        RetainedStatsItem::new("t1", b"12345".to_vec()),
        RetainedStatsItem::new("t2", vec![7u8; 16]),
        RetainedStatsItem::new("t3", b"ok".to_vec()),
    ])
    .expect("size");

    assert_eq!(lookup.len(), 3);
    assert_eq!(lookup.byte_len(), expected);
    assert_eq!(
        lookup.as_bytes()[..4],
        3u32.to_le_bytes()[..],
        "item count leads the block"
    );
    assert!(lookup.byte_len() > EXPORT_HEADER_LEN);
    let entries: Vec<_> = lookup.iter().collect();
    assert_eq!(entries[0].uid, "t1");
    assert_eq!(entries[0].data, b"12345");
    assert_eq!(entries[2].data, b"ok");
    b.plane.global_retained().free_retained_stats(Some(lookup));
}

#[test]
fn redelivered_attributes_are_not_applied_twice() {
    let a = node("uid-a");
    let b = node("uid-b");

    a.plane.set_health_status(HealthStatus::Green).expect("health");
    a.plane.local_monitoring().publish_monitoring_status().expect("publish");
    let first = a.sink.snapshot();

    let update = b
        .plane
        .on_peer_attributes(ClusterHandle(1), "uid-a", &first)
        .expect("first");
    assert!(update.monitoring_status);
    let update = b
        .plane
        .on_peer_attributes(ClusterHandle(1), "uid-a", &first)
        .expect("again");
    assert!(!update.monitoring_status);
    assert_eq!(
        b.plane.peer_status(ClusterHandle(1)),
        Some((HealthStatus::Green, HaStatus::Unknown))
    );

    a.sink.remove(filter_tags::MONITORING_STATUS);
    b.plane
        .on_peer_attributes(ClusterHandle(1), "uid-a", &a.sink.snapshot())
        .expect("absent");
    assert_eq!(
        b.plane.peer_status(ClusterHandle(1)),
        Some((HealthStatus::Unknown, HaStatus::Unknown))
    );
}

#[test]
fn removed_servers_propagate_and_are_republished() {
    let a = node("uid-a");
    let b = node("uid-b");
    let c = node("uid-c");

    assert!(a.plane.add_removed_server("uid-x", 4).expect("remove x"));
    let update = b
        .plane
        .on_peer_attributes(ClusterHandle(1), "uid-a", &a.sink.snapshot())
        .expect("deliver to b");
    assert!(update.removed_servers.changed);
    assert_eq!(update.removed_servers.newly_removed, vec!["uid-x".to_string()]);
    assert!(b.sink.get(filter_tags::REMOVED_SERVERS_LIST).is_some());

    c.plane
        .on_peer_attributes(ClusterHandle(2), "uid-b", &b.sink.snapshot())
        .expect("deliver to c");
    let removed = c.plane.removed_servers();
    assert_eq!(removed.get("uid-x").map(|r| r.incarnation_number()), Some(4));
}

#[test]
fn local_server_on_a_peer_removed_list_is_reported() {
    let a = node("uid-a");
    let b = node("uid-b");

    a.plane.add_removed_server("uid-b", 1).expect("remove b");
    let result = b
        .plane
        .on_peer_attributes(ClusterHandle(1), "uid-a", &a.sink.snapshot());

    assert_eq!(
        result,
        Err(ClusterError::LocalServerRemoved("uid-b".to_string()))
    );
    assert!(b.plane.removed_servers().contains("uid-b"));
    let payload = b
        .sink
        .get(filter_tags::REMOVED_SERVERS_LIST)
        .expect("merged set republished");
    let (sqn, _) = read_sqn(payload).expect("sqn");
    assert_eq!(sqn, 1);
}

#[test]
fn removed_server_is_torn_down_on_every_receiving_node() {
    let a = node("uid-a");
    let b = node("uid-b");
    let x = node("uid-x");
    let callback = Arc::new(RecordingCallback::default());
    b.plane.forwarding().register_protocol_callback(callback.clone());

    x.plane
        .update_retained_stats("t1", Some(&b"stats"[..]))
        .expect("t1");
    x.plane
        .local_retained()
        .publish_retained_stats()
        .expect("publish");
    b.plane
        .on_peer_attributes(ClusterHandle(9), "uid-x", &x.sink.snapshot())
        .expect("x known to b");
    let server = RemoteServerInfo {
        server_name: "uid-x-broker".to_string(),
        server_uid: "uid-x".to_string(),
        address: "10.0.0.9".to_string(),
        port: 9104,
        use_tls: false,
    };
    assert_eq!(
        b.plane
            .add_forwarding_channel(&server, ClusterHandle(9), EngineHandle(90))
            .expect("add"),
        Some(ProtocolHandle(1))
    );
    assert!(b.plane.global_retained().contains("uid-x"));

    assert!(a.plane.add_removed_server("uid-x", 4).expect("remove x"));
    let update = b
        .plane
        .on_peer_attributes(ClusterHandle(1), "uid-a", &a.sink.snapshot())
        .expect("deliver to b");

    assert_eq!(update.removed_servers.newly_removed, vec!["uid-x".to_string()]);
    assert!(!b.plane.global_retained().contains("uid-x"));
    assert!(b.plane.peer_status(ClusterHandle(9)).is_none());
    assert!(b.plane.forwarding_channel(ClusterHandle(9)).is_none());

    let events = callback.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, ProtocolRsEventType::Remove);
    assert_eq!(events[1].protocol_handle, Some(ProtocolHandle(1)));
    assert_eq!(events[1].server_uid, "uid-x");
    assert_eq!(events[1].cluster_handle, Some(ClusterHandle(9)));

    let again = b
        .plane
        .on_peer_attributes(ClusterHandle(1), "uid-a", &a.sink.snapshot())
        .expect("redeliver");
    assert!(again.removed_servers.newly_removed.is_empty());
    assert_eq!(callback.call_count(), 2);
}

#[test]
fn restored_servers_unknown_locally_are_reported() {
    let a = node("uid-a");
    let b = node("uid-b");
    b.plane
        .on_peer_attributes(ClusterHandle(7), "uid-k", &Default::default())
        .expect("known peer");

    a.plane
        .publisher()
        .publish_restored_not_in_view(&[
            mcp_routing::membership::RemoteServerRecord::new("uid-b", "self", 1),
            mcp_routing::membership::RemoteServerRecord::new("uid-k", "known", 1),
            mcp_routing::membership::RemoteServerRecord::new("uid-z", "lost", 2),
        ])
        .expect("publish");

    let update = b
        .plane
        .on_peer_attributes(ClusterHandle(1), "uid-a", &a.sink.snapshot())
        .expect("deliver");

    let uids: Vec<_> = update
        .restored_not_in_view
        .iter()
        .map(|record| record.server_uid())
        .collect();
    assert_eq!(uids, vec!["uid-z"]);
}

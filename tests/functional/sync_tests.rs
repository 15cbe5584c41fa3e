//! Synchronization-pass tests: diffing the live pod set against the
//! bridge set, port assignment, and teardown.
//!
//! Each test uses its own base ports so listeners never collide across
//! parallel test threads.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use podbridge::{BridgeConfig, PodBridgeManager};

use crate::mock_cluster::MockCluster;

fn config(base_port: u16, base_debug_port: u16) -> BridgeConfig {
    BridgeConfig {
        base_port,
        base_debug_port,
        ..BridgeConfig::default()
    }
}

#[tokio::test]
async fn test_bridges_follow_enumeration_and_ports_are_never_reused() {
    let cluster = MockCluster::with_pods(&["pod-a", "pod-b"]);
    let mut manager = PodBridgeManager::connect(cluster.clone(), config(49001, 50001))
        .await
        .unwrap();

    // [A, B] with no existing bridges: two bridges on the first two ports.
    assert_eq!(manager.bridge_count(), 2);
    assert_eq!(
        manager.ports_by_pod(),
        vec![
            ("pod-a".to_string(), 49001),
            ("pod-b".to_string(), 49002),
        ]
    );

    // [A]: B's bridge is destroyed, A's untouched.
    cluster.set_pods(&["pod-a"]);
    manager.synchronize().await.unwrap();
    assert_eq!(manager.ports_by_pod(), vec![("pod-a".to_string(), 49001)]);

    // [A, C]: the new pod gets the next port; 49002 is never reused.
    cluster.set_pods(&["pod-a", "pod-c"]);
    manager.synchronize().await.unwrap();
    assert_eq!(
        manager.ports_by_pod(),
        vec![
            ("pod-a".to_string(), 49001),
            ("pod-c".to_string(), 49003),
        ]
    );
}

#[tokio::test]
async fn test_repeated_synchronize_is_idempotent() {
    let cluster = MockCluster::with_pods(&["pod-a", "pod-b"]);
    let mut manager = PodBridgeManager::connect(cluster.clone(), config(49051, 50051))
        .await
        .unwrap();

    let ports_after_first = manager.ports_by_pod();
    let tunnels_after_first = cluster.tunnels_opened();

    manager.synchronize().await.unwrap();
    manager.synchronize().await.unwrap();

    // No creations (no new probe tunnels) and no destructions.
    assert_eq!(manager.ports_by_pod(), ports_after_first);
    assert_eq!(cluster.tunnels_opened(), tunnels_after_first);
}

#[tokio::test]
async fn test_enumeration_failure_aborts_pass_and_leaves_state() {
    let cluster = MockCluster::with_pods(&["pod-a", "pod-b"]);
    let mut manager = PodBridgeManager::connect(cluster.clone(), config(49101, 50101))
        .await
        .unwrap();
    let ports_before = manager.ports_by_pod();

    cluster.fail_all_listings(true);
    let err = manager.synchronize().await.unwrap_err();
    assert!(err.is_cluster_unavailable());
    assert_eq!(manager.ports_by_pod(), ports_before);

    // The next pass after recovery works normally.
    cluster.fail_all_listings(false);
    cluster.set_pods(&["pod-a"]);
    manager.synchronize().await.unwrap();
    assert_eq!(manager.bridge_count(), 1);
}

#[tokio::test]
async fn test_unreachable_pod_surfaces_partial_pass() {
    let cluster = MockCluster::with_pods(&["pod-a"]);
    let mut manager = PodBridgeManager::connect(cluster.clone(), config(49131, 50131))
        .await
        .unwrap();

    cluster.mark_unreachable("pod-b");
    cluster.set_pods(&["pod-a", "pod-b"]);

    let err = manager.synchronize().await.unwrap_err();
    assert!(err.is_connection());
    assert!(err.to_string().contains("pod-b"));

    // A's bridge survives; B's was never recorded.
    assert_eq!(manager.ports_by_pod(), vec![("pod-a".to_string(), 49131)]);
}

#[tokio::test]
async fn test_destroy_all_is_idempotent() {
    let cluster = MockCluster::with_pods(&["pod-a", "pod-b", "pod-c"]);
    let mut manager = PodBridgeManager::connect(cluster, config(49151, 50151))
        .await
        .unwrap();
    assert_eq!(manager.bridge_count(), 3);

    manager.destroy_all();
    assert_eq!(manager.bridge_count(), 0);
    assert!(manager.ports().is_empty());

    // Second sweep is a no-op, no error.
    manager.destroy_all();
    assert_eq!(manager.bridge_count(), 0);
}

#[tokio::test]
async fn test_pod_recreated_under_same_name_gets_fresh_bridge() {
    let cluster = MockCluster::default();
    cluster.set_pods_with_uids(&[("pod-a", "gen-1")]);
    let mut manager = PodBridgeManager::connect(cluster.clone(), config(49201, 50201))
        .await
        .unwrap();
    assert_eq!(manager.ports(), vec![49201]);

    // Same name, new UID: the old tunnel points at a dead pod.
    cluster.set_pods_with_uids(&[("pod-a", "gen-2")]);
    manager.synchronize().await.unwrap();

    assert_eq!(manager.bridge_count(), 1);
    assert_eq!(manager.ports(), vec![49202]);
}

#[tokio::test]
async fn test_debug_mode_allocates_debug_channel_per_bridge() {
    let cluster = MockCluster::with_pods(&["pod-a", "pod-b"]);
    let config = BridgeConfig {
        debug_mode: true,
        ..config(49251, 50251)
    };
    let manager = PodBridgeManager::connect(cluster, config).await.unwrap();

    assert_eq!(manager.ports(), vec![49251, 49252]);
    assert_eq!(
        manager.debug_ports_by_pod(),
        vec![
            ("pod-a".to_string(), 50251),
            ("pod-b".to_string(), 50252),
        ]
    );
}

#[tokio::test]
async fn test_bridge_proxies_bytes_end_to_end() {
    let cluster = MockCluster::with_pods(&["pod-a"]);
    let _manager = PodBridgeManager::connect(cluster, config(49301, 50301))
        .await
        .unwrap();

    let mut stream = TcpStream::connect("127.0.0.1:49301").await.unwrap();
    stream.write_all(b"ping").await.unwrap();

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"ping");
}

#[tokio::test]
async fn test_live_ports_stay_pairwise_distinct_across_churn() {
    let cluster = MockCluster::with_pods(&["pod-a", "pod-b", "pod-c"]);
    let mut manager = PodBridgeManager::connect(cluster.clone(), config(49351, 50351))
        .await
        .unwrap();

    let mut seen = manager.ports();
    for pods in [
        &["pod-b", "pod-c", "pod-d", "pod-e"][..],
        &["pod-e", "pod-f"][..],
        &["pod-f", "pod-a"][..],
    ] {
        cluster.set_pods(pods);
        manager.synchronize().await.unwrap();

        assert_eq!(manager.bridge_count(), pods.len());
        let ports = manager.ports();
        let mut deduped = ports.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), ports.len(), "live ports must be distinct");

        // Newly allocated ports never revisit an earlier assignment.
        for port in &ports {
            if !seen.contains(port) {
                assert!(seen.iter().all(|p| p < port));
                seen.push(*port);
            }
        }
    }
}

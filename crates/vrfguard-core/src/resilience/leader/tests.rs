use super::*;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use futures::stream::BoxStream;

struct UnreachableTransport;

#[async_trait]
impl PeerTransport for UnreachableTransport {
    async fn publish(&self, _message: PeerMessage) -> AppResult<()> {
        Err(AppError::Transport("connection refused".into()))
    }

    fn subscribe(&self) -> BoxStream<'static, PeerMessage> {
        Box::pin(futures::stream::pending())
    }
}

fn elector(node_id: &str, bus: &Arc<LocalPeerBus>) -> Arc<LeaderElector> {
    LeaderElector::with_node_id(node_id, LeaderConfig::default(), bus.clone())
}

#[tokio::test(start_paused = true)]
async fn test_single_node_elects_itself() {
    let bus = Arc::new(LocalPeerBus::default());
    let node = elector("node-a", &bus);
    let mut changes = node.subscribe();
    let handle = node.start();

    let change = changes.recv().await.unwrap();
    assert!(change.is_leader);
    assert_eq!(change.leader.as_deref(), Some("node-a"));
    assert!(node.is_leader());

    node.shutdown();
    handle.await.unwrap();
    assert!(!node.is_leader());
}

#[tokio::test(start_paused = true)]
async fn test_lowest_live_id_wins() {
    let bus = Arc::new(LocalPeerBus::default());
    let a = elector("node-a", &bus);
    let b = elector("node-b", &bus);
    let handles = [b.start(), a.start()];

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(a.is_leader());
    assert!(!b.is_leader());
    assert_eq!(b.current_leader().as_deref(), Some("node-a"));
    assert_eq!(a.live_peers(), vec!["node-a".to_string(), "node-b".to_string()]);

    a.shutdown();
    b.shutdown();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_goodbye_hands_over_leadership() {
    let bus = Arc::new(LocalPeerBus::default());
    let a = elector("node-a", &bus);
    let b = elector("node-b", &bus);
    let handle_a = a.start();
    let handle_b = b.start();

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(!b.is_leader());

    a.shutdown();
    handle_a.await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(b.is_leader());

    b.shutdown();
    handle_b.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stale_peers_are_dropped() {
    let bus = Arc::new(LocalPeerBus::default());
    let node = elector("node-m", &bus);

    node.observe(&PeerMessage::Heartbeat { node_id: "node-z".into() });
    assert!(!node.is_leader());
    assert_eq!(node.current_leader().as_deref(), Some("node-z"));

    node.peers.insert("node-m".into(), Instant::now());
    assert!(node.evaluate());

    let later = Instant::now() + Duration::from_millis(6_001);
    assert!(!node.evaluate_at(later));
    assert_eq!(node.current_leader(), None);
}

#[tokio::test(start_paused = true)]
async fn test_own_messages_are_ignored() {
    let bus = Arc::new(LocalPeerBus::default());
    let node = elector("node-a", &bus);
    node.observe(&PeerMessage::Heartbeat { node_id: "node-a".into() });
    assert!(node.live_peers().is_empty());
    assert!(!node.is_leader());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_transport_never_leads() {
    let node = LeaderElector::with_node_id(
        "node-a",
        LeaderConfig::default(),
        Arc::new(UnreachableTransport),
    );
    let handle = node.start();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!node.is_leader());
    node.shutdown();
    handle.await.unwrap();
}

#[test]
fn test_peer_message_wire_format() {
    let message = PeerMessage::Heartbeat { node_id: "node-a".into() };
    let json = serde_json::to_value(&message).unwrap();
    assert_eq!(json["type"], "heartbeat");
    assert_eq!(json["node_id"], "node-a");
    let back: PeerMessage = serde_json::from_value(json).unwrap();
    assert_eq!(back.sender(), "node-a");
}

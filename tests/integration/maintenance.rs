use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Maintenance
// ══════════════════════════════════════════════════════════════════════════════

/// A peer that stops being ranged is evicted after the timeout while
/// ranged peers survive.
#[tokio::test(start_paused = true)]
async fn test_silent_peer_evicted() {
    let store = MemoryStore::new();
    let config = config_with(&[(101, -48, Some(1.25)), (103, -71, None)]);
    let node = boot(&config, &store).unwrap();

    node.command("AT+TIMEOUT 1000").await;
    node.command("AT+STARTBLE").await;
    node.command("AT+STARTUWB").await;
    advance(600).await;
    assert_eq!(node.peer_ids().await.len(), 2);

    // No more sightings, so 103 cannot come back once evicted.
    node.command("AT+STOPBLE").await;
    advance(3000).await;

    assert_eq!(node.peer_ids().await, vec![101]);
    node.stop().await;
}

/// Stopping ranging lets every peer age out.
#[tokio::test(start_paused = true)]
async fn test_everything_ages_out_without_ranging() {
    let store = MemoryStore::new();
    let node = boot(&config_with(&[(1, -40, Some(1.0)), (2, -50, Some(2.0))]), &store).unwrap();

    node.command("AT+TIMEOUT 2000").await;
    node.command("AT+STARTBLE").await;
    node.command("AT+STARTUWB").await;
    advance(500).await;
    node.command("AT+STOPBLE").await;
    node.command("AT+STOPUWB").await;

    advance(1000).await;
    assert_eq!(node.peer_ids().await.len(), 2);
    advance(3000).await;
    assert!(node.peer_ids().await.is_empty());
    node.stop().await;
}

/// The table is kept strongest first, with the scan paused around re-ranks.
#[tokio::test(start_paused = true)]
async fn test_registry_reranked_by_signal() {
    let store = MemoryStore::new();
    let config = config_with(&[(1, -80, Some(1.0)), (2, -60, Some(2.0)), (3, -40, Some(3.0))]);
    let node = boot(&config, &store).unwrap();

    node.command("AT+STARTBLE").await;
    advance(1500).await;

    assert_eq!(node.peer_ids().await, vec![3, 2, 1]);
    assert!(node.discovery.pause_count() >= 1);
    assert!(!node.discovery.is_paused());
    node.stop().await;
}

/// Sightings beyond capacity are dropped until a slot frees up.
#[tokio::test(start_paused = true)]
async fn test_capacity_limit() {
    let store = MemoryStore::new();
    let peers: Vec<(u32, i8, Option<f32>)> = (1..=25).map(|id| (id, -50, None)).collect();
    let node = boot(&config_with(&peers), &store).unwrap();

    node.command("AT+STARTBLE").await;
    advance(300).await;

    let ids = node.peer_ids().await;
    assert_eq!(ids.len(), sonde_core::MAX_PEERS);
    assert!(!ids.contains(&25));
    node.stop().await;
}

/// Sightings injected directly behave like discovered peers.
#[tokio::test(start_paused = true)]
async fn test_injected_sighting() {
    let store = MemoryStore::new();
    let node = boot(&config_with(&[]), &store).unwrap();

    let id = PeerId::new(44).unwrap();
    node.sightings.send(PeerSighting { id, rssi: -33 }).await.unwrap();
    advance(10).await;

    let record = node.record(44).await.unwrap();
    assert_eq!(record.rssi, -33);
    assert_eq!(record.timestamp, 0);
    node.stop().await;
}

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Ranging
// ══════════════════════════════════════════════════════════════════════════════

/// Discovered peers get ranged; a peer that never answers keeps no distance.
#[tokio::test(start_paused = true)]
async fn test_peers_are_ranged() {
    let store = MemoryStore::new();
    let config = config_with(&[(101, -48, Some(1.25)), (102, -63, Some(4.8)), (103, -71, None)]);
    let node = boot(&config, &store).unwrap();

    node.command("AT+STARTBLE").await;
    node.command("AT+STARTUWB").await;
    advance(1000).await;

    assert_eq!(node.peer_ids().await.len(), 3);
    assert_eq!(node.record(101).await.and_then(|r| r.distance), Some(1.25));
    assert_eq!(node.record(102).await.and_then(|r| r.distance), Some(4.8));
    let silent = node.record(103).await.unwrap();
    assert_eq!(silent.distance, None);
    assert_eq!(silent.timestamp, 0);

    assert!(node.radio.response_count() > 0);
    assert_eq!(node.radio.conflict_count(), 0);
    node.stop().await;
}

/// Out-of-band distances are measured but never stored.
#[tokio::test(start_paused = true)]
async fn test_implausible_range_discarded() {
    let store = MemoryStore::new();
    let config = config_with(&[(8, -50, Some(180.0)), (9, -50, Some(-4.0))]);
    let node = boot(&config, &store).unwrap();

    node.command("AT+STARTBLE").await;
    node.command("AT+STARTUWB").await;
    advance(800).await;

    assert!(node.radio.exchange_count() > 0);
    assert_eq!(node.record(8).await.and_then(|r| r.distance), None);
    assert_eq!(node.record(9).await.and_then(|r| r.distance), Some(-4.0));
    node.stop().await;
}

/// Stopping ranging stops exchanges and responses; rate 0 idles the
/// initiator but leaves the responder answering.
#[tokio::test(start_paused = true)]
async fn test_stop_and_zero_rate() {
    let store = MemoryStore::new();
    let node = boot(&config_with(&[(5, -50, Some(3.0))]), &store).unwrap();

    node.command("AT+STARTBLE").await;
    node.command("AT+STARTUWB").await;
    advance(500).await;
    assert_eq!(node.command("AT+STOPUWB").await, "OK");

    let exchanges = node.radio.exchange_count();
    let responses = node.radio.response_count();
    assert!(exchanges > 0);
    advance(2000).await;
    assert_eq!(node.radio.exchange_count(), exchanges);
    assert_eq!(node.radio.response_count(), responses);

    assert_eq!(node.command("AT+RATE 0").await, "Rate: 0 OK");
    // Let any backoff drawn at the old rate run out.
    advance(300).await;
    node.command("AT+STARTUWB").await;
    let exchanges = node.radio.exchange_count();
    advance(3000).await;
    assert_eq!(node.radio.exchange_count(), exchanges);
    assert!(node.radio.response_count() > responses);

    assert_eq!(node.radio.conflict_count(), 0);
    node.stop().await;
}

/// Channel changes reach the radio while it is busy ranging.
#[tokio::test(start_paused = true)]
async fn test_reconfigure_while_ranging() {
    let store = MemoryStore::new();
    let node = boot(&config_with(&[(5, -50, Some(3.0))]), &store).unwrap();

    node.command("AT+STARTBLE").await;
    node.command("AT+STARTUWB").await;
    advance(300).await;

    assert_eq!(node.command("AT+CHANNEL 3").await, "OK");
    assert_eq!(node.command("AT+TXPOWER 1").await, "OK");
    assert_eq!(node.radio.channel(), 3);
    assert_eq!(node.radio.tx_power(), sonde_core::TxPower::Max);
    assert_eq!(node.radio.conflict_count(), 0);
    node.stop().await;
}

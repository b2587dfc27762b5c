use crate::*;

use sonde_core::{KvStore, ParamKey};

// ══════════════════════════════════════════════════════════════════════════════
//  Commands & Persistence
// ══════════════════════════════════════════════════════════════════════════════

/// An out-of-range rate is refused and nothing is stored; a valid one is
/// applied, stored, and restored on the next boot.
#[tokio::test(start_paused = true)]
async fn test_rate_persisted_across_restart() {
    let store = MemoryStore::new();
    let config = config_with(&[]);
    let node = boot(&config, &store).unwrap();

    assert_eq!(node.command("AT+RATE 600").await, "Invalid rate parameter");
    assert_eq!(node.node.params.borrow().polling_rate, 100);
    assert_eq!(store.read(ParamKey::PollingRate).unwrap(), None);

    assert_eq!(node.command("AT+RATE 250").await, "Rate: 250 OK");
    assert_eq!(node.node.params.borrow().polling_rate, 250);
    node.stop().await;

    let mut restarted = boot(&config, &store).unwrap();
    assert_eq!(restarted.node.params.borrow().polling_rate, 250);
    assert_eq!(
        restarted.drain_console(),
        vec!["Flash Configuration:", "  UWB Polling Rate: 250"]
    );
    restarted.stop().await;
}

/// The stored boot mode starts discovery and ranging on the next boot.
#[tokio::test(start_paused = true)]
async fn test_boot_mode_applies_after_restart() {
    let store = MemoryStore::new();
    let config = config_with(&[(31, -45, Some(2.0))]);
    let node = boot(&config, &store).unwrap();

    assert_eq!(node.command("AT+ID 7").await, "OK");
    assert_eq!(node.command("AT+BOOTMODE 2").await, "Bootmode: 2 OK");
    assert!(!node.node.arbiter.ranging_running());
    node.stop().await;

    let restarted = boot(&config, &store).unwrap();
    assert!(restarted.node.arbiter.discovery_running());
    assert!(restarted.node.arbiter.ranging_running());
    assert_eq!(restarted.discovery.identity(), PeerId::new(7));

    advance(1000).await;
    assert_eq!(restarted.record(31).await.and_then(|r| r.distance), Some(2.0));
    restarted.stop().await;
}

/// A boot mode stored without an identity is ignored.
#[tokio::test(start_paused = true)]
async fn test_boot_mode_needs_identity() {
    let store = MemoryStore::new();
    store.write(ParamKey::BootMode, 2).unwrap();

    let node = boot(&config_with(&[]), &store).unwrap();
    assert!(!node.node.arbiter.discovery_running());
    assert!(!node.node.arbiter.ranging_running());
    node.stop().await;
}

/// Reset wipes the store but leaves the running node untouched.
#[tokio::test(start_paused = true)]
async fn test_reset_restores_defaults_on_next_boot() {
    let store = MemoryStore::new();
    let config = config_with(&[]);
    let node = boot(&config, &store).unwrap();

    node.command("AT+RATE 20").await;
    node.command("AT+CHANNEL 2").await;
    node.command("AT+TXPOWER 1").await;
    assert_eq!(node.radio.channel(), 2);

    assert_eq!(node.command("AT+RESET").await, "Reset OK");
    assert!(store.is_empty());
    assert_eq!(node.node.params.borrow().polling_rate, 20);
    node.stop().await;

    let restarted = boot(&config, &store).unwrap();
    assert_eq!(restarted.node.params.borrow().polling_rate, 100);
    assert_eq!(restarted.radio.channel(), 5);
    restarted.stop().await;
}

/// Store failures never turn a valid command into a rejection.
#[tokio::test(start_paused = true)]
async fn test_store_failure_keeps_live_change() {
    let store = MemoryStore::new();
    let node = boot(&config_with(&[]), &store).unwrap();
    store.set_fail_writes(true);

    assert_eq!(node.command("AT+TIMEOUT 900").await, "OK");
    assert_eq!(node.node.params.borrow().eviction_timeout, 900);
    assert!(store.is_empty());
    node.stop().await;
}

/// Replies also land on the console, in submission order.
#[tokio::test(start_paused = true)]
async fn test_replies_echo_to_console() {
    let store = MemoryStore::new();
    let mut node = boot(&config_with(&[]), &store).unwrap();
    node.drain_console();

    node.command("AT+CHANNEL 6").await;
    node.command("AT+STREAMMODE 1").await;
    node.command("AT+TIMEOUT -3").await;

    assert_eq!(
        node.drain_console(),
        vec!["Invalid Channel number", "OK", "Timeout cannot be negative"]
    );
    node.stop().await;
}

use crate::*;

const HEADER: &str = "# ID, RANGE, RSSI, TIMESTAMP";

// ══════════════════════════════════════════════════════════════════════════════
//  Telemetry
// ══════════════════════════════════════════════════════════════════════════════

/// Full mode lists every peer each period, ranged or not.
#[tokio::test(start_paused = true)]
async fn test_full_table() {
    let store = MemoryStore::new();
    let mut node = boot(&config_with(&[(101, -48, Some(1.25))]), &store).unwrap();

    node.command("AT+STARTBLE").await;
    node.drain_console();
    advance(200).await;

    let lines = node.drain_console();
    assert!(lines.iter().filter(|l| *l == HEADER).count() >= 3);
    assert!(lines.contains(&"101, 0.000000, -48, 0".to_string()));
    node.stop().await;
}

/// Delta mode prints a result once, and prints nothing when nothing changed.
#[tokio::test(start_paused = true)]
async fn test_delta_table() {
    let store = MemoryStore::new();
    let mut node = boot(&config_with(&[(101, -48, Some(1.25))]), &store).unwrap();

    node.command("AT+STREAMMODE 1").await;
    node.command("AT+STARTBLE").await;
    node.command("AT+STARTUWB").await;
    advance(600).await;

    let lines = node.drain_console();
    let rows: Vec<&String> = lines.iter().filter(|l| l.starts_with("101, ")).collect();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r.starts_with("101, 1.250000, -48, ")));

    // Every header carries at least one row.
    for (i, line) in lines.iter().enumerate() {
        if line == HEADER {
            assert!(lines.get(i + 1).is_some_and(|next| next.starts_with("101, ")));
        }
    }

    // Without ranging there are no new results, so nothing is printed.
    node.command("AT+STOPUWB").await;
    advance(100).await;
    node.drain_console();
    advance(500).await;
    assert!(node.drain_console().is_empty());
    node.stop().await;
}

/// No table while discovery is stopped.
#[tokio::test(start_paused = true)]
async fn test_silent_without_discovery() {
    let store = MemoryStore::new();
    let mut node = boot(&config_with(&[(101, -48, Some(1.25))]), &store).unwrap();

    node.command("AT+STARTBLE").await;
    advance(300).await;
    node.command("AT+STOPBLE").await;
    advance(60).await;
    node.drain_console();

    advance(500).await;
    assert!(node.drain_console().iter().all(|l| l != HEADER));
    node.stop().await;
}

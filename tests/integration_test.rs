//! Integration tests for the full connect / exchange / disconnect flow.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use smartblinds_link::bluetooth::mock::{MockLink, MockPlatform};
use smartblinds_link::bluetooth::{CommandEngine, ConnectionManager, OpenStrategy};
use smartblinds_link::schedule::Schedule;
use smartblinds_link::LinkError;

#[tokio::test(start_paused = true)]
async fn test_schedule_update_flow() {
    let platform = MockPlatform::new()
        .with_device("Phone", "11:22:33:44:55:66")
        .with_device("ESP32test", "AA:BB:CC:DD:EE:FF")
        .fail_strategy(OpenStrategy::Insecure);
    let (link, device) = MockLink::pair();
    platform.push_link(link);

    let manager = ConnectionManager::new(platform);
    let mut errors = manager.state().subscribe_errors();

    assert!(manager.connect("ESP32test").await);
    assert!(manager.is_connected());
    assert_eq!(manager.state().last_error(), None);

    // Device answers every request line with OK
    let controller = tokio::spawn(async move {
        let mut reader = BufReader::new(device);
        let mut lines = Vec::new();
        for _ in 0..2 {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            reader.get_mut().write_all(b"OK\r\n").await.unwrap();
            lines.push(line);
        }
        (lines, reader)
    });

    let engine = CommandEngine::new(manager.clone());
    assert_eq!(engine.send_settings(Schedule::default().to_settings()).await, Ok(()));
    assert_eq!(engine.open_blinds().await, Ok(()));

    let (lines, _device) = controller.await.unwrap();
    assert_eq!(
        lines[0],
        "3|openTime:07:00|closeTime:20:00|openLux:50000|closeLux:10000|openMode:TIME|closeMode:TIME|\n"
    );
    assert_eq!(lines[1], "1\n");

    manager.disconnect().await;
    assert!(!manager.is_connected());
    assert!(!errors.has_changed().unwrap());

    assert_eq!(engine.close_blinds().await, Err(LinkError::NotConnected));
    errors.changed().await.unwrap();
    assert_eq!(errors.borrow().as_deref(), Some("Not connected to device"));
}

#[tokio::test]
async fn test_lost_link_reconnects_in_background() {
    let platform = MockPlatform::new().with_device("ESP32test", "AA:BB:CC:DD:EE:FF");
    let (link, _device) = MockLink::pair();
    platform.push_link(link.broken());

    let manager = ConnectionManager::new(platform);
    assert!(manager.connect_default().await);

    let engine = CommandEngine::new(manager.clone());
    let err = engine.sync_time().await.unwrap_err();
    assert!(err.is_io());
    assert!(!manager.is_connected());
    assert!(manager
        .state()
        .last_error()
        .unwrap()
        .starts_with("Command failed:"));

    let reconnected = tokio::time::timeout(Duration::from_secs(1), manager.wait_for_reconnect())
        .await
        .unwrap();
    assert_eq!(reconnected, Some(true));
    assert!(manager.is_connected());
    assert_eq!(manager.state().last_error(), None);

    let attempts = manager.platform().attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|(name, _)| name == "ESP32test"));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let manager = ConnectionManager::new(MockPlatform::new());
    let mut connected = manager.state().subscribe_connected();

    manager.disconnect().await;
    manager.disconnect().await;

    assert!(!manager.is_connected());
    assert!(!connected.has_changed().unwrap());
    assert_eq!(manager.state().last_error(), None);
}

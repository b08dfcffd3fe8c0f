//! Process signal handling. Kept in its own test binary since the signal
//! reaches every server in the process.
#![cfg(unix)]

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};

use logserver::storage::MemoryStorage;
use logserver::{Main, Registry};

mod common;

use common::{counting_cancel, register_echo, test_config, Running};

#[tokio::test]
async fn sigterm_stops_the_server_gracefully() {
    // Keeps the default disposition from killing the test process.
    let mut guard = signal(SignalKind::terminate()).unwrap();

    let (closed, close) = counting_cancel();
    let registry = Registry::with_storage(Arc::new(MemoryStorage::new()));
    let main = Main::new(test_config("it_sigterm"), registry, register_echo)
        .with_storage_close(close);
    let running = Running::start(main);
    running.rpc_url().await;

    // The server installs its handler asynchronously; repeat until it stops.
    let pid = std::process::id().to_string();
    let shutdown = running.shutdown.clone();
    for _ in 0..100 {
        std::process::Command::new("kill")
            .args(["-TERM", &pid])
            .status()
            .unwrap();
        guard.recv().await;
        if shutdown.is_triggered() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    running.join().await.unwrap();
    assert!(shutdown.is_triggered());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}


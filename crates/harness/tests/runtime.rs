use std::sync::Arc;
use std::time::Duration;

use floorsync_core::{ids::*, model::DocumentType};
use floorsync_harness::{line, ApiCall, StubApi};
use floorsync_storage::SqliteStorage;
use floorsync_sync::{ConnectivityEvent, SyncConfig, SyncRuntime};

fn config() -> SyncConfig {
    SyncConfig {
        sync_interval: Duration::from_secs(60),
        autosave_interval: Duration::from_secs(30),
        ..SyncConfig::default()
    }
}

fn start(api: &Arc<StubApi>) -> Result<SyncRuntime, Box<dyn std::error::Error>> {
    let runtime = SyncRuntime::start(config(), SqliteStorage::open_in_memory()?, api.clone())?;
    runtime.engine().lock().create_document(
        DocumentType::Receiving,
        DocumentId::from("RC-1"),
        None,
        vec![line("L1", 10), line("L2", 10)],
    )?;
    Ok(runtime)
}

/// Let spawned tasks run; the paused clock advances only when all are idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn going_online_drains_once() -> Result<(), Box<dyn std::error::Error>> {
    let api = StubApi::new();
    let runtime = start(&api)?;
    let mut events = runtime.monitor().subscribe();

    runtime
        .engine()
        .lock()
        .record_scan(DocumentType::Receiving, &LineId::from("L1"), 4)?;
    settle().await;
    assert!(api.writes().is_empty(), "offline edits stay queued");

    assert!(runtime.monitor().set_online(true));
    assert!(!runtime.monitor().set_online(true));
    settle().await;

    assert_eq!(events.try_recv()?, ConnectivityEvent::Online);
    assert!(events.try_recv().is_err());
    assert_eq!(api.writes().len(), 1);
    assert!(runtime.engine().lock().pending_items()?.is_empty());

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn periodic_sync_runs_only_while_online() -> Result<(), Box<dyn std::error::Error>> {
    let api = StubApi::new();
    let runtime = start(&api)?;
    runtime.monitor().set_online(true);
    settle().await;

    runtime
        .engine()
        .lock()
        .record_scan(DocumentType::Receiving, &LineId::from("L1"), 1)?;
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(api.writes().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(api.writes().len(), 1);

    runtime.monitor().set_online(false);
    runtime
        .engine()
        .lock()
        .record_scan(DocumentType::Receiving, &LineId::from("L2"), 1)?;
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(api.writes().len(), 1);
    assert_eq!(runtime.engine().lock().queue_stats()?.pending, 1);

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn autosave_flushes_on_interval_and_navigation() -> Result<(), Box<dyn std::error::Error>> {
    let api = StubApi::new();
    let runtime = start(&api)?;

    runtime.edits().set_quantity(DocumentType::Receiving, LineId::from("L1"), 3);
    runtime.edits().set_quantity(DocumentType::Receiving, LineId::from("L1"), 7);
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(runtime.edits().len(), 1);
    assert!(runtime.engine().lock().pending_items()?.is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(runtime.edits().is_empty());
    let pending = runtime.engine().lock().pending_items()?;
    assert_eq!(pending.len(), 1, "coalesced edits produce one queue item");

    runtime.edits().set_quantity(DocumentType::Receiving, LineId::from("L2"), 10);
    assert_eq!(runtime.autosave().before_navigation().await, Some(1));
    assert_eq!(runtime.engine().lock().pending_items()?.len(), 2);

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_outstanding_edits() -> Result<(), Box<dyn std::error::Error>> {
    let api = StubApi::new();
    let runtime = start(&api)?;
    let engine = Arc::clone(runtime.engine());

    runtime.edits().set_quantity(DocumentType::Receiving, LineId::from("L2"), 5);
    runtime.shutdown().await;

    let pending = engine.lock().pending_items()?;
    assert_eq!(pending.len(), 1);
    let lines = engine
        .lock()
        .lines(DocumentType::Receiving, &DocumentId::from("RC-1"))?;
    assert!(lines.iter().any(|l| l.id == LineId::from("L2") && l.quantity_fact == 5));

    // Timers are gone: nothing else happens with time.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(api.calls().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn offline_drain_records_failure_and_retries_next_tick() -> Result<(), Box<dyn std::error::Error>> {
    let api = StubApi::new();
    api.set_offline(true);
    let runtime = start(&api)?;

    runtime
        .engine()
        .lock()
        .record_scan(DocumentType::Receiving, &LineId::from("L1"), 2)?;
    runtime.monitor().set_online(true);
    settle().await;
    assert_eq!(runtime.engine().lock().pending_items()?[0].retries, 1);

    api.set_offline(false);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(runtime.engine().lock().pending_items()?.is_empty());
    assert!(matches!(api.writes().last(), Some(ApiCall::UpdateItem(..))));

    runtime.shutdown().await;
    Ok(())
}

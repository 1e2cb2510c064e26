use std::sync::Arc;

use floorsync_core::{ids::*, model::DocumentType};
use floorsync_engine::IngestOutcome;
use floorsync_harness::{ApiCall, StubApi, TestDevice};
use floorsync_storage::Storage;
use floorsync_sync::{DrainProgress, DrainReport, RefreshReport, RemoteDocument, RemoteLine};

fn remote_line(id: &str, declared: u32, current: u32) -> RemoteLine {
    RemoteLine {
        id: LineId::from(id),
        product_id: ProductId::from(format!("P-{id}")),
        product_name: format!("Product {id}"),
        barcode: String::new(),
        declared_quantity: declared,
        current_quantity: current,
        cell_id: None,
    }
}

fn remote_doc(id: &str, priority: &str, lines: Vec<RemoteLine>) -> RemoteDocument {
    RemoteDocument {
        id: DocumentId::from(id),
        priority: Some(priority.to_string()),
        lines,
    }
}

// ============================================================================
// Drains
// ============================================================================

#[tokio::test]
async fn drain_delivers_in_enqueue_order() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let api = StubApi::new();
    let orchestrator = device.orchestrator(api.clone());

    device.accept(DocumentType::Receiving, "RC-1", None, &[3, 3])?;
    let expected: Vec<ApiCall> = {
        let mut engine = device.engine();
        let a = engine.record_scan(DocumentType::Receiving, &LineId::from("RC-1-L1"), 1)?;
        let b = engine.record_scan(DocumentType::Receiving, &LineId::from("RC-1-L2"), 3)?;
        let c = engine.record_scan(DocumentType::Receiving, &LineId::from("RC-1-L1"), 2)?;
        engine.complete_document(DocumentType::Receiving, &DocumentId::from("RC-1"))?;
        [a, b, c]
            .into_iter()
            .map(|u| {
                ApiCall::UpdateItem(
                    u.line.id.clone(),
                    floorsync_sync::ItemUpdate {
                        current_quantity: u.line.quantity_fact,
                        cell_id: None,
                        reason_code: None,
                    },
                )
            })
            .chain([ApiCall::Finish(DocumentType::Receiving, DocumentId::from("RC-1"))])
            .collect()
    };

    let report = orchestrator.drain().await?;
    assert_eq!(
        report,
        Some(DrainReport {
            delivered: 4,
            failed: 0
        })
    );
    assert_eq!(api.writes(), expected);
    assert!(device.engine().pending_items()?.is_empty());
    assert_eq!(device.engine().prune_delivered()?, 4);

    // Nothing left: a second drain is a no-op.
    assert_eq!(orchestrator.drain().await?, Some(DrainReport::default()));
    assert_eq!(api.writes().len(), 4);

    Ok(())
}

#[tokio::test]
async fn failing_item_does_not_block_the_rest() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let api = StubApi::new();
    api.reject_line("SH-1-L1");
    let orchestrator = device.orchestrator(api.clone());

    device.accept(DocumentType::Shipment, "SH-1", None, &[2, 2])?;
    device
        .engine()
        .record_scan(DocumentType::Shipment, &LineId::from("SH-1-L1"), 5)?;
    device
        .engine()
        .record_scan(DocumentType::Shipment, &LineId::from("SH-1-L2"), 2)?;

    let report = orchestrator.drain().await?.ok_or("drain skipped")?;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);

    let pending = device.engine().pending_items()?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retries, 1);
    let error = pending[0].last_error.clone().unwrap_or_default();
    assert!(error.contains("422"), "status kept in last_error: {error}");

    let stats = device.engine().queue_stats()?;
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.oldest_error.as_deref(), Some(error.as_str()));

    Ok(())
}

#[tokio::test]
async fn retry_ceiling_keeps_item_but_skips_it() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::with_max_retries(3)?;
    let api = StubApi::new();
    api.set_offline(true);
    let orchestrator = device.orchestrator(api.clone());

    device.accept(DocumentType::Picking, "PK-1", None, &[1])?;
    device
        .engine()
        .complete_document(DocumentType::Picking, &DocumentId::from("PK-1"))?;

    for attempt in 1..=3 {
        let report = orchestrator.drain().await?.ok_or("drain skipped")?;
        assert_eq!(report.failed, 1, "attempt {attempt}");
    }
    assert_eq!(orchestrator.drain().await?, Some(DrainReport::default()));
    assert_eq!(orchestrator.sync_now().await, None);
    assert_eq!(api.writes().len(), 3);

    let pending = device.engine().pending_items()?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retries, 3);
    assert!(device.engine().dequeue_all()?.is_empty());
    assert_eq!(device.engine().queue_stats()?.stuck, 1);

    // Manual resolution once the server is back.
    api.set_offline(false);
    device.engine().requeue(pending[0].id)?;
    let report = orchestrator.drain().await?.ok_or("drain skipped")?;
    assert_eq!(report.delivered, 1);
    assert!(device.engine().pending_items()?.is_empty());

    Ok(())
}

#[tokio::test]
async fn only_one_drain_at_a_time() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let api = StubApi::gated();
    let orchestrator = Arc::new(device.orchestrator(api.clone()));

    device.accept(DocumentType::Inventory, "INV-1", None, &[5, 5, 5])?;
    for n in 1..=3 {
        device
            .engine()
            .record_scan(DocumentType::Inventory, &LineId::from(format!("INV-1-L{n}")), 1)?;
    }

    let mut progress = orchestrator.subscribe_progress();
    let running = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.drain().await }
    });
    while !orchestrator.is_draining() {
        tokio::task::yield_now().await;
    }

    assert_eq!(orchestrator.drain().await?, None);

    api.release(1);
    let seen = *progress
        .wait_for(|p| p.completed == 1)
        .await?;
    assert_eq!(seen, DrainProgress { completed: 1, total: 3 });
    assert!((seen.fraction() - 1.0 / 3.0).abs() < f64::EPSILON);

    api.release(2);
    let report = running.await??;
    assert_eq!(report.map(|r| r.delivered), Some(3));
    assert!(!orchestrator.is_draining());
    assert_eq!(progress.borrow().fraction(), 1.0);

    Ok(())
}

#[tokio::test]
async fn item_discarded_mid_drain_does_not_abort_it() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let api = StubApi::gated();
    api.reject_line("INV-2-L1");
    let orchestrator = Arc::new(device.orchestrator(api.clone()));

    device.accept(DocumentType::Inventory, "INV-2", None, &[5, 5, 5])?;
    for n in 1..=3 {
        device
            .engine()
            .record_scan(DocumentType::Inventory, &LineId::from(format!("INV-2-L{n}")), 1)?;
    }
    let first = device.engine().pending_items()?[0].id;

    let running = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.drain().await }
    });
    while !orchestrator.is_draining() {
        tokio::task::yield_now().await;
    }
    // The operator drops the first item while the drain holds its snapshot.
    assert!(device.engine().discard(first)?);

    api.release(3);
    let report = running.await??.ok_or("drain skipped")?;
    assert_eq!(
        report,
        DrainReport {
            delivered: 2,
            failed: 1
        }
    );
    assert_eq!(api.writes().len(), 3);
    assert!(device.engine().pending_items()?.is_empty());

    Ok(())
}

// ============================================================================
// Pulls
// ============================================================================

#[tokio::test]
async fn refresh_never_overrides_local_edits() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let api = StubApi::new();
    let orchestrator = device.orchestrator(api.clone());
    let doc_id = DocumentId::from("RC-7");
    let line_id = LineId::from("RC-7-L1");

    api.serve(
        DocumentType::Receiving,
        remote_doc("RC-7", "high", vec![remote_line("RC-7-L1", 10, 0), remote_line("RC-7-L2", 4, 0)]),
    );
    let report = orchestrator.refresh(DocumentType::Receiving).await?;
    assert_eq!(report.created, 1);
    assert_eq!(device.engine().document(DocumentType::Receiving, &doc_id)?.total_lines, 2);
    assert!(device.engine().pending_items()?.is_empty());

    // Local scan pending; server copy changes underneath.
    device.engine().record_scan(DocumentType::Receiving, &line_id, 6)?;
    api.serve(
        DocumentType::Receiving,
        remote_doc("RC-7", "high", vec![remote_line("RC-7-L1", 12, 1), remote_line("RC-7-L2", 4, 0)]),
    );
    let report = orchestrator.refresh(DocumentType::Receiving).await?;
    assert_eq!(report.kept, 1);
    let local = device
        .engine()
        .storage()
        .get_line(DocumentType::Receiving, &line_id)?
        .ok_or("line missing")?;
    assert_eq!((local.quantity_plan, local.quantity_fact), (10, 6));

    // After delivery the server copy is accepted, plan excepted.
    orchestrator.drain().await?;
    let report = orchestrator.refresh(DocumentType::Receiving).await?;
    assert_eq!(report.updated, 1);
    let local = device
        .engine()
        .storage()
        .get_line(DocumentType::Receiving, &line_id)?
        .ok_or("line missing")?;
    assert_eq!((local.quantity_plan, local.quantity_fact), (10, 1));

    Ok(())
}

#[tokio::test]
async fn refresh_ignores_copy_fetched_before_delivery() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let api = StubApi::gated_reads();
    let orchestrator = Arc::new(device.orchestrator(api.clone()));
    let line_id = LineId::from("RC-8-L1");

    api.serve(
        DocumentType::Receiving,
        remote_doc("RC-8", "high", vec![remote_line("RC-8-L1", 10, 0)]),
    );
    api.release_reads(1);
    assert_eq!(orchestrator.refresh(DocumentType::Receiving).await?.created, 1);
    device.engine().record_scan(DocumentType::Receiving, &line_id, 6)?;

    // The server copy is requested while the scan is still queued...
    let refreshing = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.refresh(DocumentType::Receiving).await }
    });
    let fetches = |api: &StubApi| {
        api.calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::GetDocument(..)))
            .count()
    };
    while fetches(&*api) < 2 {
        tokio::task::yield_now().await;
    }

    // ...and the scan is delivered before that copy arrives.
    let report = orchestrator.drain().await?.ok_or("drain skipped")?;
    assert_eq!(report.delivered, 1);
    api.release_reads(1);
    let report = refreshing.await??;
    assert_eq!(
        report,
        RefreshReport {
            kept: 1,
            ..RefreshReport::default()
        }
    );
    let local = device
        .engine()
        .storage()
        .get_line(DocumentType::Receiving, &line_id)?
        .ok_or("line missing")?;
    assert_eq!(local.quantity_fact, 6);

    // The next refresh sees the delivered value.
    api.serve(
        DocumentType::Receiving,
        remote_doc("RC-8", "high", vec![remote_line("RC-8-L1", 10, 6)]),
    );
    api.release_reads(1);
    assert_eq!(orchestrator.refresh(DocumentType::Receiving).await?.updated, 1);
    let local = device
        .engine()
        .storage()
        .get_line(DocumentType::Receiving, &line_id)?
        .ok_or("line missing")?;
    assert_eq!(local.quantity_fact, 6);

    Ok(())
}

#[tokio::test]
async fn one_broken_document_does_not_stop_refresh() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let api = StubApi::new();
    let orchestrator = device.orchestrator(api.clone());

    for id in ["SH-1", "SH-2", "SH-3"] {
        api.serve(
            DocumentType::Shipment,
            remote_doc(id, "normal", vec![remote_line(&format!("{id}-L1"), 2, 0)]),
        );
    }
    api.break_document(DocumentType::Shipment, "SH-2");

    let report = orchestrator.refresh(DocumentType::Shipment).await?;
    assert_eq!(
        report,
        RefreshReport {
            created: 2,
            failed: 1,
            ..RefreshReport::default()
        }
    );
    let ids: Vec<String> = device
        .engine()
        .documents(DocumentType::Shipment)?
        .into_iter()
        .map(|d| d.id.into_string())
        .collect();
    assert_eq!(ids, vec!["SH-1", "SH-3"]);

    Ok(())
}

#[test]
fn completed_documents_are_not_refreshed() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let doc_id = DocumentId::from("PL-3");
    device.accept(DocumentType::Placement, "PL-3", None, &[2])?;
    device.engine().complete_document(DocumentType::Placement, &doc_id)?;
    let finish = device.engine().pending_items()?[0].id;
    device.engine().mark_delivered(finish)?;

    let marker = device.engine().fetch_marker(DocumentType::Placement, &doc_id)?;
    let outcome = device.engine().ingest_remote_document(
        DocumentType::Placement,
        doc_id.clone(),
        None,
        vec![remote_line("PL-3-L1", 2, 2).into()],
        marker,
    )?;
    assert_eq!(outcome, IngestOutcome::KeptCompleted);

    Ok(())
}

#[tokio::test]
async fn document_types_come_from_the_server() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let api = StubApi::new();
    let orchestrator = device.orchestrator(api.clone());

    let types = orchestrator.fetch_document_types().await?;
    let handled: Vec<_> = types.iter().filter_map(|t| t.document_type()).collect();
    assert_eq!(handled, DocumentType::ALL.to_vec());
    assert_eq!(api.calls(), vec![ApiCall::DocumentTypes]);

    Ok(())
}

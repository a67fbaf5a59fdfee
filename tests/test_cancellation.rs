mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use livetext::{AnalysisError, DetectorKind, RunPhase};

#[tokio::test(flavor = "multi_thread")]
async fn test_newer_request_supersedes_running_one() -> anyhow::Result<()> {
    let (gated, gate) = GatedDetector::new(DetectorKind::TEXT, "stale text");
    let analyzer = Arc::new(analyzer_with(vec![
        gated,
        Arc::new(StubDetector::barcode(&["fresh barcode"])),
    ]));

    let first = tokio::spawn({
        let analyzer = analyzer.clone();
        async move { analyzer.request_analysis(png_bytes(16, 16), DetectorKind::TEXT).await }
    });
    let release = gate.wait_entered().await?;

    let second = analyzer
        .request_analysis(png_bytes(16, 16), DetectorKind::BARCODE)
        .await?;
    assert_eq!(texts(&second.results), vec!["fresh barcode"]);

    let first = first.await?;
    assert!(matches!(first, Err(AnalysisError::Superseded(_))));

    // Let the orphaned detection finish; its output must stay unpublished
    release.send(())?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let visible = analyzer.snapshot().expect("second run published");
    assert_eq!(visible.run_id, second.run_id);
    assert_eq!(texts(&visible.results), vec!["fresh barcode"]);
    assert_eq!(analyzer.phase(), RunPhase::Published);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_superseded_caller_is_not_blocked_by_engine() -> anyhow::Result<()> {
    let (gated, gate) = GatedDetector::new(DetectorKind::TEXT, "slow");
    let analyzer = Arc::new(analyzer_with(vec![gated]));

    let first = tokio::spawn({
        let analyzer = analyzer.clone();
        async move { analyzer.analyze(png_bytes(16, 16)).await }
    });
    let release = gate.wait_entered().await?;

    // Same kind while the old call is still inside the engine: the
    // single-flight guard hands the new run an empty result right away
    let second = tokio::time::timeout(
        Duration::from_secs(2),
        analyzer.request_analysis(png_bytes(16, 16), DetectorKind::TEXT),
    )
    .await??;
    assert!(second.results.is_empty());

    let first = tokio::time::timeout(Duration::from_secs(2), first).await??;
    assert!(matches!(first, Err(AnalysisError::Superseded(_))));

    release.send(())?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_explicit_cancel() -> anyhow::Result<()> {
    let (gated, gate) = GatedDetector::new(DetectorKind::TEXT, "cancelled text");
    let analyzer = Arc::new(analyzer_with(vec![gated]));

    let run = tokio::spawn({
        let analyzer = analyzer.clone();
        async move { analyzer.analyze(png_bytes(16, 16)).await }
    });
    let release = gate.wait_entered().await?;

    assert!(analyzer.cancel());
    let outcome = run.await?;
    assert!(matches!(outcome, Err(AnalysisError::Cancelled(_))));
    assert_eq!(analyzer.phase(), RunPhase::Idle);
    assert!(!analyzer.cancel());

    release.send(())?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(analyzer.snapshot().is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_same_kind_calls_single_flight() -> anyhow::Result<()> {
    let (gated, gate) = GatedDetector::new(DetectorKind::BARCODE, "only once");
    let registry = livetext::DetectorRegistry::new().with_detector(gated);
    let guarded = registry.get(DetectorKind::BARCODE).expect("registered");

    let image = Arc::new(image::DynamicImage::new_rgb8(4, 4));
    let first = tokio::task::spawn_blocking({
        let guarded = guarded.clone();
        let image = image.clone();
        move || guarded.observe(&image)
    });
    let release = gate.wait_entered().await?;

    let second = guarded.observe(&image)?;
    assert!(second.is_empty());

    release.send(())?;
    let first = first.await??;
    assert_eq!(texts(&first), vec!["only once"]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_caller_timeout_releases_the_run() -> anyhow::Result<()> {
    let (gated, gate) = GatedDetector::new(DetectorKind::TEXT, "too slow");
    let analyzer = Arc::new(analyzer_with(vec![gated]));

    let pending = tokio::spawn({
        let analyzer = analyzer.clone();
        async move { tokio::time::timeout(Duration::from_millis(200), analyzer.analyze(png_bytes(16, 16))).await }
    });
    let release = gate.wait_entered().await?;

    assert!(pending.await?.is_err(), "caller gave up before the engine returned");
    assert_eq!(analyzer.phase(), RunPhase::Idle);
    assert!(!analyzer.cancel());

    release.send(())?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(analyzer.snapshot().is_none());
    assert_eq!(analyzer.phase(), RunPhase::Idle);

    Ok(())
}

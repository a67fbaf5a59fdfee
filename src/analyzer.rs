//! Two-stage analysis runs: detection fan-out, then per-result extraction.
//!
//! At most one run is current. A new request cancels the current run's token
//! and takes its place; the replaced run's caller gets
//! [`AnalysisError::Superseded`] and nothing it produced is published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::LivetextConfig;
use crate::detection::DetectorRegistry;
use crate::error::{AnalysisError, EngineError, Result};
use crate::extraction::{EntityExtractor, PatternExtractor};
use crate::models::{AnalysisSnapshot, DetectorKind, ImageInput, ObservationResult, RunPhase};
use crate::pipeline::{StageError, fan_out};

/// Handle on one run, shared between the requester and the current-run slot
#[derive(Clone)]
struct ActiveRun {
    id: Uuid,
    token: CancellationToken,
    superseded: Arc<AtomicBool>,
}

impl ActiveRun {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            superseded: Arc::new(AtomicBool::new(false)),
        }
    }

    fn stop(&self, superseded: bool) {
        self.superseded.store(superseded, Ordering::Release);
        self.token.cancel();
    }

    fn cancellation_error(&self) -> AnalysisError {
        if self.superseded.load(Ordering::Acquire) {
            AnalysisError::Superseded(self.id)
        } else {
            AnalysisError::Cancelled(self.id)
        }
    }

    fn stage_error(&self, e: StageError) -> AnalysisError {
        match e {
            StageError::Cancelled => self.cancellation_error(),
            StageError::Engine(e) => AnalysisError::Engine(e),
        }
    }
}

pub struct Analyzer {
    registry: DetectorRegistry,
    extractor: Arc<dyn EntityExtractor>,
    detectors: Mutex<DetectorKind>,
    current: Mutex<Option<ActiveRun>>,
    phase: watch::Sender<RunPhase>,
    snapshot: watch::Sender<Option<Arc<AnalysisSnapshot>>>,
}

impl Analyzer {
    pub fn new(registry: DetectorRegistry, extractor: Arc<dyn EntityExtractor>) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        let (snapshot, _) = watch::channel(None);
        Self {
            registry,
            extractor,
            detectors: Mutex::new(DetectorKind::default()),
            current: Mutex::new(None),
            phase,
            snapshot,
        }
    }

    /// OCR and barcode detectors plus the pattern extractor, as configured
    pub fn from_config(config: &LivetextConfig) -> Self {
        Self::new(
            DetectorRegistry::from_config(config),
            Arc::new(PatternExtractor::new(&config.extractor)),
        )
        .with_detectors(config.detectors)
    }

    pub fn with_detectors(self, kinds: DetectorKind) -> Self {
        self.set_detectors(kinds);
        self
    }

    /// Detectors used by [`Self::analyze`]
    pub fn detectors(&self) -> DetectorKind {
        *lock(&self.detectors)
    }

    pub fn set_detectors(&self, kinds: DetectorKind) {
        *lock(&self.detectors) = kinds;
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Last published snapshot. A failed run leaves it untouched.
    pub fn snapshot(&self) -> Option<Arc<AnalysisSnapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<AnalysisSnapshot>>> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// Run the configured detectors over `input`
    pub async fn analyze(&self, input: impl Into<ImageInput>) -> Result<Arc<AnalysisSnapshot>> {
        self.request_analysis(input, self.detectors()).await
    }

    /// Start a run over `input` with the given detectors, replacing any run
    /// still in flight, and wait for it to publish or fail.
    pub async fn request_analysis(
        &self,
        input: impl Into<ImageInput>,
        kinds: DetectorKind,
    ) -> Result<Arc<AnalysisSnapshot>> {
        let run = self.begin_run();
        let _abandon = AbandonOnDrop { analyzer: self, run: &run };
        let span = info_span!("analysis", run_id = %run.id, detectors = %kinds);

        let outcome = self.execute(&run, input.into(), kinds).instrument(span.clone()).await;
        span.in_scope(|| self.finish(&run, kinds, outcome))
    }

    /// Cancel the current run without starting another. Returns whether a
    /// run was in flight.
    pub fn cancel(&self) -> bool {
        let mut current = lock(&self.current);
        match current.take() {
            Some(run) => {
                run.stop(false);
                self.phase.send_replace(RunPhase::Idle);
                info!(run_id = %run.id, "analysis cancelled");
                true
            }
            None => false,
        }
    }

    fn begin_run(&self) -> ActiveRun {
        let run = ActiveRun::new();
        let mut current = lock(&self.current);
        if let Some(previous) = current.replace(run.clone()) {
            previous.stop(true);
            warn!(run_id = %previous.id, superseded_by = %run.id, "superseding in-flight analysis");
        }
        self.phase.send_replace(RunPhase::Detecting);
        run
    }

    fn enter_phase(&self, run: &ActiveRun, phase: RunPhase) {
        let current = lock(&self.current);
        if current.as_ref().is_some_and(|active| active.id == run.id) {
            self.phase.send_replace(phase);
        }
    }

    async fn execute(&self, run: &ActiveRun, input: ImageInput, kinds: DetectorKind) -> Result<Vec<ObservationResult>> {
        info!(input = ?input, "analysis started");

        let decode = tokio::task::spawn_blocking(move || input.decode());
        let image = tokio::select! {
            biased;
            _ = run.token.cancelled() => return Err(run.cancellation_error()),
            decoded = decode => decoded.map_err(|e| AnalysisError::ImageDecode(e.to_string()))??,
        };
        let image = Arc::new(image);

        let mut jobs = Vec::new();
        for kind in kinds.iter() {
            let detector = self
                .registry
                .get(kind)
                .ok_or_else(|| EngineError::unavailable(kind.name(), "no detector registered"))?;
            let image = image.clone();
            jobs.push(move || detector.observe(&image));
        }

        let detected: Vec<ObservationResult> = fan_out("detect", jobs, &run.token)
            .await
            .map_err(|e| run.stage_error(e))?
            .into_iter()
            .flatten()
            .collect();
        debug!(results = detected.len(), "detection stage complete");

        self.enter_phase(run, RunPhase::Extracting);
        let jobs: Vec<_> = detected
            .into_iter()
            .map(|result| {
                let extractor = self.extractor.clone();
                move || -> std::result::Result<ObservationResult, EngineError> {
                    let entities = extractor.extract(&result.text)?;
                    Ok(result.with_entities(entities))
                }
            })
            .collect();

        let enriched = fan_out("extract", jobs, &run.token)
            .await
            .map_err(|e| run.stage_error(e))?;
        debug!(
            entities = enriched.iter().map(|r| r.entities.len()).sum::<usize>(),
            "extraction stage complete"
        );
        Ok(enriched)
    }

    /// Publish or surface the outcome, but only while `run` is still current
    fn finish(
        &self,
        run: &ActiveRun,
        kinds: DetectorKind,
        outcome: Result<Vec<ObservationResult>>,
    ) -> Result<Arc<AnalysisSnapshot>> {
        let mut current = lock(&self.current);
        if !current.as_ref().is_some_and(|active| active.id == run.id) {
            let e = run.cancellation_error();
            debug!(error = %e, "discarding output of stale run");
            return Err(e);
        }
        *current = None;

        match outcome {
            Ok(results) => {
                let snapshot = Arc::new(AnalysisSnapshot {
                    run_id: run.id,
                    detectors: kinds,
                    results,
                    published_at: OffsetDateTime::now_utc(),
                });
                self.snapshot.send_replace(Some(snapshot.clone()));
                self.phase.send_replace(RunPhase::Published);
                info!(results = snapshot.results.len(), "analysis published");
                Ok(snapshot)
            }
            Err(e) => {
                self.phase.send_replace(RunPhase::Failed);
                error!(error = %e, "analysis failed");
                Err(e)
            }
        }
    }
}

/// Releases the current-run slot when a request future is dropped before
/// `finish` runs, e.g. under a caller's timeout.
struct AbandonOnDrop<'a> {
    analyzer: &'a Analyzer,
    run: &'a ActiveRun,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        let mut current = lock(&self.analyzer.current);
        if current.as_ref().is_some_and(|active| active.id == self.run.id) {
            *current = None;
            self.run.stop(false);
            self.analyzer.phase.send_replace(RunPhase::Idle);
            warn!(run_id = %self.run.id, "analysis abandoned by caller");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_analyzer() -> Analyzer {
        Analyzer::new(DetectorRegistry::new(), Arc::new(PatternExtractor::default()))
    }

    #[test]
    fn test_initial_state() {
        let analyzer = empty_analyzer();
        assert_eq!(analyzer.phase(), RunPhase::Idle);
        assert!(analyzer.snapshot().is_none());
        assert_eq!(analyzer.detectors(), DetectorKind::TEXT);
        assert!(!analyzer.cancel());
    }

    #[test]
    fn test_set_detectors() {
        let analyzer = empty_analyzer().with_detectors(DetectorKind::ALL);
        assert_eq!(analyzer.detectors(), DetectorKind::ALL);
        analyzer.set_detectors(DetectorKind::BARCODE);
        assert_eq!(analyzer.detectors(), DetectorKind::BARCODE);
    }

    #[tokio::test]
    async fn test_no_detectors_publishes_empty_snapshot() {
        let analyzer = empty_analyzer();
        let image = image::DynamicImage::new_rgb8(4, 4);
        let snapshot = analyzer.request_analysis(image, DetectorKind::NONE).await.unwrap();
        assert!(snapshot.results.is_empty());
        assert_eq!(analyzer.phase(), RunPhase::Published);
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_unavailable() {
        let analyzer = empty_analyzer();
        let image = image::DynamicImage::new_rgb8(4, 4);
        let err = analyzer.request_analysis(image, DetectorKind::TEXT).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Engine(EngineError::Unavailable { .. })));
        assert_eq!(analyzer.phase(), RunPhase::Failed);
        assert!(analyzer.snapshot().is_none());
    }
}

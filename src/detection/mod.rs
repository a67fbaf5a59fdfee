pub mod barcode;
pub mod ocr;
pub mod preprocessing;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;
use tracing::debug;

pub use barcode::BarcodeDetector;
pub use ocr::TextDetector;

use crate::config::LivetextConfig;
use crate::error::EngineError;
use crate::geometry::BoundingQuad;
use crate::models::{DetectorKind, ObservationResult};

/// One region reported by an engine, before blank payloads are filtered
#[derive(Debug, Clone, PartialEq)]
pub struct RawRegion {
    pub payload: Option<String>,
    pub quad: BoundingQuad,
}

impl RawRegion {
    pub fn new(payload: Option<String>, quad: BoundingQuad) -> Self {
        Self { payload, quad }
    }
}

/// Engine locating regions of a single kind in an image.
///
/// Calls are synchronous and may be CPU heavy; the analyzer runs them on the
/// blocking pool.
pub trait RegionDetector: Send + Sync {
    /// The single kind this engine detects
    fn kind(&self) -> DetectorKind;

    /// Human-readable name for this engine (used in logs and errors)
    fn name(&self) -> &str;

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawRegion>, EngineError>;
}

/// Releases the in-flight flag when dropped, including on panic
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight wrapper around a detector.
///
/// A call that overlaps an in-progress call on the same instance returns an
/// empty result immediately. Its output is dropped rather than queued.
pub struct GuardedDetector {
    detector: Arc<dyn RegionDetector>,
    in_flight: AtomicBool,
}

impl GuardedDetector {
    pub fn new(detector: Arc<dyn RegionDetector>) -> Self {
        Self {
            detector,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> DetectorKind {
        self.detector.kind()
    }

    pub fn name(&self) -> &str {
        self.detector.name()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run the detector and keep the regions with a non-blank payload
    pub fn observe(&self, image: &DynamicImage) -> Result<Vec<ObservationResult>, EngineError> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            debug!(detector = self.name(), "detector busy, skipping call");
            return Ok(Vec::new());
        };

        let regions = self.detector.detect(image)?;
        let found = regions.len();
        let results: Vec<ObservationResult> = regions
            .into_iter()
            .filter_map(|region| ObservationResult::from_payload(region.payload, region.quad))
            .collect();

        debug!(
            detector = self.name(),
            found,
            kept = results.len(),
            "detector finished"
        );
        Ok(results)
    }
}

/// Detectors available to an analyzer, at most one per kind
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<GuardedDetector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text and barcode detectors built from configuration
    pub fn from_config(config: &LivetextConfig) -> Self {
        Self::new()
            .with_detector(Arc::new(BarcodeDetector::new(config.barcode.clone())))
            .with_detector(Arc::new(TextDetector::new(config.ocr.clone())))
    }

    /// Add a detector, replacing any registered for the same kind
    pub fn register(&mut self, detector: Arc<dyn RegionDetector>) {
        let kind = detector.kind();
        self.detectors.retain(|existing| existing.kind() != kind);
        self.detectors.push(Arc::new(GuardedDetector::new(detector)));
    }

    pub fn with_detector(mut self, detector: Arc<dyn RegionDetector>) -> Self {
        self.register(detector);
        self
    }

    pub fn get(&self, kind: DetectorKind) -> Option<Arc<GuardedDetector>> {
        self.detectors.iter().find(|d| d.kind() == kind).cloned()
    }

    /// Union of the registered kinds
    pub fn kinds(&self) -> DetectorKind {
        self.detectors
            .iter()
            .fold(DetectorKind::NONE, |kinds, d| kinds | d.kind())
    }
}

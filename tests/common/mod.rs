mod fixtures;
pub use fixtures::*;

use std::sync::Arc;

use livetext::{Analyzer, DetectorRegistry, ObservationResult, PatternExtractor, RegionDetector};

/// Analyzer over the given detectors and the default pattern extractor
pub fn analyzer_with(detectors: Vec<Arc<dyn RegionDetector>>) -> Analyzer {
    let registry = detectors
        .into_iter()
        .fold(DetectorRegistry::new(), |registry, detector| registry.with_detector(detector));
    Analyzer::new(registry, Arc::new(PatternExtractor::default()))
}

pub fn texts(results: &[ObservationResult]) -> Vec<&str> {
    results.iter().map(|r| r.text.as_str()).collect()
}

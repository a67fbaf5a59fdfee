pub mod analyzer;
pub mod config;
pub mod detection;
pub mod error;
pub mod extraction;
pub mod geometry;
pub mod models;
pub mod pipeline;

pub use analyzer::Analyzer;
pub use config::LivetextConfig;
pub use detection::{BarcodeDetector, DetectorRegistry, RawRegion, RegionDetector, TextDetector};
pub use error::{AnalysisError, ConfigurationError, EngineError};
pub use extraction::{EntityCategories, EntityExtractor, ExtractedEntity, PatternExtractor};
pub use geometry::{BoundingQuad, NormalizedPoint, Origin, PixelPoint, ViewSize};
pub use models::{AnalysisSnapshot, DetectorKind, ImageInput, ObservationResult, RunPhase};

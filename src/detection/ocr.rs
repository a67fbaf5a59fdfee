use std::sync::{Arc, Mutex, PoisonError};

use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use tracing::{debug, info};

use super::RawRegion;
use crate::config::OcrConfig;
use crate::error::EngineError;
use crate::geometry::{BoundingQuad, PixelPoint, ViewSize};
use crate::models::DetectorKind;

const ENGINE: &str = "text detector";

/// Initialize OCR engine with models from the configured directory
pub fn init_ocr_engine(config: &OcrConfig) -> Result<OcrEngine, EngineError> {
    let detection_model_path = config.detection_model_path();
    let recognition_model_path = config.recognition_model_path();

    if !detection_model_path.exists() || !recognition_model_path.exists() {
        return Err(EngineError::unavailable(
            ENGINE,
            format!(
                "OCR models not found. Expected locations: {} and {}",
                detection_model_path.display(),
                recognition_model_path.display()
            ),
        ));
    }

    let detection_model =
        Model::load_file(&detection_model_path).map_err(|e| EngineError::unavailable(ENGINE, e))?;
    let recognition_model =
        Model::load_file(&recognition_model_path).map_err(|e| EngineError::unavailable(ENGINE, e))?;

    OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })
    .map_err(|e| EngineError::unavailable(ENGINE, e))
}

/// Text line detector backed by `ocrs`
pub struct TextDetector {
    config: OcrConfig,
    // Lazy-initialized on first use; the Arc lets callers release the lock
    // before running recognition
    engine: Mutex<Option<Arc<OcrEngine>>>,
}

impl TextDetector {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            config,
            engine: Mutex::new(None),
        }
    }

    fn engine(&self) -> Result<Arc<OcrEngine>, EngineError> {
        let mut engine_guard = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = engine_guard.as_ref() {
            return Ok(engine.clone());
        }

        info!(model_dir = %self.config.model_dir.display(), "Initializing OCR engine");
        let engine = Arc::new(init_ocr_engine(&self.config)?);
        *engine_guard = Some(engine.clone());
        Ok(engine)
    }
}

impl super::RegionDetector for TextDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::TEXT
    }

    fn name(&self) -> &str {
        ENGINE
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawRegion>, EngineError> {
        let engine = self.engine()?;
        let failed = |e: &dyn std::fmt::Display| EngineError::failed(ENGINE, e);

        let img = image.to_rgb8();
        let view = ViewSize::from_dimensions(img.dimensions());

        let img_source = ImageSource::from_bytes(img.as_raw(), img.dimensions()).map_err(|e| failed(&e))?;
        let ocr_input = engine.prepare_input(img_source).map_err(|e| failed(&e))?;

        let words = engine.detect_words(&ocr_input).map_err(|e| failed(&e))?;
        let lines = engine.find_text_lines(&ocr_input, &words);
        let recognized = engine.recognize_text(&ocr_input, &lines).map_err(|e| failed(&e))?;
        debug!(words = words.len(), lines = lines.len(), "OCR pass complete");

        let regions = recognized
            .into_iter()
            .flatten()
            .map(|line| {
                let corners = line
                    .rotated_rect()
                    .corners()
                    .map(|corner| PixelPoint::new(corner.x as f64, corner.y as f64));
                RawRegion::new(Some(line.to_string()), BoundingQuad::from_pixel_corners(corners, view))
            })
            .collect();

        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::RegionDetector;

    #[test]
    fn test_missing_models_are_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let detector = TextDetector::new(OcrConfig {
            model_dir: dir.path().to_path_buf(),
            ..OcrConfig::default()
        });

        let err = detector.detect(&DynamicImage::new_rgb8(16, 16)).unwrap_err();
        assert!(matches!(err, EngineError::Unavailable { .. }));
        assert!(err.to_string().contains("text-detection.rten"));
    }
}

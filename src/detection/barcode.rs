use image::{DynamicImage, GrayImage};
use rxing::{Point, RXingResult};
use tracing::{debug, trace};

use super::{RawRegion, preprocessing};
use crate::config::BarcodeConfig;
use crate::error::EngineError;
use crate::geometry::{BoundingQuad, ViewSize};
use crate::models::DetectorKind;

const ENGINE: &str = "barcode detector";

/// Multi-symbology barcode detector backed by `rxing`: QR, Data Matrix,
/// Aztec, PDF417, MaxiCode and the 1D families (EAN, UPC, Code 39/93/128,
/// ITF, Codabar, RSS).
pub struct BarcodeDetector {
    config: BarcodeConfig,
}

impl BarcodeDetector {
    pub fn new(config: BarcodeConfig) -> Self {
        Self { config }
    }

    fn scan(gray: &GrayImage, view: ViewSize) -> Vec<RawRegion> {
        let (width, height) = gray.dimensions();
        match rxing::helpers::detect_multiple_in_luma(gray.as_raw().clone(), width, height) {
            Ok(found) => found.iter().map(|result| to_region(result, view)).collect(),
            Err(e) => {
                // Also the "nothing found" case
                trace!(error = ?e, "no decodable barcode");
                Vec::new()
            }
        }
    }
}

fn to_region(result: &RXingResult, view: ViewSize) -> RawRegion {
    debug!(format = ?result.getBarcodeFormat(), "decoded barcode");
    RawRegion::new(Some(result.getText().to_string()), quad_around(result.getPoints(), view))
}

/// Result points are finder centers for 2D codes and the two ends of the
/// scan line for 1D codes. A flat set is given a quarter of its width as
/// height so the quad still covers the bars.
fn quad_around(points: &[Point], view: ViewSize) -> BoundingQuad {
    if points.is_empty() {
        return BoundingQuad::from_pixel_rect(0.0, 0.0, view.width, view.height, view);
    }

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for point in points {
        min_x = min_x.min(point.x as f64);
        min_y = min_y.min(point.y as f64);
        max_x = max_x.max(point.x as f64);
        max_y = max_y.max(point.y as f64);
    }

    let width = max_x - min_x;
    let mut height = max_y - min_y;
    if height < 1.0 {
        height = (width / 4.0).max(1.0);
        min_y -= height / 2.0;
    }
    BoundingQuad::from_pixel_rect(min_x, min_y, width, height, view)
}

impl Default for BarcodeDetector {
    fn default() -> Self {
        Self::new(BarcodeConfig::default())
    }
}

impl super::RegionDetector for BarcodeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::BARCODE
    }

    fn name(&self) -> &str {
        ENGINE
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawRegion>, EngineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EngineError::failed(ENGINE, "image has no pixels"));
        }

        let gray = preprocessing::to_grayscale(image);
        let view = ViewSize::from_dimensions(gray.dimensions());

        let regions = Self::scan(&gray, view);
        if !regions.is_empty() || !self.config.binarize_fallback {
            return Ok(regions);
        }

        debug!("no barcode in grayscale pass, retrying on binarized image");
        Ok(Self::scan(&preprocessing::binarize(&gray), view))
    }
}

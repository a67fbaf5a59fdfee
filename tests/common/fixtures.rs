use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use livetext::{
    BoundingQuad, DetectorKind, EngineError, EntityExtractor, ExtractedEntity, RawRegion, RegionDetector, ViewSize,
};
use tempfile::NamedTempFile;

/// Creates a 100x100 white test image and returns the temp file.
/// The file will be automatically cleaned up when dropped.
pub fn create_test_image() -> NamedTempFile {
    let img = ImageBuffer::from_fn(100, 100, |_, _| Rgb([255u8, 255u8, 255u8]));
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// PNG encoded bytes of a blank image
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes.into_inner()
}

/// Quad covering a pixel rectangle of a 100x100 image
pub fn quad(x: f64, y: f64, width: f64, height: f64) -> BoundingQuad {
    BoundingQuad::from_pixel_rect(x, y, width, height, ViewSize::new(100.0, 100.0))
}

pub fn region(payload: Option<&str>) -> RawRegion {
    RawRegion::new(payload.map(String::from), quad(10.0, 10.0, 50.0, 10.0))
}

/// Returns a fixed set of regions, optionally after a delay
pub struct StubDetector {
    kind: DetectorKind,
    regions: Vec<RawRegion>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubDetector {
    pub fn new(kind: DetectorKind, payloads: &[Option<&str>]) -> Self {
        Self {
            kind,
            regions: payloads.iter().map(|payload| region(*payload)).collect(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn text(payloads: &[&str]) -> Self {
        Self::new(DetectorKind::TEXT, &payloads.iter().map(|p| Some(*p)).collect::<Vec<_>>())
    }

    pub fn barcode(payloads: &[&str]) -> Self {
        Self::new(DetectorKind::BARCODE, &payloads.iter().map(|p| Some(*p)).collect::<Vec<_>>())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RegionDetector for StubDetector {
    fn kind(&self) -> DetectorKind {
        self.kind
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn detect(&self, _image: &DynamicImage) -> Result<Vec<RawRegion>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(self.regions.clone())
    }
}

/// Blocks inside `detect` until the test releases it.
/// Signals on `entered` once the call has started.
pub struct GatedDetector {
    kind: DetectorKind,
    payload: String,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

pub struct Gate {
    pub entered: mpsc::Receiver<()>,
    pub release: mpsc::Sender<()>,
}

impl Gate {
    /// Wait (off the async runtime) until the gated call has started
    pub async fn wait_entered(self) -> anyhow::Result<mpsc::Sender<()>> {
        let Gate { entered, release } = self;
        tokio::task::spawn_blocking(move || entered.recv_timeout(Duration::from_secs(5))).await??;
        Ok(release)
    }
}

impl GatedDetector {
    pub fn new(kind: DetectorKind, payload: &str) -> (Arc<Self>, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let detector = Arc::new(Self {
            kind,
            payload: payload.to_string(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (
            detector,
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl RegionDetector for GatedDetector {
    fn kind(&self) -> DetectorKind {
        self.kind
    }

    fn name(&self) -> &str {
        "gated"
    }

    fn detect(&self, _image: &DynamicImage) -> Result<Vec<RawRegion>, EngineError> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv_timeout(Duration::from_secs(5));
        Ok(vec![region(Some(&self.payload))])
    }
}

pub struct FailingDetector {
    kind: DetectorKind,
}

impl FailingDetector {
    pub fn new(kind: DetectorKind) -> Self {
        Self { kind }
    }
}

impl RegionDetector for FailingDetector {
    fn kind(&self) -> DetectorKind {
        self.kind
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn detect(&self, _image: &DynamicImage) -> Result<Vec<RawRegion>, EngineError> {
        Err(EngineError::failed("failing", "engine crashed"))
    }
}

pub struct FailingExtractor;

impl EntityExtractor for FailingExtractor {
    fn extract(&self, _text: &str) -> Result<Vec<ExtractedEntity>, EngineError> {
        Err(EngineError::unavailable("failing extractor", "not supported here"))
    }

    fn name(&self) -> &str {
        "failing extractor"
    }
}

use std::fmt;
use std::io::Cursor;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use image::{DynamicImage, ImageReader, RgbaImage};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::extraction::ExtractedEntity;
use crate::geometry::BoundingQuad;

/// Set of region detectors to run over an image.
///
/// Single-bit values name one detector; the set iterates in invocation
/// order (barcode first, then text), which is also the order detector
/// outputs are merged in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DetectorKind(u8);

impl DetectorKind {
    pub const NONE: DetectorKind = DetectorKind(0);
    pub const BARCODE: DetectorKind = DetectorKind(1 << 0);
    pub const TEXT: DetectorKind = DetectorKind(1 << 1);
    pub const ALL: DetectorKind = DetectorKind(Self::BARCODE.0 | Self::TEXT.0);

    const SINGLES: [(DetectorKind, &'static str); 2] =
        [(Self::BARCODE, "barcode"), (Self::TEXT, "text")];

    pub fn contains(self, other: DetectorKind) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: DetectorKind) -> DetectorKind {
        DetectorKind(self.0 | other.0)
    }

    pub fn insert(&mut self, other: DetectorKind) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Single detector kinds in this set, in invocation order
    pub fn iter(self) -> impl Iterator<Item = DetectorKind> {
        Self::SINGLES
            .into_iter()
            .map(|(kind, _)| kind)
            .filter(move |kind| self.contains(*kind))
    }

    /// Name of a single detector kind; sets are named by their members
    pub fn name(self) -> String {
        Self::SINGLES
            .iter()
            .filter(|(kind, _)| self.contains(*kind))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for DetectorKind {
    fn default() -> Self {
        Self::TEXT
    }
}

impl BitOr for DetectorKind {
    type Output = DetectorKind;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitOrAssign for DetectorKind {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Debug for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DetectorKind({})", self.name())
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&self.name())
        }
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    /// Parse a comma separated list such as `text,barcode`, or `all` / `none`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut kinds = DetectorKind::NONE;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_ascii_lowercase().as_str() {
                "text" => kinds |= DetectorKind::TEXT,
                "barcode" => kinds |= DetectorKind::BARCODE,
                "all" => kinds |= DetectorKind::ALL,
                "none" => {}
                other => return Err(format!("unknown detector kind '{}'", other)),
            }
        }
        Ok(kinds)
    }
}

impl TryFrom<String> for DetectorKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DetectorKind> for String {
    fn from(kind: DetectorKind) -> Self {
        kind.to_string()
    }
}

/// Image handed to an analysis request
#[derive(Clone)]
pub enum ImageInput {
    /// Encoded file contents (PNG, JPEG, ...)
    Encoded(Vec<u8>),
    /// An already decoded image
    Decoded(DynamicImage),
    /// Raw 8-bit RGBA pixels, row major
    Rgba { width: u32, height: u32, data: Vec<u8> },
}

impl ImageInput {
    /// Turn the input into a decoded image
    pub fn decode(self) -> Result<DynamicImage, AnalysisError> {
        match self {
            ImageInput::Encoded(bytes) => ImageReader::new(Cursor::new(bytes))
                .with_guessed_format()
                .map_err(|e| AnalysisError::ImageDecode(e.to_string()))?
                .decode()
                .map_err(|e| AnalysisError::ImageDecode(e.to_string())),
            ImageInput::Decoded(image) => Ok(image),
            ImageInput::Rgba { width, height, data } => {
                let len = data.len();
                RgbaImage::from_raw(width, height, data)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(|| {
                        AnalysisError::ImageDecode(format!(
                            "pixel buffer of {} bytes does not match {}x{} RGBA",
                            len, width, height
                        ))
                    })
            }
        }
    }
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageInput::Encoded(bytes) => write!(f, "Encoded({} bytes)", bytes.len()),
            ImageInput::Decoded(image) => write!(f, "Decoded({}x{})", image.width(), image.height()),
            ImageInput::Rgba { width, height, .. } => write!(f, "Rgba({}x{})", width, height),
        }
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        ImageInput::Encoded(bytes)
    }
}

impl From<&[u8]> for ImageInput {
    fn from(bytes: &[u8]) -> Self {
        ImageInput::Encoded(bytes.to_vec())
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        ImageInput::Decoded(image)
    }
}

/// A detected region with its recognized string and the entities found in it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationResult {
    pub text: String,
    pub quad: BoundingQuad,
    pub entities: Vec<ExtractedEntity>,
}

impl ObservationResult {
    /// Build a result from a raw detector payload.
    /// Missing or whitespace-only payloads yield `None`.
    pub fn from_payload(payload: Option<String>, quad: BoundingQuad) -> Option<Self> {
        let text = payload?;
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            text,
            quad,
            entities: Vec::new(),
        })
    }

    pub fn with_entities(mut self, entities: Vec<ExtractedEntity>) -> Self {
        self.entities = entities;
        self
    }
}

/// Lifecycle phase of the most recent analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Detecting,
    Extracting,
    Published,
    Failed,
}

/// Results of one successful run. Never mutated after publication.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSnapshot {
    pub run_id: Uuid,
    pub detectors: DetectorKind,
    pub results: Vec<ObservationResult>,
    pub published_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingQuad;

    #[test]
    fn test_detector_kind_default_is_text() {
        assert_eq!(DetectorKind::default(), DetectorKind::TEXT);
    }

    #[test]
    fn test_detector_kind_union_and_contains() {
        let kinds = DetectorKind::TEXT | DetectorKind::BARCODE;
        assert_eq!(kinds, DetectorKind::ALL);
        assert!(kinds.contains(DetectorKind::TEXT));
        assert!(kinds.contains(DetectorKind::BARCODE));
        assert!(!DetectorKind::TEXT.contains(DetectorKind::BARCODE));
        assert!(DetectorKind::NONE.is_empty());
    }

    #[test]
    fn test_detector_kind_iterates_in_invocation_order() {
        let order: Vec<_> = DetectorKind::ALL.iter().collect();
        assert_eq!(order, vec![DetectorKind::BARCODE, DetectorKind::TEXT]);
        assert_eq!(DetectorKind::NONE.iter().count(), 0);
    }

    #[test]
    fn test_detector_kind_parse() {
        assert_eq!("text".parse::<DetectorKind>(), Ok(DetectorKind::TEXT));
        assert_eq!("Barcode, text".parse::<DetectorKind>(), Ok(DetectorKind::ALL));
        assert_eq!("all".parse::<DetectorKind>(), Ok(DetectorKind::ALL));
        assert_eq!("none".parse::<DetectorKind>(), Ok(DetectorKind::NONE));
        assert!("faces".parse::<DetectorKind>().is_err());
        assert_eq!(DetectorKind::ALL.to_string(), "barcode,text");
    }

    #[test]
    fn test_blank_payloads_are_filtered() {
        let quad = BoundingQuad::default();
        assert!(ObservationResult::from_payload(None, quad).is_none());
        assert!(ObservationResult::from_payload(Some(String::new()), quad).is_none());
        assert!(ObservationResult::from_payload(Some(" \n\t ".into()), quad).is_none());

        let result = ObservationResult::from_payload(Some(" 42 ".into()), quad).unwrap();
        assert_eq!(result.text, " 42 ");
        assert!(result.entities.is_empty());
    }

    #[test]
    fn test_rgba_input_size_mismatch_is_decode_error() {
        let input = ImageInput::Rgba {
            width: 4,
            height: 4,
            data: vec![0; 10],
        };
        assert!(matches!(input.decode(), Err(AnalysisError::ImageDecode(_))));
    }

    #[test]
    fn test_rgba_input_decodes() {
        let input = ImageInput::Rgba {
            width: 2,
            height: 3,
            data: vec![255; 2 * 3 * 4],
        };
        let image = input.decode().unwrap();
        assert_eq!((image.width(), image.height()), (2, 3));
    }

    #[test]
    fn test_garbage_bytes_are_decode_error() {
        let input = ImageInput::from(&b"definitely not an image"[..]);
        assert!(matches!(input.decode(), Err(AnalysisError::ImageDecode(_))));
    }
}

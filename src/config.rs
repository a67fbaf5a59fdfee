use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::extraction::EntityCategories;
use crate::models::DetectorKind;

fn parse_env_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        None => default,
    }
}

/// Parse `LIVETEXT_CARRIERS`.
/// Format: `;`-separated `carrier|pattern|url_template` entries, the template is optional.
fn parse_carriers(val: &str) -> Vec<CarrierPattern> {
    val.split(';')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let mut parts = entry.splitn(3, '|');
            let carrier = parts.next()?.trim();
            let pattern = parts.next().map(str::trim).unwrap_or_default();
            if carrier.is_empty() || pattern.is_empty() {
                tracing::warn!("Invalid carrier entry '{}' in LIVETEXT_CARRIERS, skipping", entry);
                return None;
            }
            Some(CarrierPattern {
                carrier: carrier.to_string(),
                pattern: pattern.to_string(),
                url_template: parts.next().map(str::trim).filter(|t| !t.is_empty()).map(String::from),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LivetextConfig {
    /// Detectors used when a request does not name any
    pub detectors: DetectorKind,
    pub ocr: OcrConfig,
    pub barcode: BarcodeConfig,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub model_dir: PathBuf,
    pub detection_model: String,
    pub recognition_model: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BarcodeConfig {
    /// Scan an Otsu-binarized copy when the grayscale pass finds nothing
    pub binarize_fallback: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Region code such as `US` or `GB`
    pub region: String,
    pub categories: EntityCategories,
    /// Extra shipment carriers, checked after the builtin ones
    pub carriers: Vec<CarrierPattern>,
}

/// A user supplied shipment tracking recognizer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CarrierPattern {
    pub carrier: String,
    /// Regex; capture group 1 (or the whole match) is the tracking number
    pub pattern: String,
    /// Tracking page URL, `{}` is replaced by the tracking number
    #[serde(default)]
    pub url_template: Option<String>,
}

fn default_model_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".cache/ocrs"))
        .unwrap_or_else(|_| PathBuf::from(".cache/ocrs"))
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            detection_model: "text-detection.rten".to_string(),
            recognition_model: "text-recognition.rten".to_string(),
        }
    }
}

impl OcrConfig {
    pub fn detection_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detection_model)
    }

    pub fn recognition_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognition_model)
    }
}

impl Default for BarcodeConfig {
    fn default() -> Self {
        Self {
            binarize_fallback: true,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            region: "US".to_string(),
            categories: EntityCategories::ALL,
            carriers: Vec::new(),
        }
    }
}

impl LivetextConfig {
    /// Load from `LIVETEXT_*` environment variables. Invalid values are
    /// logged and replaced by their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let ocr = OcrConfig {
            model_dir: lookup("LIVETEXT_OCR_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.ocr.model_dir),
            detection_model: lookup("LIVETEXT_OCR_DETECTION_MODEL").unwrap_or(defaults.ocr.detection_model),
            recognition_model: lookup("LIVETEXT_OCR_RECOGNITION_MODEL")
                .unwrap_or(defaults.ocr.recognition_model),
        };

        let barcode = BarcodeConfig {
            binarize_fallback: parse_env_or(
                &lookup,
                "LIVETEXT_BARCODE_BINARIZE",
                defaults.barcode.binarize_fallback,
            ),
        };

        let extractor = ExtractorConfig {
            region: lookup("LIVETEXT_REGION").unwrap_or(defaults.extractor.region),
            categories: parse_env_or(&lookup, "LIVETEXT_ENTITY_CATEGORIES", defaults.extractor.categories),
            carriers: lookup("LIVETEXT_CARRIERS")
                .map(|val| parse_carriers(&val))
                .unwrap_or_default(),
        };

        Self {
            detectors: parse_env_or(&lookup, "LIVETEXT_DETECTORS", defaults.detectors),
            ocr,
            barcode,
            extractor,
        }
    }
}

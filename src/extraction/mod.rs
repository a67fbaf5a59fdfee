//! Entity extraction over recognized strings.
//!
//! Recognizers push [`Candidate`] spans into a shared buffer; [`resolve`]
//! then keeps a non-overlapping subset and returns the entities in span order.

mod datetime;
pub mod entity;
pub mod patterns;

use tracing::{debug, error};

pub use entity::{EntityCategories, ExtractedEntity};
pub use patterns::Region;

use crate::config::ExtractorConfig;
use crate::error::{ConfigurationError, EngineError};
use datetime::DateRecognizer;
use patterns::Recognizers;

/// Tie-break between candidates covering the exact same span.
/// Earlier variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Priority {
    Email,
    Link,
    Shipment,
    Payment,
    Flight,
    CalendarEvent,
    Date,
    Address,
    Money,
    PhoneNumber,
    Measurement,
}

/// A matched span, byte offsets into the scanned text
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    start: usize,
    end: usize,
    priority: Priority,
    entity: ExtractedEntity,
}

impl Candidate {
    pub(crate) fn new(start: usize, end: usize, priority: Priority, entity: ExtractedEntity) -> Self {
        Self {
            start,
            end,
            priority,
            entity,
        }
    }
}

/// Pick non-overlapping candidates: earliest start, then longest span, then
/// priority. The result is ordered by span start.
pub(crate) fn resolve(mut candidates: Vec<Candidate>) -> Vec<ExtractedEntity> {
    candidates.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
            .then_with(|| a.priority.cmp(&b.priority))
    });

    let mut entities = Vec::with_capacity(candidates.len());
    let mut covered_until = 0;
    for candidate in candidates {
        if candidate.start < covered_until || candidate.start == candidate.end {
            continue;
        }
        covered_until = candidate.end;
        entities.push(candidate.entity);
    }
    entities
}

/// Scans a string for typed entities.
///
/// Implementations must be deterministic: the same input under the same
/// configuration yields the same sequence.
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>, EngineError>;

    fn name(&self) -> &str;
}

/// Regex based extractor covering the whole entity taxonomy
pub struct PatternExtractor {
    recognizers: Option<(Recognizers, DateRecognizer)>,
    categories: EntityCategories,
    configuration_error: Option<ConfigurationError>,
}

impl PatternExtractor {
    /// Build the extractor. A configuration failure is logged and kept; the
    /// instance then returns no entities for any input.
    pub fn new(config: &ExtractorConfig) -> Self {
        match Self::compile(config) {
            Ok(recognizers) => Self {
                recognizers: Some(recognizers),
                categories: config.categories,
                configuration_error: None,
            },
            Err(e) => {
                error!(error = %e, "entity extractor configuration failed, extraction disabled");
                Self {
                    recognizers: None,
                    categories: config.categories,
                    configuration_error: Some(e),
                }
            }
        }
    }

    fn compile(config: &ExtractorConfig) -> Result<(Recognizers, DateRecognizer), ConfigurationError> {
        let region: Region = config.region.parse()?;
        let recognizers = Recognizers::compile(region, config)?;
        let dates = DateRecognizer::new(region.month_first())?;
        debug!(region = ?region, categories = %config.categories, "entity recognizers compiled");
        Ok((recognizers, dates))
    }

    /// The error that disabled this instance, if any
    pub fn configuration_error(&self) -> Option<&ConfigurationError> {
        self.configuration_error.as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.recognizers.is_some()
    }

    pub fn categories(&self) -> EntityCategories {
        self.categories
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default())
    }
}

impl EntityExtractor for PatternExtractor {
    fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>, EngineError> {
        let Some((recognizers, dates)) = &self.recognizers else {
            return Ok(Vec::new());
        };

        let mut candidates = Vec::new();
        recognizers.scan(text, &mut candidates);
        dates.scan(text, &mut candidates);

        // Disabled categories are dropped after resolution so they still
        // shadow the spans they cover.
        Ok(resolve(candidates)
            .into_iter()
            .filter(|entity| self.categories.contains(entity.category()))
            .collect())
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

use std::str::FromStr;

use regex::Regex;
use url::Url;

use super::{Candidate, ExtractedEntity, Priority};
use crate::config::{CarrierPattern, ExtractorConfig};
use crate::error::ConfigurationError;

/// Regional conventions used when a pattern is ambiguous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    UnitedStates,
    Canada,
    UnitedKingdom,
    Ireland,
    Germany,
    France,
    Spain,
    Italy,
    Netherlands,
    Japan,
    Australia,
}

impl Region {
    /// `03/04/2025` reads as March 4th
    pub fn month_first(self) -> bool {
        matches!(self, Region::UnitedStates)
    }

    fn north_american(self) -> bool {
        matches!(self, Region::UnitedStates | Region::Canada)
    }

    /// Currency a bare `$` stands for
    fn dollar_currency(self) -> &'static str {
        match self {
            Region::Canada => "CAD",
            Region::Australia => "AUD",
            _ => "USD",
        }
    }
}

impl FromStr for Region {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "US" => Ok(Region::UnitedStates),
            "CA" => Ok(Region::Canada),
            "GB" | "UK" => Ok(Region::UnitedKingdom),
            "IE" => Ok(Region::Ireland),
            "DE" => Ok(Region::Germany),
            "FR" => Ok(Region::France),
            "ES" => Ok(Region::Spain),
            "IT" => Ok(Region::Italy),
            "NL" => Ok(Region::Netherlands),
            "JP" => Ok(Region::Japan),
            "AU" => Ok(Region::Australia),
            _ => Err(ConfigurationError::UnsupportedRegion(s.to_string())),
        }
    }
}

pub(crate) fn compile(recognizer: &str, pattern: &str) -> Result<Regex, ConfigurationError> {
    Regex::new(pattern).map_err(|e| ConfigurationError::Recognizer {
        recognizer: recognizer.to_string(),
        reason: e.to_string(),
    })
}

/// Whether the character starting at byte `index` is alphanumeric
pub(crate) fn is_alnum_at(text: &str, index: usize) -> bool {
    text.get(index..)
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_alphanumeric)
}

/// Whether the character ending right before byte `index` is alphanumeric
fn is_alnum_before(text: &str, index: usize) -> bool {
    text.get(..index)
        .and_then(|head| head.chars().next_back())
        .is_some_and(char::is_alphanumeric)
}

/// Span is not glued to surrounding letters or digits
fn is_isolated(text: &str, start: usize, end: usize) -> bool {
    !is_alnum_before(text, start) && !is_alnum_at(text, end)
}

/// IATA designators accepted for bare flight numbers
const AIRLINES: &[&str] = &[
    "AA", "AC", "AF", "AI", "AM", "AS", "AV", "AY", "B6", "BA", "CA", "CX", "CZ", "DL", "EI",
    "EK", "ET", "EY", "F9", "FR", "HA", "IB", "JL", "KE", "KL", "LA", "LH", "LX", "MS", "MU",
    "NH", "NK", "OS", "OZ", "QF", "QR", "SA", "SK", "SQ", "SV", "TK", "U2", "UA", "VS", "VY",
    "W6", "WN", "WS", "6E",
];

const CURRENCY_CODES: &str = "USD|EUR|GBP|JPY|CAD|AUD|CHF|CNY|INR|SEK|NOK|DKK|NZD|MXN";

/// Carrier recognizer compiled from a builtin table or user configuration
struct Carrier {
    name: String,
    pattern: Regex,
    url_template: Option<String>,
}

impl Carrier {
    fn compile(entry: &CarrierPattern) -> Result<Self, ConfigurationError> {
        let pattern = Regex::new(&entry.pattern).map_err(|e| ConfigurationError::InvalidCarrierPattern {
            carrier: entry.carrier.clone(),
            reason: e.to_string(),
        })?;

        if let Some(template) = &entry.url_template {
            if !template.contains("{}") {
                return Err(ConfigurationError::InvalidTrackingUrl {
                    carrier: entry.carrier.clone(),
                    reason: "template has no {} placeholder".to_string(),
                });
            }
            Url::parse(&template.replace("{}", "0")).map_err(|e| ConfigurationError::InvalidTrackingUrl {
                carrier: entry.carrier.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            name: entry.carrier.clone(),
            pattern,
            url_template: entry.url_template.clone(),
        })
    }
}

fn builtin_carriers() -> Vec<CarrierPattern> {
    vec![
        CarrierPattern {
            carrier: "UPS".into(),
            pattern: r"\b(1Z[0-9A-Z]{16})\b".into(),
            url_template: Some("https://www.ups.com/track?tracknum={}".into()),
        },
        CarrierPattern {
            carrier: "USPS".into(),
            pattern: r"\b((?:92|93|94|95)\d{20})\b".into(),
            url_template: Some("https://tools.usps.com/go/TrackConfirmAction?tLabels={}".into()),
        },
        CarrierPattern {
            carrier: "FedEx".into(),
            pattern: r"(?i:\bfed\s?ex\b)[^\d\n]{0,24}?\b(\d{12}|\d{15})\b".into(),
            url_template: Some("https://www.fedex.com/fedextrack/?trknbr={}".into()),
        },
    ]
}

/// Compiled recognizers for everything except dates
pub(crate) struct Recognizers {
    region: Region,
    link: Regex,
    email: Regex,
    phone_international: Regex,
    phone_national: Regex,
    money_symbol: Regex,
    money_code_suffix: Regex,
    money_code_prefix: Regex,
    address: Regex,
    postal: Regex,
    flight: Regex,
    transit: Regex,
    measurement: Regex,
    iban: Regex,
    cashtag: Regex,
    carriers: Vec<Carrier>,
}

impl Recognizers {
    pub(crate) fn compile(region: Region, config: &ExtractorConfig) -> Result<Self, ConfigurationError> {
        let phone_national = if region.north_american() {
            r"(?:\+?1[\s.-]?)?(?:\(\d{3}\)\s?|\d{3}[\s.-])?\d{3}[\s.-]\d{4}"
        } else {
            r"\(?0\d{1,4}\)?(?:[\s.-]?\d{2,4}){2,3}"
        };

        let mut carriers = Vec::new();
        for entry in builtin_carriers().iter().chain(config.carriers.iter()) {
            carriers.push(Carrier::compile(entry)?);
        }

        Ok(Self {
            region,
            link: compile("link", r#"(?i)\b(?:https?://|ftp://|www\.)[^\s<>"']+"#)?,
            email: compile("email", r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b")?,
            phone_international: compile("phone", r"\+\d{1,3}(?:[\s.-]?\(?\d{1,4}\)?){2,5}")?,
            phone_national: compile("phone", phone_national)?,
            money_symbol: compile("money", r"([$€£¥₹])\s?(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?")?,
            money_code_suffix: compile(
                "money",
                &format!(r"(\d{{1,3}}(?:,\d{{3}})+|\d+)(?:\.(\d{{1,2}}))?\s?({CURRENCY_CODES})\b"),
            )?,
            money_code_prefix: compile(
                "money",
                &format!(r"\b({CURRENCY_CODES})\s?(\d{{1,3}}(?:,\d{{3}})+|\d+)(?:\.(\d{{1,2}}))?"),
            )?,
            address: compile(
                "address",
                r"\b(\d{1,6}\s+(?:[A-Z0-9][A-Za-z0-9.'-]*\s+){0,4}?(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Drive|Dr|Lane|Ln|Way|Court|Ct|Place|Pl|Terrace|Ter|Parkway|Pkwy|Highway|Hwy|Loop|Circle|Cir|Square|Sq)\b\.?(?:,?\s+(?:Apt|Suite|Ste|Unit)\.?\s*#?[A-Za-z0-9-]+)?)(?:,\s*([A-Z][A-Za-z.'-]*(?:\s+[A-Z][A-Za-z.'-]*){0,3}))?(?:,\s*([A-Z]{2}))?(?:\s+(\d{5}(?:-\d{4})?))?",
            )?,
            postal: compile(
                "postal address",
                r"(?i:\bP\.?\s?O\.?\s*Box)\s+\d+(?:,\s*[A-Z][A-Za-z.'-]*(?:\s+[A-Z][A-Za-z.'-]*){0,3})?(?:,\s*[A-Z]{2})?(?:\s+\d{5}(?:-\d{4})?)?",
            )?,
            flight: compile("flight", r"\b([A-Z][A-Z0-9]|[0-9][A-Z])\s?(\d{1,4})\b")?,
            transit: compile(
                "transit",
                r"(?i:\bflight)\s*(?:(?i:no\.?|number)|#)?\s*(?:([A-Z][A-Z0-9]|[0-9][A-Z])\s?)?(\d{1,4})\b",
            )?,
            measurement: compile(
                "measurement",
                r"(\d+(?:[.,]\d+)?)\s?(km/h|mph|°C|°F|kWh|kg|mg|lbs|lb|oz|km|cm|mm|mi|ft|yd|ml|mL|gal|m|g|L)",
            )?,
            iban: compile("payment", r"\b[A-Z]{2}\d{2}(?: ?[A-Z0-9]{4}){2,7}(?: ?[A-Z0-9]{1,3})?\b")?,
            cashtag: compile("payment", r"\$[A-Za-z][A-Za-z0-9_]{0,19}\b")?,
            carriers,
        })
    }

    pub(crate) fn scan(&self, text: &str, out: &mut Vec<Candidate>) {
        self.links(text, out);
        self.emails(text, out);
        self.phones(text, out);
        self.money(text, out);
        self.addresses(text, out);
        self.flights(text, out);
        self.measurements(text, out);
        self.payments(text, out);
        self.shipments(text, out);
    }

    fn links(&self, text: &str, out: &mut Vec<Candidate>) {
        for m in self.link.find_iter(text) {
            let raw = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}']);
            let absolute = if raw.to_ascii_lowercase().starts_with("www.") {
                format!("http://{}", raw)
            } else {
                raw.to_string()
            };
            let valid = Url::parse(&absolute).is_ok_and(|url| url.host().is_some());
            if valid {
                out.push(Candidate::new(
                    m.start(),
                    m.start() + raw.len(),
                    Priority::Link,
                    ExtractedEntity::Link { url: absolute },
                ));
            }
        }
    }

    fn emails(&self, text: &str, out: &mut Vec<Candidate>) {
        for m in self.email.find_iter(text) {
            out.push(Candidate::new(
                m.start(),
                m.end(),
                Priority::Email,
                ExtractedEntity::email(m.as_str()),
            ));
        }
    }

    fn phones(&self, text: &str, out: &mut Vec<Candidate>) {
        for regex in [&self.phone_international, &self.phone_national] {
            for m in regex.find_iter(text) {
                let digits = m.as_str().chars().filter(char::is_ascii_digit).count();
                if !(7..=15).contains(&digits) || !is_isolated(text, m.start(), m.end()) {
                    continue;
                }
                out.push(Candidate::new(
                    m.start(),
                    m.end(),
                    Priority::PhoneNumber,
                    ExtractedEntity::phone_number(m.as_str()),
                ));
            }
        }
    }

    fn money(&self, text: &str, out: &mut Vec<Candidate>) {
        for caps in self.money_symbol.captures_iter(text) {
            let (Some(whole), Some(symbol)) = (caps.get(0), caps.get(1)) else { continue };
            if is_alnum_at(text, whole.end()) {
                continue;
            }
            let currency = match symbol.as_str() {
                "$" => self.region.dollar_currency(),
                "€" => "EUR",
                "£" => "GBP",
                "¥" => "JPY",
                _ => "INR",
            };
            if let Some(amount) = parse_amount(caps.get(2).map(|m| m.as_str()), caps.get(3).map(|m| m.as_str())) {
                out.push(money_candidate(whole.start(), whole.end(), amount, currency));
            }
        }

        for caps in self.money_code_suffix.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if is_alnum_before(text, whole.start()) {
                continue;
            }
            let currency = caps.get(3).map_or("", |m| m.as_str());
            if let Some(amount) = parse_amount(caps.get(1).map(|m| m.as_str()), caps.get(2).map(|m| m.as_str())) {
                out.push(money_candidate(whole.start(), whole.end(), amount, currency));
            }
        }

        for caps in self.money_code_prefix.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if is_alnum_at(text, whole.end()) {
                continue;
            }
            let currency = caps.get(1).map_or("", |m| m.as_str());
            if let Some(amount) = parse_amount(caps.get(2).map(|m| m.as_str()), caps.get(3).map(|m| m.as_str())) {
                out.push(money_candidate(whole.start(), whole.end(), amount, currency));
            }
        }
    }

    fn addresses(&self, text: &str, out: &mut Vec<Candidate>) {
        for caps in self.address.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let part = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string());
            out.push(Candidate::new(
                whole.start(),
                whole.end(),
                Priority::Address,
                ExtractedEntity::Address {
                    street: part(1),
                    city: part(2),
                    state: part(3),
                    zip: part(4),
                },
            ));
        }

        for m in self.postal.find_iter(text) {
            out.push(Candidate::new(
                m.start(),
                m.end(),
                Priority::Address,
                ExtractedEntity::PostalAddress {
                    address: m.as_str().to_string(),
                },
            ));
        }
    }

    fn flights(&self, text: &str, out: &mut Vec<Candidate>) {
        for caps in self.flight.captures_iter(text) {
            let (Some(whole), Some(airline), Some(number)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            if !AIRLINES.contains(&airline.as_str()) {
                continue;
            }
            out.push(Candidate::new(
                whole.start(),
                whole.end(),
                Priority::Flight,
                ExtractedEntity::FlightNumber {
                    airline: airline.as_str().to_string(),
                    flight: number.as_str().to_string(),
                },
            ));
        }

        for caps in self.transit.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            out.push(Candidate::new(
                whole.start(),
                whole.end(),
                Priority::Flight,
                ExtractedEntity::TransitInfo {
                    airline: caps.get(1).map(|m| m.as_str().to_string()),
                    flight: caps.get(2).map(|m| m.as_str().to_string()),
                },
            ));
        }
    }

    fn measurements(&self, text: &str, out: &mut Vec<Candidate>) {
        for m in self.measurement.find_iter(text) {
            if !is_isolated(text, m.start(), m.end()) {
                continue;
            }
            out.push(Candidate::new(
                m.start(),
                m.end(),
                Priority::Measurement,
                ExtractedEntity::Measurement {
                    value: m.as_str().to_string(),
                },
            ));
        }
    }

    fn payments(&self, text: &str, out: &mut Vec<Candidate>) {
        for m in self.iban.find_iter(text) {
            let compact: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
            if iban_checksum_valid(&compact) {
                out.push(Candidate::new(
                    m.start(),
                    m.end(),
                    Priority::Payment,
                    ExtractedEntity::PaymentIdentifier { identifier: compact },
                ));
            }
        }

        for m in self.cashtag.find_iter(text) {
            if is_alnum_before(text, m.start()) {
                continue;
            }
            out.push(Candidate::new(
                m.start(),
                m.end(),
                Priority::Payment,
                ExtractedEntity::PaymentIdentifier {
                    identifier: m.as_str().to_string(),
                },
            ));
        }
    }

    fn shipments(&self, text: &str, out: &mut Vec<Candidate>) {
        for carrier in &self.carriers {
            for caps in carrier.pattern.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                // Custom patterns without a group track the whole match
                let number = caps.get(1).unwrap_or(whole).as_str().to_string();
                let tracking_url = carrier
                    .url_template
                    .as_ref()
                    .map(|template| template.replace("{}", &number));
                out.push(Candidate::new(
                    whole.start(),
                    whole.end(),
                    Priority::Shipment,
                    ExtractedEntity::ShipmentTracking {
                        carrier: carrier.name.clone(),
                        tracking_number: number,
                        tracking_url,
                    },
                ));
            }
        }
    }
}

fn parse_amount(whole: Option<&str>, fraction: Option<&str>) -> Option<f64> {
    let mut value = whole?.replace(',', "");
    if let Some(fraction) = fraction {
        value.push('.');
        value.push_str(fraction);
    }
    value.parse().ok()
}

fn money_candidate(start: usize, end: usize, amount: f64, currency: &str) -> Candidate {
    Candidate::new(
        start,
        end,
        Priority::Money,
        ExtractedEntity::MoneyAmount {
            amount,
            currency: currency.to_string(),
        },
    )
}

/// ISO 13616 mod-97 check
fn iban_checksum_valid(iban: &str) -> bool {
    if !(15..=34).contains(&iban.len()) || !iban.is_ascii() {
        return false;
    }
    let (head, tail) = iban.split_at(4);
    let mut remainder: u32 = 0;
    for c in tail.chars().chain(head.chars()) {
        let value = match c.to_digit(36) {
            Some(v) => v,
            None => return false,
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }
    remainder == 1
}

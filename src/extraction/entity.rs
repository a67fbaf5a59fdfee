use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ConfigurationError;

/// A typed real-world reference found in recognized text
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedEntity {
    Address {
        zip: Option<String>,
        state: Option<String>,
        city: Option<String>,
        street: Option<String>,
    },
    Date {
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        time_zone: Option<String>,
        /// Seconds, never negative
        duration: Option<f64>,
    },
    Link {
        url: String,
    },
    PhoneNumber {
        number: String,
    },
    TransitInfo {
        airline: Option<String>,
        flight: Option<String>,
    },
    CalendarEvent {
        all_day: bool,
        #[serde(with = "time::serde::rfc3339::option")]
        start: Option<OffsetDateTime>,
        #[serde(with = "time::serde::rfc3339::option")]
        end: Option<OffsetDateTime>,
    },
    Email {
        address: String,
    },
    PostalAddress {
        address: String,
    },
    MoneyAmount {
        amount: f64,
        currency: String,
    },
    FlightNumber {
        airline: String,
        flight: String,
    },
    ShipmentTracking {
        carrier: String,
        tracking_number: String,
        tracking_url: Option<String>,
    },
    Measurement {
        value: String,
    },
    PaymentIdentifier {
        identifier: String,
    },
}

impl ExtractedEntity {
    pub fn link(url: impl Into<String>) -> Self {
        Self::Link { url: url.into() }
    }

    pub fn phone_number(number: impl Into<String>) -> Self {
        Self::PhoneNumber { number: number.into() }
    }

    pub fn email(address: impl Into<String>) -> Self {
        Self::Email { address: address.into() }
    }

    pub fn category(&self) -> EntityCategories {
        match self {
            Self::Address { .. } => EntityCategories::ADDRESS,
            Self::Date { .. } => EntityCategories::DATE,
            Self::Link { .. } => EntityCategories::LINK,
            Self::PhoneNumber { .. } => EntityCategories::PHONE_NUMBER,
            Self::TransitInfo { .. } => EntityCategories::TRANSIT_INFO,
            Self::CalendarEvent { .. } => EntityCategories::CALENDAR_EVENT,
            Self::Email { .. } => EntityCategories::EMAIL,
            Self::PostalAddress { .. } => EntityCategories::POSTAL_ADDRESS,
            Self::MoneyAmount { .. } => EntityCategories::MONEY_AMOUNT,
            Self::FlightNumber { .. } => EntityCategories::FLIGHT_NUMBER,
            Self::ShipmentTracking { .. } => EntityCategories::SHIPMENT_TRACKING,
            Self::Measurement { .. } => EntityCategories::MEASUREMENT,
            Self::PaymentIdentifier { .. } => EntityCategories::PAYMENT_IDENTIFIER,
        }
    }
}

/// Set of entity categories an extractor is allowed to emit
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityCategories(u16);

impl EntityCategories {
    pub const NONE: Self = Self(0);
    pub const ADDRESS: Self = Self(1 << 0);
    pub const DATE: Self = Self(1 << 1);
    pub const LINK: Self = Self(1 << 2);
    pub const PHONE_NUMBER: Self = Self(1 << 3);
    pub const TRANSIT_INFO: Self = Self(1 << 4);
    pub const CALENDAR_EVENT: Self = Self(1 << 5);
    pub const EMAIL: Self = Self(1 << 6);
    pub const POSTAL_ADDRESS: Self = Self(1 << 7);
    pub const MONEY_AMOUNT: Self = Self(1 << 8);
    pub const FLIGHT_NUMBER: Self = Self(1 << 9);
    pub const SHIPMENT_TRACKING: Self = Self(1 << 10);
    pub const MEASUREMENT: Self = Self(1 << 11);
    pub const PAYMENT_IDENTIFIER: Self = Self(1 << 12);
    pub const ALL: Self = Self((1 << 13) - 1);

    const NAMES: [(Self, &'static str); 13] = [
        (Self::ADDRESS, "address"),
        (Self::DATE, "date"),
        (Self::LINK, "link"),
        (Self::PHONE_NUMBER, "phone_number"),
        (Self::TRANSIT_INFO, "transit_info"),
        (Self::CALENDAR_EVENT, "calendar_event"),
        (Self::EMAIL, "email"),
        (Self::POSTAL_ADDRESS, "postal_address"),
        (Self::MONEY_AMOUNT, "money_amount"),
        (Self::FLIGHT_NUMBER, "flight_number"),
        (Self::SHIPMENT_TRACKING, "shipment_tracking"),
        (Self::MEASUREMENT, "measurement"),
        (Self::PAYMENT_IDENTIFIER, "payment_identifier"),
    ];

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for EntityCategories {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for EntityCategories {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntityCategories {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for EntityCategories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL {
            return f.write_str("all");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(category, _)| self.contains(*category))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

impl fmt::Debug for EntityCategories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityCategories({})", self)
    }
}

impl FromStr for EntityCategories {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut categories = Self::NONE;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let part = part.to_ascii_lowercase();
            if part == "all" {
                categories |= Self::ALL;
                continue;
            }
            let (category, _) = Self::NAMES
                .iter()
                .find(|(_, name)| *name == part)
                .ok_or_else(|| ConfigurationError::UnknownCategory(part.clone()))?;
            categories |= *category;
        }
        Ok(categories)
    }
}

impl TryFrom<String> for EntityCategories {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityCategories> for String {
    fn from(categories: EntityCategories) -> Self {
        categories.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_parse_round_trip() {
        let parsed: EntityCategories = "link, phone_number".parse().unwrap();
        assert!(parsed.contains(EntityCategories::LINK));
        assert!(parsed.contains(EntityCategories::PHONE_NUMBER));
        assert!(!parsed.contains(EntityCategories::DATE));
        assert_eq!(parsed.to_string(), "link,phone_number");
        assert_eq!("all".parse::<EntityCategories>().unwrap(), EntityCategories::ALL);
    }

    #[test]
    fn test_unknown_category_is_configuration_error() {
        let err = "link,weather".parse::<EntityCategories>().unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownCategory("weather".into()));
    }

    #[test]
    fn test_entity_serializes_with_kind_tag() {
        let json = serde_json::to_value(ExtractedEntity::phone_number("555-0100")).unwrap();
        assert_eq!(json["kind"], "phone_number");
        assert_eq!(json["number"], "555-0100");
    }
}

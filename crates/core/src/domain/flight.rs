use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferId(pub String);

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not a valid IATA airport code (expected 3 ASCII letters)")]
pub struct InvalidIataCode(pub String);

/// Three-letter IATA airport code, always stored upper case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IataCode(String);

impl IataCode {
    pub fn new(code: &str) -> Result<Self, InvalidIataCode> {
        let normalized = code.trim().to_ascii_uppercase();
        let valid =
            normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_uppercase());
        if valid {
            Ok(Self(normalized))
        } else {
            Err(InvalidIataCode(code.trim().to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IataCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for IataCode {
    type Err = InvalidIataCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl TryFrom<String> for IataCode {
    type Error = InvalidIataCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<IataCode> for String {
    fn from(value: IataCode) -> Self {
        value.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    #[default]
    Economy,
    Business,
    First,
}

impl CabinClass {
    pub const LABELS: &'static [&'static str] = &["ECONOMY", "BUSINESS", "FIRST"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Economy => "ECONOMY",
            Self::Business => "BUSINESS",
            Self::First => "FIRST",
        }
    }
}

impl fmt::Display for CabinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CabinClass {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ECONOMY" => Ok(Self::Economy),
            "BUSINESS" => Ok(Self::Business),
            "FIRST" => Ok(Self::First),
            other => Err(format!("unknown cabin class `{other}`")),
        }
    }
}

/// One flight offer as returned by the reservation backend search endpoint.
///
/// The stored order of offers is the backend order; ranking for display is a
/// separate, pure computation (`workflow::engine::cheapest_offer`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightOffer {
    pub offer_id: OfferId,
    pub origin: IataCode,
    pub destination: IataCode,
    pub depart_date: NaiveDate,
    #[serde(with = "clock_time", default = "midnight")]
    pub depart_time: NaiveTime,
    pub price: Decimal,
    pub currency: String,
    #[serde(default)]
    pub cabin: CabinClass,
}

fn midnight() -> NaiveTime {
    NaiveTime::MIN
}

/// Backend departure times arrive as either `HH:MM` or `HH:MM:SS`.
mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{CabinClass, FlightOffer, IataCode};

    #[test]
    fn iata_codes_normalize_to_upper_case() {
        let code = IataCode::new(" bom ").expect("valid code");
        assert_eq!(code.as_str(), "BOM");
    }

    #[test]
    fn iata_codes_reject_wrong_shapes() {
        assert!(IataCode::new("BOMB").is_err());
        assert!(IataCode::new("B1M").is_err());
        assert!(IataCode::new("").is_err());
    }

    #[test]
    fn cabin_class_parses_case_insensitively() {
        assert_eq!("business".parse::<CabinClass>(), Ok(CabinClass::Business));
        assert!("PREMIUM".parse::<CabinClass>().is_err());
    }

    #[test]
    fn offer_decodes_backend_shape() {
        let offer: FlightOffer = serde_json::from_value(serde_json::json!({
            "offerId": "OF-1001",
            "origin": "BOS",
            "destination": "DEN",
            "departDate": "2026-03-05",
            "departTime": "08:15",
            "price": "120.50",
            "currency": "USD"
        }))
        .expect("offer decodes");

        assert_eq!(offer.offer_id.0, "OF-1001");
        assert_eq!(offer.cabin, CabinClass::Economy);
        assert_eq!(offer.depart_time.format("%H:%M").to_string(), "08:15");
    }

    #[test]
    fn offer_without_depart_time_defaults_to_midnight() {
        let offer: FlightOffer = serde_json::from_value(serde_json::json!({
            "offerId": "OF-1002",
            "origin": "DEL",
            "destination": "BOM",
            "departDate": "2026-03-05",
            "price": 99,
            "currency": "INR"
        }))
        .expect("offer decodes");

        assert_eq!(offer.depart_time, chrono::NaiveTime::MIN);
    }
}

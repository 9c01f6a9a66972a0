use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::flight::{CabinClass, IataCode};

fn default_adults() -> u8 {
    1
}

/// Validated one-way search criteria accumulated over a conversation.
///
/// The wire shape matches the reservation backend's `/flights/search`
/// request body (camelCase, fixed `tripType`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    pub origin: IataCode,
    pub destination: IataCode,
    pub depart_date: NaiveDate,
    #[serde(default)]
    pub cabin: CabinClass,
    #[serde(default = "default_adults")]
    pub adults: u8,
}

impl SearchCriteria {
    pub fn new(origin: IataCode, destination: IataCode, depart_date: NaiveDate) -> Self {
        Self { origin, destination, depart_date, cabin: CabinClass::default(), adults: 1 }
    }

    /// Request body for the backend search endpoint.
    pub fn backend_payload(&self) -> Value {
        json!({
            "origin": self.origin.as_str(),
            "destination": self.destination.as_str(),
            "departDate": self.depart_date.format("%Y-%m-%d").to_string(),
            "tripType": "ONEWAY",
            "adults": self.adults,
            "cabin": self.cabin.as_str(),
        })
    }

    pub fn route_label(&self) -> String {
        format!("{} -> {} on {}", self.origin, self.destination, self.depart_date)
    }
}

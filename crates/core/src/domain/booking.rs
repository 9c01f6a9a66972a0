use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::flight::{CabinClass, OfferId};

/// Passenger details for a one-way booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passenger {
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub traveller_class: CabinClass,
}

impl Passenger {
    /// Parses the fixed conversational format `First Last YYYY-MM-DD CLASS`.
    ///
    /// Returns `None` when the line does not match; the caller decides
    /// whether to re-prompt. This is deliberately deterministic - passenger
    /// identity never goes through the language model.
    pub fn parse_details(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let first_name = tokens.next()?;
        let last_name = tokens.next()?;
        let dob = NaiveDate::parse_from_str(tokens.next()?, "%Y-%m-%d").ok()?;
        let traveller_class = tokens.next()?.parse::<CabinClass>().ok()?;
        if tokens.next().is_some() {
            return None;
        }
        if !is_name(first_name) || !is_name(last_name) {
            return None;
        }
        Some(Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            dob,
            traveller_class,
        })
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

fn is_name(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|ch| ch.is_alphabetic() || ch == '-' || ch == '\'')
}

/// Request body for the backend `/bookings/oneway` endpoint.
///
/// `idempotency_reference` is derived from the conversation id so the
/// backend can be queried for a prior booking before any re-submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub user_id: i64,
    pub offer_id: OfferId,
    pub trip_type: String,
    pub depart_date: NaiveDate,
    pub payment_method: String,
    pub idempotency_reference: String,
    pub passengers: Vec<Passenger>,
}

impl BookingRequest {
    pub fn one_way(
        user_id: i64,
        offer_id: OfferId,
        depart_date: NaiveDate,
        idempotency_reference: String,
        passenger: Passenger,
    ) -> Self {
        Self {
            user_id,
            offer_id,
            trip_type: "ONEWAY".to_string(),
            depart_date,
            payment_method: "CARD".to_string(),
            idempotency_reference,
            passengers: vec![passenger],
        }
    }
}

/// Successful outcome of a booking call, kept on the conversation so a
/// repeated confirm can answer without touching the backend again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub booking_reference: String,
    pub offer_id: OfferId,
}

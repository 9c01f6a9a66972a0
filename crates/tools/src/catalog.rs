//! The fixed reservation tool set.
//!
//! Names and argument shapes mirror the reservation backend's operation
//! set; the schemas are what the registry validates against and what the
//! extractor renders into prompts.

use farebot_core::CabinClass;

use crate::registry::{RegistryError, ToolRegistry};
use crate::schema::{FieldKind, FieldSpec, ToolSpec};

pub const SEARCH_FLIGHTS: &str = "search_flights";
pub const BOOK_FLIGHT_ONEWAY: &str = "book_flight_oneway";
pub const GET_BOOKING_BY_REFERENCE: &str = "get_booking_by_reference";
pub const GET_BOOKINGS_BY_USER: &str = "get_bookings_by_user";
pub const PING: &str = "ping";

fn search_flights_spec() -> ToolSpec {
    ToolSpec {
        name: SEARCH_FLIGHTS,
        description: "Search one-way flights between two airports on a date",
        fields: vec![
            FieldSpec::required("origin", FieldKind::IataCode, "origin airport code"),
            FieldSpec::required("destination", FieldKind::IataCode, "destination airport code"),
            FieldSpec::required("depart_date", FieldKind::Date, "departure date"),
            FieldSpec::optional("adults", FieldKind::Integer, "number of travellers, default 1"),
            FieldSpec::optional(
                "cabin",
                FieldKind::Choice(CabinClass::LABELS),
                "cabin class, default ECONOMY",
            ),
        ],
        read_only: true,
    }
}

fn book_flight_oneway_spec() -> ToolSpec {
    ToolSpec {
        name: BOOK_FLIGHT_ONEWAY,
        description: "Book a one-way flight for one passenger using an offer id",
        fields: vec![
            FieldSpec::required("offer_id", FieldKind::Text, "offer id from search results"),
            FieldSpec::required("depart_date", FieldKind::Date, "departure date of the offer"),
            FieldSpec::required("first_name", FieldKind::Text, "passenger first name"),
            FieldSpec::required("last_name", FieldKind::Text, "passenger last name"),
            FieldSpec::required("dob", FieldKind::Date, "passenger date of birth"),
            FieldSpec::optional(
                "traveller_class",
                FieldKind::Choice(CabinClass::LABELS),
                "cabin class, default ECONOMY",
            ),
            FieldSpec::required(
                "reference",
                FieldKind::Text,
                "conversation idempotency reference",
            ),
        ],
        read_only: false,
    }
}

fn get_booking_by_reference_spec() -> ToolSpec {
    ToolSpec {
        name: GET_BOOKING_BY_REFERENCE,
        description: "Fetch a booking by its reference, used to reconcile unclear outcomes",
        fields: vec![FieldSpec::required(
            "reference",
            FieldKind::Text,
            "booking or idempotency reference",
        )],
        read_only: true,
    }
}

fn get_bookings_by_user_spec() -> ToolSpec {
    ToolSpec {
        name: GET_BOOKINGS_BY_USER,
        description: "List all bookings for a user account",
        fields: vec![FieldSpec::optional("user_id", FieldKind::Integer, "user account id")],
        read_only: true,
    }
}

fn ping_spec() -> ToolSpec {
    ToolSpec {
        name: PING,
        description: "Reservation backend health check",
        fields: Vec::new(),
        read_only: true,
    }
}

pub fn reservation_toolset() -> Vec<ToolSpec> {
    vec![
        search_flights_spec(),
        book_flight_oneway_spec(),
        get_booking_by_reference_spec(),
        get_bookings_by_user_spec(),
        ping_spec(),
    ]
}

/// Registers the full reservation tool set. Called once at startup; a
/// duplicate here is a programming error and fails fast.
pub fn register_reservation_tools(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    for spec in reservation_toolset() {
        registry.register(spec)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{register_reservation_tools, reservation_toolset, BOOK_FLIGHT_ONEWAY};
    use crate::registry::ToolRegistry;

    #[test]
    fn toolset_registers_cleanly() {
        let mut registry = ToolRegistry::new();
        register_reservation_tools(&mut registry).expect("registers");
        assert_eq!(registry.len(), reservation_toolset().len());
    }

    #[test]
    fn booking_is_the_only_non_idempotent_tool() {
        let writes: Vec<&str> = reservation_toolset()
            .iter()
            .filter(|spec| !spec.read_only)
            .map(|spec| spec.name)
            .collect();
        assert_eq!(writes, vec![BOOK_FLIGHT_ONEWAY]);
    }

    #[test]
    fn second_registration_pass_fails_on_duplicate() {
        let mut registry = ToolRegistry::new();
        register_reservation_tools(&mut registry).expect("registers");
        assert!(register_reservation_tools(&mut registry).is_err());
    }
}

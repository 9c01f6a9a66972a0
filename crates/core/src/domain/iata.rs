use crate::domain::flight::IataCode;

/// City aliases the deterministic extraction fallback understands.
///
/// This table exists so a dead language model never blocks a search that a
/// human phrased plainly. It is not meant to be exhaustive; unknown cities
/// route to a clarification prompt instead.
const CITY_CODES: &[(&str, &str)] = &[
    ("mumbai", "BOM"),
    ("bombay", "BOM"),
    ("delhi", "DEL"),
    ("bengaluru", "BLR"),
    ("bangalore", "BLR"),
    ("kolkata", "CCU"),
    ("ranchi", "IXR"),
    ("london", "LHR"),
    ("new york", "JFK"),
    ("boston", "BOS"),
    ("denver", "DEN"),
];

/// Looks up a known city name (case-insensitive, full match) as an IATA code.
pub fn city_to_iata(city: &str) -> Option<IataCode> {
    let normalized = city.trim().to_ascii_lowercase();
    CITY_CODES
        .iter()
        .find(|(name, _)| *name == normalized)
        .and_then(|(_, code)| IataCode::new(code).ok())
}

/// Scans free text for `from <city>` / `to <city>` mentions.
pub fn route_from_text(text: &str) -> (Option<IataCode>, Option<IataCode>) {
    let normalized = text.to_ascii_lowercase();
    let mut origin = None;
    let mut destination = None;

    for (name, code) in CITY_CODES {
        if normalized.contains(&format!("from {name}")) {
            origin = IataCode::new(code).ok();
        }
        if normalized.contains(&format!("to {name}")) {
            destination = IataCode::new(code).ok();
        }
    }

    (origin, destination)
}

#[cfg(test)]
mod tests {
    use super::{city_to_iata, route_from_text};

    #[test]
    fn known_cities_resolve() {
        assert_eq!(city_to_iata("Boston").expect("code").as_str(), "BOS");
        assert_eq!(city_to_iata("new york").expect("code").as_str(), "JFK");
        assert!(city_to_iata("atlantis").is_none());
    }

    #[test]
    fn route_scan_finds_origin_and_destination() {
        let (origin, destination) = route_from_text("flights from Boston to Denver on March 5");
        assert_eq!(origin.expect("origin").as_str(), "BOS");
        assert_eq!(destination.expect("destination").as_str(), "DEN");
    }

    #[test]
    fn route_scan_tolerates_missing_sides() {
        let (origin, destination) = route_from_text("get me to London");
        assert!(origin.is_none());
        assert_eq!(destination.expect("destination").as_str(), "LHR");
    }
}

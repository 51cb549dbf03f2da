//! Classification of city/state strings ahead of geocoding: virtual and
//! placeholder values must not consume geocoding quota.

/// How a city value should be treated before geocoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CityClass {
    Geographic,
    /// A placeholder like "Unknown" (including common typos); the events
    /// fall back to state-level.
    Unknown,
    /// Virtual, national, or multi-location values that have no point
    /// coordinates at all.
    Virtual,
}

const UNKNOWN_PATTERNS: &[&str] = &["unknown", "unkown", "unknwn", "uknown"];

const VIRTUAL_PATTERNS: &[&str] = &[
    "national",
    "nationwide",
    "usa",
    "united states",
    "multiple",
    "various",
    "virtual",
    "online",
    "remote",
    "multi-state",
    "multistate",
    "multiple states",
    "everywhere",
    "anywhere",
    "n/a",
    "tbd",
    "multiple cities",
];

pub fn classify_city(city: &str) -> CityClass {
    let lowered = city.to_lowercase();
    if UNKNOWN_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return CityClass::Unknown;
    }
    if VIRTUAL_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return CityClass::Virtual;
    }
    CityClass::Geographic
}

/// State values go through the same screen.
pub fn state_is_virtual(state: &str) -> bool {
    classify_city(state) != CityClass::Geographic
}

const STATES: &[(&str, &str)] = &[
    ("AL", "alabama"),
    ("AK", "alaska"),
    ("AZ", "arizona"),
    ("AR", "arkansas"),
    ("CA", "california"),
    ("CO", "colorado"),
    ("CT", "connecticut"),
    ("DE", "delaware"),
    ("DC", "district of columbia"),
    ("FL", "florida"),
    ("GA", "georgia"),
    ("HI", "hawaii"),
    ("ID", "idaho"),
    ("IL", "illinois"),
    ("IN", "indiana"),
    ("IA", "iowa"),
    ("KS", "kansas"),
    ("KY", "kentucky"),
    ("LA", "louisiana"),
    ("ME", "maine"),
    ("MD", "maryland"),
    ("MA", "massachusetts"),
    ("MI", "michigan"),
    ("MN", "minnesota"),
    ("MS", "mississippi"),
    ("MO", "missouri"),
    ("MT", "montana"),
    ("NE", "nebraska"),
    ("NV", "nevada"),
    ("NH", "new hampshire"),
    ("NJ", "new jersey"),
    ("NM", "new mexico"),
    ("NY", "new york"),
    ("NC", "north carolina"),
    ("ND", "north dakota"),
    ("OH", "ohio"),
    ("OK", "oklahoma"),
    ("OR", "oregon"),
    ("PA", "pennsylvania"),
    ("RI", "rhode island"),
    ("SC", "south carolina"),
    ("SD", "south dakota"),
    ("TN", "tennessee"),
    ("TX", "texas"),
    ("UT", "utah"),
    ("VT", "vermont"),
    ("VA", "virginia"),
    ("WA", "washington"),
    ("WV", "west virginia"),
    ("WI", "wisconsin"),
    ("WY", "wyoming"),
];

/// Accepts two-letter codes and full names, case-insensitively.
pub fn is_valid_state(state: &str) -> bool {
    let trimmed = state.trim();
    if trimmed.is_empty() {
        return false;
    }
    let upper = trimmed.to_uppercase();
    let lower = trimmed.to_lowercase();
    STATES
        .iter()
        .any(|(abbr, name)| *abbr == upper || *name == lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_classification() {
        assert_eq!(classify_city("Mesa"), CityClass::Geographic);
        assert_eq!(classify_city("Unknown"), CityClass::Unknown);
        assert_eq!(classify_city("unkown city"), CityClass::Unknown);
        assert_eq!(classify_city("Nationwide"), CityClass::Virtual);
        assert_eq!(classify_city("Online"), CityClass::Virtual);
        assert_eq!(classify_city("Multiple Cities"), CityClass::Virtual);
        assert_eq!(classify_city("TBD"), CityClass::Virtual);
    }

    #[test]
    fn state_validity() {
        assert!(is_valid_state("AZ"));
        assert!(is_valid_state("az"));
        assert!(is_valid_state("Arizona"));
        assert!(is_valid_state("district of Columbia"));
        assert!(!is_valid_state("USA"));
        assert!(!is_valid_state("Nationwide"));
        assert!(!is_valid_state(""));
    }

    #[test]
    fn virtual_states() {
        assert!(state_is_virtual("USA"));
        assert!(state_is_virtual("Multi-State"));
        assert!(!state_is_virtual("Arizona"));
    }
}

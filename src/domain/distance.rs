//! Static trade-lane distance table.
//!
//! Benchmark distances (km) per country pair and transport mode. Lookups
//! are symmetric: the key is the sorted pair of lowercased names.

use super::entities::{CostError, Mode};

/// Countries with freight benchmark data, by canonical short name.
pub const FREIGHT_COUNTRIES: [&str; 4] = ["china", "india", "usa", "uk"];

const AIR_DISTANCES_KM: [((&str, &str), u32); 6] = [
    (("china", "india"), 3_800),
    (("china", "usa"), 11_000),
    (("china", "uk"), 8_100),
    (("india", "usa"), 12_500),
    (("india", "uk"), 7_200),
    (("uk", "usa"), 6_800),
];

const SEA_DISTANCES_KM: [((&str, &str), u32); 6] = [
    (("china", "india"), 9_000),
    (("china", "usa"), 20_000),
    (("china", "uk"), 19_500),
    (("india", "usa"), 19_000),
    (("india", "uk"), 11_000),
    (("uk", "usa"), 6_000),
];

/// Lowercase + trim a country name for table keys and route labels.
pub(crate) fn normalize_country(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Look up the distance (km) between two countries for a given mode.
/// Routes are symmetric — order doesn't matter.
pub fn route_distance(origin: &str, destination: &str, mode: Mode) -> Result<u32, CostError> {
    let mut pair = [normalize_country(origin), normalize_country(destination)];
    pair.sort();

    let table: &[((&str, &str), u32); 6] = match mode {
        Mode::Air => &AIR_DISTANCES_KM,
        Mode::Sea => &SEA_DISTANCES_KM,
    };

    table
        .iter()
        .find(|((a, b), _)| *a == pair[0] && *b == pair[1])
        .map(|(_, km)| *km)
        .ok_or_else(|| CostError::UnsupportedRoute {
            origin: origin.to_string(),
            destination: destination.to_string(),
            mode,
            supported: &FREIGHT_COUNTRIES,
        })
}

pub fn is_freight_country(name: &str) -> bool {
    let normalized = normalize_country(name);
    FREIGHT_COUNTRIES.contains(&normalized.as_str())
}

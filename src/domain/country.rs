//! Canonical country registry: short name ↔ ISO3 alpha ↔ UN numeric code.
//!
//! Every component resolves countries through this single entry point;
//! unknown names are an error, never a silent default.

use super::entities::CostError;

struct CountryRecord {
    iso3: &'static str,
    /// UN numeric code, required by the TRAINS SDMX endpoint.
    numeric: &'static str,
    /// Friendly lowercase names accepted as input.
    names: &'static [&'static str],
}

static REGISTRY: &[CountryRecord] = &[
    CountryRecord { iso3: "USA", numeric: "840", names: &["usa", "united states"] },
    CountryRecord { iso3: "IND", numeric: "356", names: &["india"] },
    CountryRecord { iso3: "GBR", numeric: "826", names: &["uk", "united kingdom"] },
    CountryRecord { iso3: "CHN", numeric: "156", names: &["china"] },
    CountryRecord { iso3: "FRA", numeric: "250", names: &["france"] },
    CountryRecord { iso3: "ARE", numeric: "784", names: &["uae", "united arab emirates"] },
    CountryRecord { iso3: "VNM", numeric: "704", names: &["vietnam"] },
    CountryRecord { iso3: "DEU", numeric: "276", names: &["germany"] },
    CountryRecord { iso3: "JPN", numeric: "392", names: &["japan"] },
    CountryRecord { iso3: "KOR", numeric: "410", names: &["south korea"] },
    CountryRecord { iso3: "BRA", numeric: "076", names: &["brazil"] },
    CountryRecord { iso3: "CAN", numeric: "124", names: &["canada"] },
    CountryRecord { iso3: "AUS", numeric: "036", names: &["australia"] },
    CountryRecord { iso3: "IDN", numeric: "360", names: &["indonesia"] },
    CountryRecord { iso3: "MEX", numeric: "484", names: &["mexico"] },
    CountryRecord { iso3: "TUR", numeric: "792", names: &["turkey"] },
    CountryRecord { iso3: "ZAF", numeric: "710", names: &["south africa"] },
    CountryRecord { iso3: "SAU", numeric: "682", names: &["saudi arabia"] },
    CountryRecord { iso3: "THA", numeric: "764", names: &["thailand"] },
    CountryRecord { iso3: "MYS", numeric: "458", names: &["malaysia"] },
    CountryRecord { iso3: "SGP", numeric: "702", names: &["singapore"] },
    CountryRecord { iso3: "NLD", numeric: "528", names: &["netherlands"] },
    CountryRecord { iso3: "ITA", numeric: "380", names: &["italy"] },
    CountryRecord { iso3: "ESP", numeric: "724", names: &["spain"] },
    CountryRecord { iso3: "BEL", numeric: "056", names: &["belgium"] },
    CountryRecord { iso3: "POL", numeric: "616", names: &["poland"] },
    CountryRecord { iso3: "SWE", numeric: "752", names: &["sweden"] },
    CountryRecord { iso3: "CHE", numeric: "756", names: &["switzerland"] },
    CountryRecord { iso3: "NGA", numeric: "566", names: &["nigeria"] },
    CountryRecord { iso3: "EGY", numeric: "818", names: &["egypt"] },
    CountryRecord { iso3: "BGD", numeric: "050", names: &["bangladesh"] },
    CountryRecord { iso3: "PAK", numeric: "586", names: &["pakistan"] },
    CountryRecord { iso3: "PHL", numeric: "608", names: &["philippines"] },
    CountryRecord { iso3: "ARG", numeric: "032", names: &["argentina"] },
    CountryRecord { iso3: "COL", numeric: "170", names: &["colombia"] },
    CountryRecord { iso3: "CHL", numeric: "152", names: &["chile"] },
    CountryRecord { iso3: "PER", numeric: "604", names: &["peru"] },
    CountryRecord { iso3: "NZL", numeric: "554", names: &["new zealand"] },
    CountryRecord { iso3: "RUS", numeric: "643", names: &["russia"] },
    CountryRecord { iso3: "WLD", numeric: "000", names: &["world"] },
];

/// A resolved country. Cheap to copy; backed by the static registry.
#[derive(Clone, Copy)]
pub struct Country {
    record: &'static CountryRecord,
}

impl Country {
    /// Resolve an ISO3 code (any case) or a friendly name.
    pub fn resolve(input: &str) -> Result<Country, CostError> {
        let trimmed = input.trim();
        let upper = trimmed.to_uppercase();
        if let Some(record) = REGISTRY.iter().find(|record| record.iso3 == upper) {
            return Ok(Country { record });
        }
        let lower = trimmed.to_lowercase();
        REGISTRY
            .iter()
            .find(|record| record.names.contains(&lower.as_str()))
            .map(|record| Country { record })
            .ok_or_else(|| CostError::UnknownCountry {
                name: input.to_string(),
            })
    }

    pub fn iso3(&self) -> &'static str {
        self.record.iso3
    }

    pub fn numeric(&self) -> &'static str {
        self.record.numeric
    }

    /// The primary friendly name, falling back to the ISO3 code.
    pub fn name(&self) -> &'static str {
        self.record.names.first().copied().unwrap_or(self.record.iso3)
    }
}

impl std::fmt::Debug for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Country")
            .field("iso3", &self.record.iso3)
            .field("numeric", &self.record.numeric)
            .finish()
    }
}

impl PartialEq for Country {
    fn eq(&self, other: &Self) -> bool {
        self.record.iso3 == other.record.iso3
    }
}

impl Eq for Country {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_iso3_any_case() {
        assert_eq!(Country::resolve("usa").unwrap().iso3(), "USA");
        assert_eq!(Country::resolve("GbR").unwrap().iso3(), "GBR");
    }

    #[test]
    fn resolves_friendly_names() {
        assert_eq!(Country::resolve("united kingdom").unwrap().iso3(), "GBR");
        assert_eq!(Country::resolve(" China ").unwrap().numeric(), "156");
        assert_eq!(Country::resolve("south korea").unwrap().iso3(), "KOR");
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = Country::resolve("atlantis").unwrap_err();
        assert!(matches!(err, CostError::UnknownCountry { .. }));
    }

    #[test]
    fn numeric_codes_keep_leading_zeros() {
        assert_eq!(Country::resolve("brazil").unwrap().numeric(), "076");
        assert_eq!(Country::resolve("australia").unwrap().numeric(), "036");
        assert_eq!(Country::resolve("WLD").unwrap().numeric(), "000");
    }
}

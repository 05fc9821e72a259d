use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Margins below this are floating-point jitter, not a real preference.
pub const PREFERENCE_NOISE_THRESHOLD: f64 = 0.01;

#[derive(Debug, Error)]
pub enum CostError {
    #[error("unknown country '{name}'; use ISO3 codes (e.g. 'USA') or names (e.g. 'united states')")]
    UnknownCountry { name: String },
    #[error("no {mode} route found for {origin} → {destination}; supported countries: {supported:?}")]
    UnsupportedRoute {
        origin: String,
        destination: String,
        mode: Mode,
        supported: &'static [&'static str],
    },
    #[error("invalid mode '{given}'; choose 'air' or 'sea'")]
    InvalidMode { given: String },
    #[error("invalid HS code '{given}'; expected up to six digits")]
    InvalidHsCode { given: String },
    #[error("tariff rate must be non-negative, got {rate}")]
    InvalidTariffRate { rate: f64 },
}

/// Transport mode for a trade lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Air,
    Sea,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Air, Mode::Sea];

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Air => "air",
            Mode::Sea => "sea",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = CostError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "air" => Ok(Mode::Air),
            "sea" => Ok(Mode::Sea),
            _ => Err(CostError::InvalidMode {
                given: input.to_string(),
            }),
        }
    }
}

/// A 6-digit Harmonized System code, left-padded with zeros.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hs6(String);

impl Hs6 {
    pub fn parse(input: &str) -> Result<Self, CostError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > 6 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(CostError::InvalidHsCode {
                given: input.to_string(),
            });
        }
        Ok(Self(format!("{trimmed:0>6}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 2-digit HS chapter (first two digits of the code).
    pub fn chapter(&self) -> u8 {
        self.0[..2].parse().unwrap_or(0)
    }
}

impl fmt::Display for Hs6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which backing data source produced a tariff rate.
///
/// Granular (HS-6) and category-average results must stay distinguishable
/// downstream, so the source travels with every quote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSource {
    #[serde(rename = "trains")]
    Trains,
    #[serde(rename = "tradestats-tariff")]
    TradestatsTariff,
    #[serde(rename = "csv-dataset")]
    CsvDataset,
}

impl RateSource {
    pub fn label(&self) -> &'static str {
        match self {
            RateSource::Trains => "trains",
            RateSource::TradestatsTariff => "tradestats-tariff",
            RateSource::CsvDataset => "csv-dataset",
        }
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One of the 16 broad WITS product groups, addressed by HS chapter range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProductGroup {
    pub id: &'static str,
    pub label: &'static str,
}

/// HS chapter ranges → WITS product group IDs used by the aggregate endpoint.
const PRODUCT_GROUPS: [(u8, u8, ProductGroup); 16] = [
    (1, 5, ProductGroup { id: "01-05_Animal", label: "Animal Products" }),
    (6, 15, ProductGroup { id: "06-15_Vegetable", label: "Vegetable Products" }),
    (16, 24, ProductGroup { id: "16-24_FoodProd", label: "Food Products" }),
    (25, 26, ProductGroup { id: "25-26_Minerals", label: "Minerals" }),
    (27, 27, ProductGroup { id: "27-27_Fuels", label: "Fuels" }),
    (28, 38, ProductGroup { id: "28-38_Chemicals", label: "Chemicals" }),
    (39, 40, ProductGroup { id: "39-40_PlastiRub", label: "Plastic or Rubber" }),
    (41, 43, ProductGroup { id: "41-43_HidesSkin", label: "Hides and Skins" }),
    (44, 49, ProductGroup { id: "44-49_Wood", label: "Wood Products" }),
    (50, 63, ProductGroup { id: "50-63_TextCloth", label: "Textiles and Clothing" }),
    (64, 67, ProductGroup { id: "64-67_Footwear", label: "Footwear" }),
    (68, 71, ProductGroup { id: "68-71_StoneGlas", label: "Stone and Glass" }),
    (72, 83, ProductGroup { id: "72-83_Metals", label: "Metals" }),
    (84, 85, ProductGroup { id: "84-85_MachElec", label: "Machinery and Electronics" }),
    (86, 89, ProductGroup { id: "86-89_Transport", label: "Transportation" }),
    (90, 99, ProductGroup { id: "90-99_Miscellan", label: "Miscellaneous" }),
];

impl ProductGroup {
    /// Map an HS chapter to its product group. Chapter 0 has no group.
    pub fn for_chapter(chapter: u8) -> Option<ProductGroup> {
        PRODUCT_GROUPS
            .iter()
            .find(|(lo, hi, _)| *lo <= chapter && chapter <= *hi)
            .map(|(_, _, group)| *group)
    }

    pub fn all() -> impl Iterator<Item = ProductGroup> {
        PRODUCT_GROUPS.iter().map(|(_, _, group)| *group)
    }
}

/// Tariff indicators available on the aggregate endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TariffIndicator {
    MfnWeightedAverage,
    MfnSimpleAverage,
    AhsWeightedAverage,
    AhsSimpleAverage,
    BoundWeightedAverage,
    BoundSimpleAverage,
}

impl TariffIndicator {
    pub fn code(&self) -> &'static str {
        match self {
            TariffIndicator::MfnWeightedAverage => "MFN-WGHTD-AVRG",
            TariffIndicator::MfnSimpleAverage => "MFN-SMPL-AVRG",
            TariffIndicator::AhsWeightedAverage => "AHS-WGHTD-AVRG",
            TariffIndicator::AhsSimpleAverage => "AHS-SMPL-AVRG",
            TariffIndicator::BoundWeightedAverage => "BND-WGHTD-AVRG",
            TariffIndicator::BoundSimpleAverage => "BND-SMPL-AVRG",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TariffIndicator::MfnWeightedAverage => "MFN Weighted Average (%)",
            TariffIndicator::MfnSimpleAverage => "MFN Simple Average (%)",
            TariffIndicator::AhsWeightedAverage => "AHS Weighted Average (%)",
            TariffIndicator::AhsSimpleAverage => "AHS Simple Average (%)",
            TariffIndicator::BoundWeightedAverage => "Bound Weighted Average (%)",
            TariffIndicator::BoundSimpleAverage => "Bound Simple Average (%)",
        }
    }
}

/// A resolved tariff rate plus its provenance.
///
/// Constructed fresh per lookup; the engine never caches quotes itself
/// (any caching belongs to the backing data provider).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TariffQuote {
    pub tariff_rate: f64,
    pub hs_code: Hs6,
    pub reporter: String,
    pub partner: String,
    pub year: i32,
    pub source: RateSource,
    pub product_group: Option<ProductGroup>,
    pub mfn_rate: Option<f64>,
    pub preference_margin: Option<f64>,
    pub has_preference: bool,
}

/// Full landed-cost breakdown for a single route.
///
/// Invariant: `total_landed_cost` is the sum of product value, shipping
/// cost, and import duty, each rounded to 2 decimal places before summation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandedCostResult {
    pub route: String,
    pub mode: Mode,
    pub distance_km: u32,
    pub distance_factor: f64,
    pub weight_kg: f64,
    pub shipping_cost: f64,
    pub tariff_rate: f64,
    pub import_duty: f64,
    pub total_landed_cost: f64,
}

/// A landed-cost result enriched with tariff provenance, used when
/// ranking candidate origins.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub origin: String,
    pub product_description: Option<String>,
    pub hs_code: Hs6,
    pub applied_tariff: f64,
    pub mfn_rate: Option<f64>,
    pub preference_margin: Option<f64>,
    pub has_preference: bool,
    pub source: RateSource,
    #[serde(flatten)]
    pub cost: LandedCostResult,
}

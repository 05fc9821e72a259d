//! Landed-cost and tariff comparison engine for cross-border trade routes.
//!
//! - Deterministic freight and duty arithmetic over a benchmark distance
//!   table (see [`domain::freight`] and [`domain::distance`]).
//! - Multi-source tariff rate resolution with ordered fallback
//!   ([`domain::resolver`]), backed by the WITS SDMX API
//!   ([`infra::wits`]) or an embedded offline dataset
//!   ([`infra::dataset`]).
//! - Cross-origin sourcing comparison and tariff policy-shock
//!   simulation ([`domain::comparison`], [`domain::shock`]).

pub mod domain;
pub mod infra;

pub use domain::{
    calculate_landed_cost, classify_and_compare, compare_origins, resolve_and_calculate,
    simulate_policy_shock, ComparisonReport, ComparisonRequest, ComparisonRow, CostError, Hs6,
    LandedCostResult, Mode, RateResolver, RateSource, ShockPolicy, ShockReport, ShockRequest,
    TariffProvider, TariffQuote,
};
pub use infra::{TariffDataset, WitsClient};

//! Embedded static tariff dataset for offline and historical lookups.
//!
//! A pre-cleaned snapshot keyed by (HS code, reporter, year), shipped
//! inside the binary. It is a same-priority alternative to the live
//! granular source — never merged with it within a single query.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use rust_embed::RustEmbed;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::country::Country;
use crate::domain::entities::{Hs6, ProductGroup, RateSource, TariffIndicator};
use crate::domain::resolver::{ProviderError, TariffProvider};

/// Embed the entire `data/` directory into the binary.
#[derive(RustEmbed)]
#[folder = "data"]
struct EmbeddedData;

const DATASET_FILE: &str = "tariff_rates.json";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("embedded dataset {0} is missing")]
    Missing(&'static str),
    #[error("dataset is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("dataset record rejected: {0}")]
    InvalidRecord(String),
}

/// One dataset row as stored on disk.
#[derive(Clone, Debug, Deserialize)]
pub struct DatasetRecord {
    pub hs_code: String,
    pub reporter: String,
    pub year: i32,
    pub tariff_rate: f64,
}

/// The parsed dataset, keyed for direct lookup.
pub struct TariffDataset {
    rows: HashMap<(Hs6, &'static str, i32), f64>,
}

impl TariffDataset {
    /// The dataset shipped with the crate. Parsed once; the embedded
    /// snapshot is versioned with the code, so a malformed one is a
    /// build defect.
    pub fn bundled() -> Arc<TariffDataset> {
        static DATASET: OnceLock<Arc<TariffDataset>> = OnceLock::new();
        Arc::clone(DATASET.get_or_init(|| {
            Arc::new(
                Self::load_embedded()
                    .unwrap_or_else(|err| panic!("embedded tariff dataset is invalid: {err}")),
            )
        }))
    }

    fn load_embedded() -> Result<Self, DatasetError> {
        let file = EmbeddedData::get(DATASET_FILE).ok_or(DatasetError::Missing(DATASET_FILE))?;
        let records: Vec<DatasetRecord> = serde_json::from_slice(&file.data)?;
        Self::from_records(records)
    }

    /// Build a dataset from records, canonicalizing HS codes and
    /// reporter countries on the way in.
    pub fn from_records(records: Vec<DatasetRecord>) -> Result<Self, DatasetError> {
        let mut rows = HashMap::with_capacity(records.len());
        for record in records {
            let hs = Hs6::parse(&record.hs_code)
                .map_err(|err| DatasetError::InvalidRecord(err.to_string()))?;
            let reporter = Country::resolve(&record.reporter)
                .map_err(|err| DatasetError::InvalidRecord(err.to_string()))?;
            rows.insert((hs, reporter.iso3(), record.year), record.tariff_rate);
        }
        Ok(Self { rows })
    }

    /// Direct match on (HS code, reporter, year).
    pub fn rate(&self, hs6: &Hs6, reporter: &Country, year: i32) -> Option<f64> {
        self.rows.get(&(hs6.clone(), reporter.iso3(), year)).copied()
    }

    /// Countries that carry a rate for the given HS code, sorted.
    pub fn available_countries(&self, hs6: &Hs6) -> Vec<&'static str> {
        let mut countries: Vec<&'static str> = self
            .rows
            .keys()
            .filter(|(code, _, _)| code == hs6)
            .map(|(_, reporter, _)| *reporter)
            .collect();
        countries.sort_unstable();
        countries.dedup();
        countries
    }

    /// Years available for an HS code + reporter, sorted.
    pub fn available_years(&self, hs6: &Hs6, reporter: &Country) -> Vec<i32> {
        let mut years: Vec<i32> = self
            .rows
            .keys()
            .filter(|(code, iso3, _)| code == hs6 && *iso3 == reporter.iso3())
            .map(|(_, _, year)| *year)
            .collect();
        years.sort_unstable();
        years
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl TariffProvider for TariffDataset {
    fn granular_source(&self) -> RateSource {
        RateSource::CsvDataset
    }

    // The snapshot has no partner dimension; rates are keyed by the
    // importing side only, and the partner is provenance in the quote.
    async fn lookup_hs6(
        &self,
        hs6: &Hs6,
        reporter: &Country,
        _partner: &Country,
        year: i32,
    ) -> Result<Option<f64>, ProviderError> {
        Ok(self.rate(hs6, reporter, year))
    }

    /// The dataset has no aggregate tier.
    async fn lookup_category(
        &self,
        _group: ProductGroup,
        _reporter: &Country,
        _partner: &Country,
        _year: i32,
        _indicator: TariffIndicator,
    ) -> Result<Option<f64>, ProviderError> {
        Ok(None)
    }
}

//! Thin asynchronous client for the World Bank WITS SDMX API.
//!
//! - TradeStats-Tariff endpoint: aggregate rates per broad product group
//!   (reliable, ISO3 path segments).
//! - TRN/TRAINS endpoint: HS-6 granularity, UN numeric path segments.
//!   Intermittently unavailable on the WITS side.
//! - Maintains a 60-minute in-memory cache with stale fallbacks, plus a
//!   persistent category-rate cache shared across runs.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::country::Country;
use crate::domain::entities::{Hs6, ProductGroup, RateSource, TariffIndicator};
use crate::domain::freight::round4;
use crate::domain::resolver::{CategoryRate, ProviderError, TariffProvider};
use crate::infra::cache::{load_rate_cache, save_rate_cache, RateCache};

const TRADESTATS_BASE: &str =
    "https://wits.worldbank.org/API/V1/SDMX/V21/datasource/tradestats-tariff/";
const TRAINS_BASE: &str = "https://wits.worldbank.org/API/V1/SDMX/V21/datasource/TRN/";
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str = "tariff-cost-scanner/1.0.0";

/// Product segment that returns every group in one response.
const ALL_PRODUCTS: &str = "all";

#[derive(Debug, Error)]
pub enum WitsClientError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed SDMX payload: {0}")]
    Sdmx(String),
}

impl From<WitsClientError> for ProviderError {
    fn from(value: WitsClientError) -> Self {
        match value {
            WitsClientError::Sdmx(message) => ProviderError::Malformed(message),
            other => ProviderError::Transport(other.to_string()),
        }
    }
}

type GranularKey = (String, &'static str, &'static str, i32);
type CategoryKey = (String, &'static str, &'static str, i32, &'static str);

#[derive(Default)]
struct WitsCache {
    granular: HashMap<GranularKey, Cached<f64>>,
    category: HashMap<CategoryKey, Cached<Vec<CategoryRate>>>,
}

#[derive(Clone)]
pub struct WitsClient {
    http: Client,
    tradestats_base: Url,
    trains_base: Url,
    cache: Arc<Mutex<WitsCache>>,
    disk: Arc<Mutex<Option<RateCache>>>,
    use_disk_cache: bool,
    ttl: Duration,
}

impl WitsClient {
    pub fn new() -> Result<Self, WitsClientError> {
        Self::with_base_urls(TRADESTATS_BASE, TRAINS_BASE)
    }

    /// Base URLs must end with a trailing slash so path joins append.
    pub fn with_base_urls(tradestats: &str, trains: &str) -> Result<Self, WitsClientError> {
        let tradestats_base = Url::parse(tradestats)?;
        let trains_base = Url::parse(trains)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            tradestats_base,
            trains_base,
            cache: Arc::new(Mutex::new(WitsCache::default())),
            disk: Arc::new(Mutex::new(None)),
            use_disk_cache: true,
            ttl: DEFAULT_TTL,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Skip the persistent category-rate cache (e.g. in tests).
    pub fn without_disk_cache(mut self) -> Self {
        self.use_disk_cache = false;
        self
    }

    /// Fetch a tariff rate at HS-6 granularity from the TRAINS endpoint.
    ///
    /// `Ok(None)` means the endpoint answered but carries no observation
    /// for this key — absence is not cached because the endpoint itself
    /// is intermittent.
    pub async fn hs6_rate(
        &self,
        hs6: &Hs6,
        reporter: &Country,
        partner: &Country,
        year: i32,
    ) -> Result<Option<f64>, WitsClientError> {
        let key: GranularKey = (
            hs6.as_str().to_string(),
            reporter.iso3(),
            partner.iso3(),
            year,
        );
        if let Some(rate) = self.cached_granular(&key).await {
            debug!(hs = %hs6, year, "serving cached TRAINS rate");
            return Ok(Some(rate));
        }

        let mut url = self.trains_base.join(&format!(
            "reporter/{}/partner/{}/product/{}/year/{}/datatype/reported",
            reporter.numeric(),
            partner.numeric(),
            hs6,
            year
        ))?;
        url.query_pairs_mut().append_pair("format", "JSON");

        debug!(%url, "requesting WITS TRAINS rate");
        match self.fetch_sdmx(url).await {
            Ok(document) => {
                let rate = first_observation(&document)?;
                if let Some(rate) = rate {
                    self.store_granular(key, rate).await;
                }
                Ok(rate)
            }
            Err(err) => {
                if let Some(stale) = self.stale_granular(&key).await {
                    warn!(%err, "TRAINS request failed, serving stale rate");
                    return Ok(Some(stale));
                }
                Err(err)
            }
        }
    }

    /// Fetch aggregate rates from the TradeStats-Tariff endpoint for one
    /// product group, or all of them via [`ALL_PRODUCTS`].
    pub async fn category_rates(
        &self,
        reporter: &Country,
        partner: &Country,
        year: i32,
        product: &str,
        indicator: TariffIndicator,
    ) -> Result<Vec<CategoryRate>, WitsClientError> {
        let key: CategoryKey = (
            product.to_string(),
            reporter.iso3(),
            partner.iso3(),
            year,
            indicator.code(),
        );
        if let Some(rows) = self.cached_category(&key).await {
            debug!(product, year, "serving cached TradeStats rates");
            return Ok(rows);
        }

        let mut url = self.tradestats_base.join(&format!(
            "reporter/{}/year/{}/partner/{}/product/{}/indicator/{}",
            reporter.iso3().to_lowercase(),
            year,
            partner.iso3().to_lowercase(),
            product,
            indicator.code()
        ))?;
        url.query_pairs_mut().append_pair("format", "JSON");

        debug!(%url, "requesting WITS TradeStats rates");
        match self.fetch_sdmx(url).await {
            Ok(document) => {
                let rows = parse_category_rates(&document, reporter, partner, year, indicator)?;
                self.store_category(key, rows.clone()).await;
                Ok(rows)
            }
            Err(err) => {
                if let Some(stale) = self.stale_category(&key).await {
                    warn!(%err, "TradeStats request failed, serving stale rates");
                    return Ok(stale);
                }
                Err(err)
            }
        }
    }

    /// Aggregate rate for a single product group, with write-through to
    /// the persistent cache.
    pub async fn category_rate(
        &self,
        group: ProductGroup,
        reporter: &Country,
        partner: &Country,
        year: i32,
        indicator: TariffIndicator,
    ) -> Result<Option<f64>, WitsClientError> {
        let disk_key = format!(
            "{}:{}:{}:{}:{}",
            reporter.iso3().to_lowercase(),
            partner.iso3().to_lowercase(),
            year,
            group.id,
            indicator.code()
        );
        if let Some(rate) = self.disk_get(&disk_key).await {
            debug!(group = group.id, year, "serving persisted category rate");
            return Ok(Some(rate));
        }

        let rows = self
            .category_rates(reporter, partner, year, group.id, indicator)
            .await?;
        let rate = rows.first().map(|row| row.tariff_rate);
        if let Some(rate) = rate {
            self.disk_put(disk_key, rate).await;
        }
        Ok(rate)
    }

    async fn fetch_sdmx(&self, url: Url) -> Result<SdmxDocument, WitsClientError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json::<SdmxDocument>().await?)
    }

    async fn cached_granular(&self, key: &GranularKey) -> Option<f64> {
        let cache = self.cache.lock().await;
        cache.granular.get(key).and_then(|entry| entry.if_fresh(self.ttl))
    }

    async fn stale_granular(&self, key: &GranularKey) -> Option<f64> {
        let cache = self.cache.lock().await;
        cache.granular.get(key).map(Cached::stale)
    }

    async fn store_granular(&self, key: GranularKey, rate: f64) {
        let mut cache = self.cache.lock().await;
        cache.granular.insert(key, Cached::new(rate, SystemTime::now()));
    }

    async fn cached_category(&self, key: &CategoryKey) -> Option<Vec<CategoryRate>> {
        let cache = self.cache.lock().await;
        cache.category.get(key).and_then(|entry| entry.if_fresh(self.ttl))
    }

    async fn stale_category(&self, key: &CategoryKey) -> Option<Vec<CategoryRate>> {
        let cache = self.cache.lock().await;
        cache.category.get(key).map(Cached::stale)
    }

    async fn store_category(&self, key: CategoryKey, rows: Vec<CategoryRate>) {
        let mut cache = self.cache.lock().await;
        cache.category.insert(key, Cached::new(rows, SystemTime::now()));
    }

    async fn disk_get(&self, key: &str) -> Option<f64> {
        if !self.use_disk_cache {
            return None;
        }
        let mut guard = self.disk.lock().await;
        if guard.is_none() {
            *guard = Some(load_rate_cache().unwrap_or_default());
        }
        guard.as_ref().and_then(|cache| cache.get(key))
    }

    async fn disk_put(&self, key: String, rate: f64) {
        if !self.use_disk_cache {
            return;
        }
        let mut guard = self.disk.lock().await;
        if guard.is_none() {
            *guard = Some(load_rate_cache().unwrap_or_default());
        }
        if let Some(cache) = guard.as_mut() {
            cache.insert(key, rate);
            if let Err(err) = save_rate_cache(cache) {
                warn!(%err, "failed to persist rate cache");
            }
        }
    }
}

#[async_trait]
impl TariffProvider for WitsClient {
    fn granular_source(&self) -> RateSource {
        RateSource::Trains
    }

    async fn lookup_hs6(
        &self,
        hs6: &Hs6,
        reporter: &Country,
        partner: &Country,
        year: i32,
    ) -> Result<Option<f64>, ProviderError> {
        self.hs6_rate(hs6, reporter, partner, year)
            .await
            .map_err(ProviderError::from)
    }

    async fn lookup_category(
        &self,
        group: ProductGroup,
        reporter: &Country,
        partner: &Country,
        year: i32,
        indicator: TariffIndicator,
    ) -> Result<Option<f64>, ProviderError> {
        self.category_rate(group, reporter, partner, year, indicator)
            .await
            .map_err(ProviderError::from)
    }

    async fn category_rates(
        &self,
        reporter: &Country,
        partner: &Country,
        year: i32,
        indicator: TariffIndicator,
    ) -> Result<Vec<CategoryRate>, ProviderError> {
        WitsClient::category_rates(self, reporter, partner, year, ALL_PRODUCTS, indicator)
            .await
            .map_err(ProviderError::from)
    }
}

struct Cached<T> {
    value: T,
    fetched_at: SystemTime,
}

impl<T: Clone> Cached<T> {
    fn new(value: T, fetched_at: SystemTime) -> Self {
        Self { value, fetched_at }
    }

    fn if_fresh(&self, ttl: Duration) -> Option<T> {
        if self
            .fetched_at
            .elapsed()
            .map(|elapsed| elapsed <= ttl)
            .unwrap_or(false)
        {
            Some(self.value.clone())
        } else {
            None
        }
    }

    fn stale(&self) -> T {
        self.value.clone()
    }
}

// ── SDMX envelope ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SdmxDocument {
    #[serde(rename = "dataSets", default)]
    data_sets: Vec<SdmxDataSet>,
    #[serde(default)]
    structure: Option<SdmxStructure>,
}

#[derive(Debug, Deserialize)]
struct SdmxDataSet {
    #[serde(default)]
    series: HashMap<String, SdmxSeries>,
}

#[derive(Debug, Deserialize)]
struct SdmxSeries {
    #[serde(default)]
    observations: HashMap<String, Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct SdmxStructure {
    #[serde(default)]
    dimensions: SdmxDimensions,
}

#[derive(Debug, Default, Deserialize)]
struct SdmxDimensions {
    #[serde(default)]
    series: Vec<SdmxDimension>,
}

#[derive(Debug, Deserialize)]
struct SdmxDimension {
    id: String,
    #[serde(default)]
    values: Vec<SdmxDimensionValue>,
}

#[derive(Debug, Deserialize)]
struct SdmxDimensionValue {
    id: String,
    name: String,
}

/// First observation of the first series, if any. Used for the TRAINS
/// endpoint where one series carries the single requested rate.
fn first_observation(document: &SdmxDocument) -> Result<Option<f64>, WitsClientError> {
    let Some(data_set) = document.data_sets.first() else {
        return Ok(None);
    };
    for series in data_set.series.values() {
        if let Some(values) = series.observations.get("0") {
            return observation_value(values).map(Some);
        }
    }
    Ok(None)
}

/// Expand every series of a TradeStats response into category rows,
/// resolving each series key against the PRODUCTCODE dimension.
fn parse_category_rates(
    document: &SdmxDocument,
    reporter: &Country,
    partner: &Country,
    year: i32,
    indicator: TariffIndicator,
) -> Result<Vec<CategoryRate>, WitsClientError> {
    let Some(data_set) = document.data_sets.first() else {
        return Ok(Vec::new());
    };
    if data_set.series.is_empty() {
        return Ok(Vec::new());
    }

    let dimensions = document
        .structure
        .as_ref()
        .map(|structure| structure.dimensions.series.as_slice())
        .unwrap_or_default();
    let (product_index, product_dimension) = dimensions
        .iter()
        .enumerate()
        .find(|(_, dimension)| dimension.id == "PRODUCTCODE")
        .ok_or_else(|| WitsClientError::Sdmx("missing PRODUCTCODE dimension".to_string()))?;

    let mut rows = Vec::with_capacity(data_set.series.len());
    for (series_key, series) in &data_set.series {
        let value_index: usize = series_key
            .split(':')
            .nth(product_index)
            .and_then(|part| part.parse().ok())
            .ok_or_else(|| {
                WitsClientError::Sdmx(format!("unparseable series key '{series_key}'"))
            })?;
        let product = product_dimension.values.get(value_index).ok_or_else(|| {
            WitsClientError::Sdmx(format!("series key '{series_key}' out of dimension range"))
        })?;

        // Series without a first observation are silently absent upstream.
        let Some(values) = series.observations.get("0") else {
            continue;
        };
        let rate = observation_value(values)?;

        rows.push(CategoryRate {
            product_group: product.id.clone(),
            product_label: product.name.clone(),
            tariff_rate: round4(rate),
            reporter: reporter.iso3().to_string(),
            partner: partner.iso3().to_string(),
            year,
            indicator,
        });
    }

    rows.sort_by(|a, b| a.product_group.cmp(&b.product_group));
    Ok(rows)
}

fn observation_value(values: &[serde_json::Value]) -> Result<f64, WitsClientError> {
    match values.first() {
        Some(serde_json::Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| WitsClientError::Sdmx("non-finite observation".to_string())),
        Some(serde_json::Value::String(text)) => text
            .parse::<f64>()
            .map_err(|_| WitsClientError::Sdmx(format!("non-numeric observation '{text}'"))),
        other => Err(WitsClientError::Sdmx(format!(
            "unexpected observation value: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn countries() -> (Country, Country) {
        (
            Country::resolve("usa").unwrap(),
            Country::resolve("china").unwrap(),
        )
    }

    #[test]
    fn trains_payload_yields_first_observation() {
        let document: SdmxDocument = serde_json::from_value(json!({
            "dataSets": [{
                "series": {
                    "0:0:0:0": { "observations": { "0": [6.5, 0, 0] } }
                }
            }]
        }))
        .unwrap();

        assert_eq!(first_observation(&document).unwrap(), Some(6.5));
    }

    #[test]
    fn empty_trains_payload_is_no_data() {
        let document: SdmxDocument = serde_json::from_value(json!({ "dataSets": [] })).unwrap();
        assert_eq!(first_observation(&document).unwrap(), None);

        let document: SdmxDocument =
            serde_json::from_value(json!({ "dataSets": [{ "series": {} }] })).unwrap();
        assert_eq!(first_observation(&document).unwrap(), None);
    }

    #[test]
    fn category_payload_resolves_product_dimension() {
        let (reporter, partner) = countries();
        let document: SdmxDocument = serde_json::from_value(json!({
            "dataSets": [{
                "series": {
                    "0:0:0": { "observations": { "0": [3.25] } },
                    "0:1:0": { "observations": { "0": ["7.5"] } }
                }
            }],
            "structure": {
                "dimensions": {
                    "series": [
                        { "id": "FREQ", "values": [{ "id": "A", "name": "Annual" }] },
                        { "id": "PRODUCTCODE", "values": [
                            { "id": "84-85_MachElec", "name": "Machinery and Electronics" },
                            { "id": "01-05_Animal", "name": "Animal Products" }
                        ]},
                        { "id": "REPORTER", "values": [{ "id": "840", "name": "USA" }] }
                    ]
                }
            }
        }))
        .unwrap();

        let rows = parse_category_rates(
            &document,
            &reporter,
            &partner,
            2025,
            TariffIndicator::AhsWeightedAverage,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        // Sorted by group id for deterministic output.
        assert_eq!(rows[0].product_group, "01-05_Animal");
        assert_eq!(rows[0].tariff_rate, 7.5);
        assert_eq!(rows[1].product_group, "84-85_MachElec");
        assert_eq!(rows[1].tariff_rate, 3.25);
        assert_eq!(rows[1].reporter, "USA");
        assert_eq!(rows[1].partner, "CHN");
    }

    #[test]
    fn missing_product_dimension_is_a_decode_error() {
        let (reporter, partner) = countries();
        let document: SdmxDocument = serde_json::from_value(json!({
            "dataSets": [{
                "series": { "0:0": { "observations": { "0": [1.0] } } }
            }],
            "structure": { "dimensions": { "series": [
                { "id": "FREQ", "values": [] }
            ]}}
        }))
        .unwrap();

        let err = parse_category_rates(
            &document,
            &reporter,
            &partner,
            2025,
            TariffIndicator::MfnSimpleAverage,
        )
        .unwrap_err();
        assert!(matches!(err, WitsClientError::Sdmx(_)));
    }

    #[test]
    fn empty_category_payload_is_no_rows() {
        let (reporter, partner) = countries();
        let document: SdmxDocument = serde_json::from_value(json!({ "dataSets": [] })).unwrap();
        let rows = parse_category_rates(
            &document,
            &reporter,
            &partner,
            2025,
            TariffIndicator::AhsWeightedAverage,
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn observation_values_accept_numbers_and_strings() {
        assert_eq!(observation_value(&[json!(4.2)]).unwrap(), 4.2);
        assert_eq!(observation_value(&[json!("4.2")]).unwrap(), 4.2);
        assert!(observation_value(&[json!(null)]).is_err());
        assert!(observation_value(&[]).is_err());
    }
}

//! Tariff rate resolution with ordered fallback.
//!
//! - Granular HS-6 lookups are tried for the requested year, then one and
//!   two years back (publication of the newest year frequently lags).
//! - When granular data is exhausted, the HS chapter's product group is
//!   queried for a category-level average instead.
//! - The fallback order is an explicit strategy list, not control flow,
//!   so callers and tests can inspect it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::country::Country;
use super::entities::{
    CostError, Hs6, ProductGroup, RateSource, TariffIndicator, TariffQuote,
    PREFERENCE_NOISE_THRESHOLD,
};
use super::freight::round4;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider transport failure: {0}")]
    Transport(String),
    #[error("provider returned malformed data: {0}")]
    Malformed(String),
}

/// One aggregate tariff observation for a product group.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryRate {
    pub product_group: String,
    pub product_label: String,
    pub tariff_rate: f64,
    pub reporter: String,
    pub partner: String,
    pub year: i32,
    pub indicator: TariffIndicator,
}

/// Backing tariff data source. Implementations are injected into the
/// resolver; the engine never reaches for a global client.
#[async_trait]
pub trait TariffProvider: Send + Sync {
    /// Source tag reported for granular (HS-6) hits.
    fn granular_source(&self) -> RateSource;

    /// Effectively-applied rate at HS-6 granularity, or `None` if the
    /// source has no observation for this key.
    async fn lookup_hs6(
        &self,
        hs6: &Hs6,
        reporter: &Country,
        partner: &Country,
        year: i32,
    ) -> Result<Option<f64>, ProviderError>;

    /// Aggregate rate for a whole product group.
    async fn lookup_category(
        &self,
        group: ProductGroup,
        reporter: &Country,
        partner: &Country,
        year: i32,
        indicator: TariffIndicator,
    ) -> Result<Option<f64>, ProviderError>;

    /// Aggregate rates for every product group at once. Sources without
    /// an aggregate tier report nothing.
    async fn category_rates(
        &self,
        reporter: &Country,
        partner: &Country,
        year: i32,
        indicator: TariffIndicator,
    ) -> Result<Vec<CategoryRate>, ProviderError> {
        let _ = (reporter, partner, year, indicator);
        Ok(Vec::new())
    }
}

/// A single step in the fallback chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateStrategy {
    /// HS-6 lookup at `year - years_back`.
    Granular { years_back: i32 },
    /// Product-group average at the requested year.
    CategoryAverage,
}

impl RateStrategy {
    pub fn label(&self) -> String {
        match self {
            RateStrategy::Granular { years_back: 0 } => "hs6".to_string(),
            RateStrategy::Granular { years_back } => format!("hs6-{years_back}y-back"),
            RateStrategy::CategoryAverage => "category-average".to_string(),
        }
    }
}

enum StrategyOutcome {
    Found {
        rate: f64,
        source: RateSource,
        year: i32,
    },
    NotFound,
}

/// Resolves tariff rates through an ordered strategy chain against one
/// injected provider. Live and static sources are never mixed within a
/// single resolver — each quote reports exactly one source.
pub struct RateResolver {
    provider: Arc<dyn TariffProvider>,
    chain: Vec<RateStrategy>,
    category_indicator: TariffIndicator,
}

impl RateResolver {
    /// Full chain: granular at year, year-1, year-2, then category average.
    pub fn new(provider: Arc<dyn TariffProvider>) -> Self {
        Self {
            provider,
            chain: vec![
                RateStrategy::Granular { years_back: 0 },
                RateStrategy::Granular { years_back: 1 },
                RateStrategy::Granular { years_back: 2 },
                RateStrategy::CategoryAverage,
            ],
            category_indicator: TariffIndicator::AhsWeightedAverage,
        }
    }

    /// Granular-only chain, for offline/historical sources that have no
    /// aggregate tier (e.g. the embedded dataset).
    pub fn granular_only(provider: Arc<dyn TariffProvider>) -> Self {
        Self {
            provider,
            chain: vec![RateStrategy::Granular { years_back: 0 }],
            category_indicator: TariffIndicator::AhsWeightedAverage,
        }
    }

    pub fn with_category_indicator(mut self, indicator: TariffIndicator) -> Self {
        self.category_indicator = indicator;
        self
    }

    /// The fallback order, in the order it runs.
    pub fn strategies(&self) -> &[RateStrategy] {
        &self.chain
    }

    /// Resolve a rate for (HS code, reporter/importer, partner/exporter,
    /// year). `Ok(None)` means every tier came up empty — a value, not an
    /// error, so batch callers can skip and continue.
    pub async fn resolve(
        &self,
        hs_code: &Hs6,
        reporter: &str,
        partner: &str,
        year: i32,
    ) -> Result<Option<TariffQuote>, CostError> {
        let reporter = Country::resolve(reporter)?;
        let partner = Country::resolve(partner)?;

        for strategy in &self.chain {
            match self.run_strategy(*strategy, hs_code, reporter, partner, year).await {
                StrategyOutcome::Found {
                    rate,
                    source,
                    year: found_year,
                } => {
                    debug!(
                        strategy = %strategy.label(),
                        hs = %hs_code,
                        rate,
                        "tariff resolved"
                    );
                    return Ok(Some(
                        self.enrich(hs_code, reporter, partner, year, found_year, rate, source)
                            .await,
                    ));
                }
                StrategyOutcome::NotFound => {
                    debug!(strategy = %strategy.label(), hs = %hs_code, "no data, falling back");
                }
            }
        }

        Ok(None)
    }

    async fn run_strategy(
        &self,
        strategy: RateStrategy,
        hs_code: &Hs6,
        reporter: Country,
        partner: Country,
        year: i32,
    ) -> StrategyOutcome {
        match strategy {
            RateStrategy::Granular { years_back } => {
                let lookup_year = year - years_back;
                match self
                    .provider
                    .lookup_hs6(hs_code, &reporter, &partner, lookup_year)
                    .await
                {
                    Ok(Some(rate)) => StrategyOutcome::Found {
                        rate,
                        source: self.provider.granular_source(),
                        year: lookup_year,
                    },
                    Ok(None) => StrategyOutcome::NotFound,
                    Err(err) => {
                        warn!(strategy = %strategy.label(), %err, "granular lookup failed");
                        StrategyOutcome::NotFound
                    }
                }
            }
            RateStrategy::CategoryAverage => {
                let Some(group) = ProductGroup::for_chapter(hs_code.chapter()) else {
                    warn!(hs = %hs_code, "HS code maps to no product group");
                    return StrategyOutcome::NotFound;
                };
                match self
                    .provider
                    .lookup_category(group, &reporter, &partner, year, self.category_indicator)
                    .await
                {
                    Ok(Some(rate)) => StrategyOutcome::Found {
                        rate,
                        source: RateSource::TradestatsTariff,
                        year,
                    },
                    Ok(None) => StrategyOutcome::NotFound,
                    Err(err) => {
                        warn!(strategy = %strategy.label(), %err, "category lookup failed");
                        StrategyOutcome::NotFound
                    }
                }
            }
        }
    }

    /// Attach MFN context to an applied rate. Failure here degrades to a
    /// quote without a margin, never to a lookup failure.
    async fn enrich(
        &self,
        hs_code: &Hs6,
        reporter: Country,
        partner: Country,
        requested_year: i32,
        found_year: i32,
        rate: f64,
        source: RateSource,
    ) -> TariffQuote {
        let group = ProductGroup::for_chapter(hs_code.chapter());

        let mfn_rate = match group {
            Some(group) => {
                match self
                    .provider
                    .lookup_category(
                        group,
                        &reporter,
                        &partner,
                        requested_year,
                        TariffIndicator::MfnSimpleAverage,
                    )
                    .await
                {
                    Ok(rate) => rate,
                    Err(err) => {
                        debug!(%err, "MFN enrichment unavailable");
                        None
                    }
                }
            }
            None => None,
        };

        let (preference_margin, has_preference) = match mfn_rate {
            Some(mfn) => {
                let margin = round4((mfn - rate).max(0.0));
                (Some(margin), margin > PREFERENCE_NOISE_THRESHOLD)
            }
            None => (None, false),
        };

        TariffQuote {
            tariff_rate: rate,
            hs_code: hs_code.clone(),
            reporter: reporter.iso3().to_string(),
            partner: partner.iso3().to_string(),
            year: found_year,
            source,
            product_group: group,
            mfn_rate,
            preference_margin,
            has_preference,
        }
    }

    /// Applied vs MFN rates for every product group between a country
    /// pair — a quick overview of where preferential access exists.
    /// `Ok(None)` when the provider has no aggregate data for the pair.
    pub async fn category_overview(
        &self,
        reporter: &str,
        partner: &str,
        year: i32,
    ) -> Result<Option<Vec<CategoryPreference>>, CostError> {
        let reporter = Country::resolve(reporter)?;
        let partner = Country::resolve(partner)?;

        let applied = match self
            .provider
            .category_rates(&reporter, &partner, year, TariffIndicator::AhsWeightedAverage)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%err, "applied-rate overview unavailable");
                return Ok(None);
            }
        };
        if applied.is_empty() {
            return Ok(None);
        }

        let mfn = self
            .provider
            .category_rates(&reporter, &partner, year, TariffIndicator::MfnWeightedAverage)
            .await
            .unwrap_or_else(|err| {
                warn!(%err, "MFN overview unavailable");
                Vec::new()
            });

        let overview = applied
            .into_iter()
            .map(|row| {
                let mfn_rate = mfn
                    .iter()
                    .find(|candidate| candidate.product_group == row.product_group)
                    .map(|candidate| candidate.tariff_rate);
                // Overview margins keep their sign: a negative margin means
                // the applied rate sits above MFN.
                let margin = mfn_rate.map(|m| round4(m - row.tariff_rate)).unwrap_or(0.0);
                CategoryPreference {
                    product_group: row.product_group,
                    product_label: row.product_label,
                    ahs_rate: row.tariff_rate,
                    mfn_rate,
                    preference_margin: margin,
                    has_preference: margin > PREFERENCE_NOISE_THRESHOLD,
                    reporter: reporter.iso3().to_string(),
                    partner: partner.iso3().to_string(),
                    year,
                }
            })
            .collect();

        Ok(Some(overview))
    }
}

/// Preferential vs MFN position for one product group.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryPreference {
    pub product_group: String,
    pub product_label: String,
    pub ahs_rate: f64,
    pub mfn_rate: Option<f64>,
    pub preference_margin: f64,
    pub has_preference: bool,
    pub reporter: String,
    pub partner: String,
    pub year: i32,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::*;

    /// Scripted provider: granular rates keyed by (hs, year), category
    /// rates keyed by (group id, indicator code). Records every granular
    /// year it is asked for.
    struct ScriptedProvider {
        granular: HashMap<(String, i32), f64>,
        category: HashMap<(&'static str, &'static str), f64>,
        asked_years: Mutex<Vec<i32>>,
    }

    impl ScriptedProvider {
        fn new() -> Self {
            Self {
                granular: HashMap::new(),
                category: HashMap::new(),
                asked_years: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TariffProvider for ScriptedProvider {
        fn granular_source(&self) -> RateSource {
            RateSource::Trains
        }

        async fn lookup_hs6(
            &self,
            hs6: &Hs6,
            _reporter: &Country,
            _partner: &Country,
            year: i32,
        ) -> Result<Option<f64>, ProviderError> {
            self.asked_years.lock().unwrap().push(year);
            Ok(self.granular.get(&(hs6.as_str().to_string(), year)).copied())
        }

        async fn lookup_category(
            &self,
            group: ProductGroup,
            _reporter: &Country,
            _partner: &Country,
            _year: i32,
            indicator: TariffIndicator,
        ) -> Result<Option<f64>, ProviderError> {
            Ok(self.category.get(&(group.id, indicator.code())).copied())
        }
    }

    #[tokio::test]
    async fn exact_year_wins_without_fallback() {
        let mut provider = ScriptedProvider::new();
        provider.granular.insert(("520100".into(), 2025), 5.5);
        let resolver = RateResolver::new(Arc::new(provider));

        let hs = Hs6::parse("520100").unwrap();
        let quote = resolver.resolve(&hs, "usa", "india", 2025).await.unwrap().unwrap();

        assert_eq!(quote.tariff_rate, 5.5);
        assert_eq!(quote.source, RateSource::Trains);
        assert_eq!(quote.year, 2025);
        assert_eq!(quote.reporter, "USA");
        assert_eq!(quote.partner, "IND");
    }

    #[tokio::test]
    async fn falls_back_two_years_for_reporting_lag() {
        let mut provider = ScriptedProvider::new();
        provider.granular.insert(("520100".into(), 2023), 6.1);
        let provider = Arc::new(provider);
        let resolver = RateResolver::new(Arc::clone(&provider) as Arc<dyn TariffProvider>);

        let hs = Hs6::parse("520100").unwrap();
        let quote = resolver.resolve(&hs, "usa", "china", 2025).await.unwrap().unwrap();

        assert_eq!(quote.tariff_rate, 6.1);
        assert_eq!(quote.year, 2023);
        assert_eq!(
            *provider.asked_years.lock().unwrap(),
            vec![2025, 2024, 2023]
        );
    }

    #[tokio::test]
    async fn category_average_is_the_last_resort() {
        let mut provider = ScriptedProvider::new();
        provider
            .category
            .insert(("84-85_MachElec", "AHS-WGHTD-AVRG"), 3.2);
        let resolver = RateResolver::new(Arc::new(provider));

        let hs = Hs6::parse("847989").unwrap();
        let quote = resolver.resolve(&hs, "india", "china", 2025).await.unwrap().unwrap();

        assert_eq!(quote.tariff_rate, 3.2);
        assert_eq!(quote.source, RateSource::TradestatsTariff);
        assert_eq!(quote.year, 2025);
    }

    #[tokio::test]
    async fn exhausted_chain_is_no_data_not_an_error() {
        let resolver = RateResolver::new(Arc::new(ScriptedProvider::new()));
        let hs = Hs6::parse("847989").unwrap();
        let quote = resolver.resolve(&hs, "usa", "china", 2025).await.unwrap();
        assert!(quote.is_none());
    }

    #[tokio::test]
    async fn unknown_country_is_an_error() {
        let resolver = RateResolver::new(Arc::new(ScriptedProvider::new()));
        let hs = Hs6::parse("847989").unwrap();
        let err = resolver.resolve(&hs, "narnia", "china", 2025).await.unwrap_err();
        assert!(matches!(err, CostError::UnknownCountry { .. }));
    }

    #[tokio::test]
    async fn mfn_enrichment_computes_margin_and_flag() {
        let mut provider = ScriptedProvider::new();
        provider.granular.insert(("847989".into(), 2025), 2.0);
        provider
            .category
            .insert(("84-85_MachElec", "MFN-SMPL-AVRG"), 5.25);
        let resolver = RateResolver::new(Arc::new(provider));

        let hs = Hs6::parse("847989").unwrap();
        let quote = resolver.resolve(&hs, "usa", "vietnam", 2025).await.unwrap().unwrap();

        assert_eq!(quote.mfn_rate, Some(5.25));
        assert_eq!(quote.preference_margin, Some(3.25));
        assert!(quote.has_preference);
    }

    #[tokio::test]
    async fn tiny_margin_is_noise_not_preference() {
        let mut provider = ScriptedProvider::new();
        provider.granular.insert(("847989".into(), 2025), 5.245);
        provider
            .category
            .insert(("84-85_MachElec", "MFN-SMPL-AVRG"), 5.25);
        let resolver = RateResolver::new(Arc::new(provider));

        let hs = Hs6::parse("847989").unwrap();
        let quote = resolver.resolve(&hs, "usa", "japan", 2025).await.unwrap().unwrap();

        assert_eq!(quote.preference_margin, Some(0.005));
        assert!(!quote.has_preference);
    }

    #[tokio::test]
    async fn mfn_below_applied_clamps_margin_to_zero() {
        let mut provider = ScriptedProvider::new();
        provider.granular.insert(("847989".into(), 2025), 9.0);
        provider
            .category
            .insert(("84-85_MachElec", "MFN-SMPL-AVRG"), 4.0);
        let resolver = RateResolver::new(Arc::new(provider));

        let hs = Hs6::parse("847989").unwrap();
        let quote = resolver.resolve(&hs, "usa", "china", 2025).await.unwrap().unwrap();

        assert_eq!(quote.preference_margin, Some(0.0));
        assert!(!quote.has_preference);
    }

    #[test]
    fn default_chain_order_is_fixed() {
        let resolver = RateResolver::new(Arc::new(ScriptedProvider::new()));
        assert_eq!(
            resolver.strategies(),
            &[
                RateStrategy::Granular { years_back: 0 },
                RateStrategy::Granular { years_back: 1 },
                RateStrategy::Granular { years_back: 2 },
                RateStrategy::CategoryAverage,
            ]
        );

        let offline = RateResolver::granular_only(Arc::new(ScriptedProvider::new()));
        assert_eq!(offline.strategies(), &[RateStrategy::Granular { years_back: 0 }]);
    }
}

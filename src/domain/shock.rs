//! Tariff policy-shock simulation.
//!
//! Given a tariff delta (e.g. +25 percentage points from a new trade
//! policy), recompute landed cost at the baseline and shocked rates per
//! HS code and aggregate the impact across the portfolio.

use serde::{Deserialize, Serialize};

use super::comparison::{SkipReason, DEFAULT_YEAR};
use super::distance::route_distance;
use super::entities::{CostError, Hs6, Mode};
use super::freight::round2;
use super::landed_cost::calculate_landed_cost;
use super::resolver::RateResolver;

/// Clamping policy for shocked rates. The floor is always 0; whether a
/// ceiling (e.g. a bound-rate cap) applies is caller policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShockPolicy {
    pub ceiling: Option<f64>,
}

impl ShockPolicy {
    pub fn apply(&self, baseline: f64, delta: f64) -> f64 {
        let mut rate = (baseline + delta).max(0.0);
        if let Some(ceiling) = self.ceiling {
            rate = rate.min(ceiling);
        }
        round2(rate)
    }
}

/// Inputs for a policy-shock simulation over a set of HS codes.
#[derive(Clone, Debug)]
pub struct ShockRequest {
    pub hs_codes: Vec<String>,
    /// Percentage-point change; positive for increases.
    pub tariff_delta_percent: f64,
    pub origin: String,
    pub destination: String,
    pub mode: Mode,
    pub weight_kg: f64,
    pub product_value: f64,
    pub year: i32,
    pub policy: ShockPolicy,
}

impl ShockRequest {
    pub fn new(
        hs_codes: Vec<String>,
        tariff_delta_percent: f64,
        origin: impl Into<String>,
        destination: impl Into<String>,
        mode: Mode,
        weight_kg: f64,
        product_value: f64,
    ) -> Self {
        Self {
            hs_codes,
            tariff_delta_percent,
            origin: origin.into(),
            destination: destination.into(),
            mode,
            weight_kg,
            product_value,
            year: DEFAULT_YEAR,
            policy: ShockPolicy::default(),
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    pub fn with_policy(mut self, policy: ShockPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Before/after landed cost for one HS code.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HsImpact {
    pub hs_code: Hs6,
    pub baseline_tariff: f64,
    pub new_tariff: f64,
    pub baseline_total: f64,
    pub new_total: f64,
    pub absolute_impact: f64,
    pub percent_impact: f64,
}

/// Portfolio totals are summed before the percent change is taken, so
/// the aggregate is weighted by shipment value rather than averaging
/// per-item percentages.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioImpact {
    pub total_baseline_cost: f64,
    pub total_new_cost: f64,
    pub total_impact: f64,
    pub portfolio_percent_change: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedCode {
    pub hs_code: String,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Serialize)]
pub struct ShockReport {
    pub per_hs: Vec<HsImpact>,
    pub portfolio: PortfolioImpact,
    pub skipped: Vec<SkippedCode>,
}

/// Simulate the shock for every HS code in the request. Codes with no
/// tariff data (or otherwise unusable) are reported as skipped; the
/// route itself must be valid for the batch to run at all.
pub async fn simulate_policy_shock(
    resolver: &RateResolver,
    request: &ShockRequest,
) -> Result<ShockReport, CostError> {
    route_distance(&request.origin, &request.destination, request.mode)?;

    let mut per_hs = Vec::with_capacity(request.hs_codes.len());
    let mut skipped = Vec::new();

    for code in &request.hs_codes {
        let hs = match Hs6::parse(code) {
            Ok(hs) => hs,
            Err(err) => {
                skipped.push(SkippedCode {
                    hs_code: code.clone(),
                    reason: SkipReason::InvalidInput(err.to_string()),
                });
                continue;
            }
        };

        let quote = match resolver
            .resolve(&hs, &request.destination, &request.origin, request.year)
            .await
        {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                skipped.push(SkippedCode {
                    hs_code: code.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
            Err(err) => {
                skipped.push(SkippedCode {
                    hs_code: code.clone(),
                    reason: SkipReason::InvalidInput(err.to_string()),
                });
                continue;
            }
        };

        let baseline_tariff = quote.tariff_rate;
        let new_tariff = request.policy.apply(baseline_tariff, request.tariff_delta_percent);

        let baseline = calculate_landed_cost(
            &request.origin,
            &request.destination,
            request.mode,
            request.weight_kg,
            request.product_value,
            baseline_tariff,
        )?;
        let post = calculate_landed_cost(
            &request.origin,
            &request.destination,
            request.mode,
            request.weight_kg,
            request.product_value,
            new_tariff,
        )?;

        let absolute_impact = round2(post.total_landed_cost - baseline.total_landed_cost);
        let percent_impact = if baseline.total_landed_cost != 0.0 {
            round2(absolute_impact / baseline.total_landed_cost * 100.0)
        } else {
            0.0
        };

        per_hs.push(HsImpact {
            hs_code: hs,
            baseline_tariff,
            new_tariff,
            baseline_total: baseline.total_landed_cost,
            new_total: post.total_landed_cost,
            absolute_impact,
            percent_impact,
        });
    }

    let total_baseline_cost = round2(per_hs.iter().map(|impact| impact.baseline_total).sum());
    let total_new_cost = round2(per_hs.iter().map(|impact| impact.new_total).sum());
    let total_impact = round2(total_new_cost - total_baseline_cost);
    let portfolio_percent_change = if total_baseline_cost != 0.0 {
        round2(total_impact / total_baseline_cost * 100.0)
    } else {
        0.0
    };

    Ok(ShockReport {
        per_hs,
        portfolio: PortfolioImpact {
            total_baseline_cost,
            total_new_cost,
            total_impact,
            portfolio_percent_change,
        },
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::super::country::Country;
    use super::super::entities::{ProductGroup, RateSource, TariffIndicator};
    use super::super::resolver::{ProviderError, TariffProvider};
    use super::*;

    struct PerCodeRates {
        rates: HashMap<&'static str, f64>,
    }

    #[async_trait]
    impl TariffProvider for PerCodeRates {
        fn granular_source(&self) -> RateSource {
            RateSource::Trains
        }

        async fn lookup_hs6(
            &self,
            hs6: &Hs6,
            _reporter: &Country,
            _partner: &Country,
            _year: i32,
        ) -> Result<Option<f64>, ProviderError> {
            Ok(self.rates.get(hs6.as_str()).copied())
        }

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

    fn resolver_with(rates: &[(&'static str, f64)]) -> RateResolver {
        RateResolver::new(Arc::new(PerCodeRates {
            rates: rates.iter().copied().collect(),
        }))
    }

    #[test]
    fn shock_clamps_at_zero_never_negative() {
        let policy = ShockPolicy::default();
        assert_eq!(policy.apply(5.0, -30.0), 0.0);
        assert_eq!(policy.apply(5.0, -5.0), 0.0);
        assert_eq!(policy.apply(5.0, 3.5), 8.5);
    }

    #[test]
    fn optional_ceiling_caps_the_shocked_rate() {
        let policy = ShockPolicy { ceiling: Some(40.0) };
        assert_eq!(policy.apply(30.0, 25.0), 40.0);
        assert_eq!(policy.apply(10.0, 5.0), 15.0);
    }

    #[tokio::test]
    async fn impact_is_duty_delta_only() {
        // +25pp on $50 000 is $12 500 more duty; freight is untouched.
        let resolver = resolver_with(&[("720890", 5.0)]);
        let request = ShockRequest::new(
            vec!["720890".into()],
            25.0,
            "china",
            "usa",
            Mode::Sea,
            1_000.0,
            50_000.0,
        );

        let report = simulate_policy_shock(&resolver, &request).await.unwrap();
        assert_eq!(report.per_hs.len(), 1);
        let impact = &report.per_hs[0];
        assert_eq!(impact.baseline_tariff, 5.0);
        assert_eq!(impact.new_tariff, 30.0);
        assert_eq!(impact.absolute_impact, 12_500.0);
        assert_eq!(
            impact.new_total,
            impact.baseline_total + impact.absolute_impact
        );
    }

    #[tokio::test]
    async fn codes_without_data_are_skipped_not_fatal() {
        let resolver = resolver_with(&[("720890", 5.0)]);
        let request = ShockRequest::new(
            vec!["720890".into(), "760120".into(), "bogus".into()],
            10.0,
            "china",
            "usa",
            Mode::Sea,
            100.0,
            10_000.0,
        );

        let report = simulate_policy_shock(&resolver, &request).await.unwrap();
        assert_eq!(report.per_hs.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].hs_code, "760120");
        assert_eq!(report.skipped[0].reason, SkipReason::NoData);
        assert!(matches!(
            report.skipped[1].reason,
            SkipReason::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn portfolio_sums_totals_before_percent() {
        let resolver = resolver_with(&[("720890", 5.0), ("760120", 20.0)]);
        let request = ShockRequest::new(
            vec!["720890".into(), "760120".into()],
            25.0,
            "china",
            "usa",
            Mode::Sea,
            1_000.0,
            50_000.0,
        );

        let report = simulate_policy_shock(&resolver, &request).await.unwrap();
        let portfolio = &report.portfolio;

        let summed_base: f64 = report.per_hs.iter().map(|i| i.baseline_total).sum();
        let summed_new: f64 = report.per_hs.iter().map(|i| i.new_total).sum();
        assert_eq!(portfolio.total_baseline_cost, round2(summed_base));
        assert_eq!(portfolio.total_new_cost, round2(summed_new));

        let expected_pct = round2(
            (portfolio.total_new_cost - portfolio.total_baseline_cost)
                / portfolio.total_baseline_cost
                * 100.0,
        );
        assert_eq!(portfolio.portfolio_percent_change, expected_pct);

        // Value-weighted: NOT the mean of the per-item percentages.
        let mean_pct: f64 = report.per_hs.iter().map(|i| i.percent_impact).sum::<f64>()
            / report.per_hs.len() as f64;
        assert_ne!(round2(mean_pct), portfolio.portfolio_percent_change);
    }

    #[tokio::test]
    async fn unsupported_route_fails_the_whole_batch() {
        let resolver = resolver_with(&[("720890", 5.0)]);
        let request = ShockRequest::new(
            vec!["720890".into()],
            25.0,
            "brazil",
            "usa",
            Mode::Sea,
            100.0,
            10_000.0,
        );

        let err = simulate_policy_shock(&resolver, &request).await.unwrap_err();
        assert!(matches!(err, CostError::UnsupportedRoute { .. }));
    }
}

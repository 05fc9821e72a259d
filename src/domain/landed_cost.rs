//! Landed-cost composition: product value + freight + import duty.

use super::distance::normalize_country;
use super::entities::{CostError, Hs6, LandedCostResult, Mode};
use super::freight::{calculate_import_duty, calculate_shipping_cost, round2};
use super::resolver::RateResolver;

/// Full landed-cost calculation with a caller-supplied tariff rate.
///
/// Pure and idempotent: identical inputs produce identical output.
pub fn calculate_landed_cost(
    origin: &str,
    destination: &str,
    mode: Mode,
    weight_kg: f64,
    product_value: f64,
    tariff_rate: f64,
) -> Result<LandedCostResult, CostError> {
    let shipping = calculate_shipping_cost(origin, destination, mode, weight_kg)?;
    let import_duty = calculate_import_duty(product_value, tariff_rate)?;
    let total_landed_cost = round2(product_value + shipping.shipping_cost + import_duty);

    Ok(LandedCostResult {
        route: format!(
            "{} → {}",
            normalize_country(origin),
            normalize_country(destination)
        ),
        mode,
        distance_km: shipping.distance_km,
        distance_factor: shipping.distance_factor,
        weight_kg,
        shipping_cost: shipping.shipping_cost,
        tariff_rate,
        import_duty,
        total_landed_cost,
    })
}

/// End-to-end shape: resolve the tariff first, then compute the landed
/// cost. Returns `Ok(None)` when no tariff data exists at any fallback
/// tier — best-effort batch callers must be able to skip, not abort.
/// Invalid input (unknown country, bad HS code, missing route) still
/// surfaces as an error.
#[allow(clippy::too_many_arguments)]
pub async fn resolve_and_calculate(
    resolver: &RateResolver,
    origin: &str,
    destination: &str,
    mode: Mode,
    weight_kg: f64,
    product_value: f64,
    hs_code: &str,
    reporter: &str,
    year: i32,
) -> Result<Option<LandedCostResult>, CostError> {
    let hs = Hs6::parse(hs_code)?;

    let Some(quote) = resolver.resolve(&hs, reporter, origin, year).await? else {
        return Ok(None);
    };

    calculate_landed_cost(
        origin,
        destination,
        mode,
        weight_kg,
        product_value,
        quote.tariff_rate,
    )
    .map(Some)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::super::country::Country;
    use super::super::entities::{ProductGroup, RateSource, TariffIndicator};
    use super::super::resolver::{ProviderError, TariffProvider};
    use super::*;

    #[test]
    fn sea_scenario_matches_benchmark_cents() {
        let result =
            calculate_landed_cost("china", "usa", Mode::Sea, 500.0, 10_000.0, 7.5).unwrap();
        assert_eq!(result.route, "china → usa");
        assert_eq!(result.distance_km, 20_000);
        assert_eq!(result.distance_factor, 4.0);
        assert_eq!(result.shipping_cost, 2_520.0);
        assert_eq!(result.import_duty, 750.0);
        assert_eq!(result.total_landed_cost, 13_270.0);
    }

    #[test]
    fn air_scenario_matches_benchmark_cents() {
        let result =
            calculate_landed_cost("china", "usa", Mode::Air, 500.0, 10_000.0, 7.5).unwrap();
        assert_eq!(result.distance_km, 11_000);
        assert_eq!(result.distance_factor, 2.2);
        assert_eq!(result.shipping_cost, 6_850.0);
        assert_eq!(result.import_duty, 750.0);
        assert_eq!(result.total_landed_cost, 17_600.0);
    }

    #[test]
    fn total_is_sum_of_rounded_parts() {
        let result =
            calculate_landed_cost("india", "uk", Mode::Sea, 123.45, 6_789.01, 3.33).unwrap();
        let expected = result.shipping_cost + result.import_duty + 6_789.01;
        assert!((result.total_landed_cost - expected).abs() < 0.01);
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let a = calculate_landed_cost("usa", "uk", Mode::Air, 42.0, 1_000.0, 2.5).unwrap();
        let b = calculate_landed_cost("usa", "uk", Mode::Air, 42.0, 1_000.0, 2.5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn route_label_normalizes_names() {
        let result =
            calculate_landed_cost(" CHINA ", "Usa", Mode::Sea, 10.0, 100.0, 0.0).unwrap();
        assert_eq!(result.route, "china → usa");
    }

    struct OneRateProvider {
        rate: Option<f64>,
    }

    #[async_trait]
    impl TariffProvider for OneRateProvider {
        fn granular_source(&self) -> RateSource {
            RateSource::Trains
        }

        async fn lookup_hs6(
            &self,
            _hs6: &Hs6,
            _reporter: &Country,
            _partner: &Country,
            _year: i32,
        ) -> Result<Option<f64>, ProviderError> {
            Ok(self.rate)
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

    #[tokio::test]
    async fn lookup_shape_computes_from_resolved_rate() {
        let resolver = RateResolver::new(Arc::new(OneRateProvider { rate: Some(7.5) }));
        let result = resolve_and_calculate(
            &resolver, "china", "usa", Mode::Sea, 500.0, 10_000.0, "521142", "usa", 2025,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result.tariff_rate, 7.5);
        assert_eq!(result.total_landed_cost, 13_270.0);
    }

    #[tokio::test]
    async fn lookup_shape_returns_none_without_data() {
        let resolver = RateResolver::new(Arc::new(OneRateProvider { rate: None }));
        let result = resolve_and_calculate(
            &resolver, "china", "usa", Mode::Sea, 500.0, 10_000.0, "521142", "usa", 2025,
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }
}

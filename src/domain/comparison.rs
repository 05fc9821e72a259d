//! Cross-origin sourcing comparison.
//!
//! Runs the landed-cost calculation against every candidate origin for a
//! fixed destination and ranks the results. Each candidate may involve a
//! network round-trip to the tariff provider, so candidates fan out as
//! independent tasks with an individual timeout; a slow or failed
//! candidate becomes a skip entry and never blocks the others.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;

use super::classify::{ClassifyError, HsCandidate, HsClassifier};
use super::country::Country;
use super::distance::{normalize_country, route_distance, FREIGHT_COUNTRIES};
use super::entities::{ComparisonRow, CostError, Hs6, Mode};
use super::freight::round2;
use super::landed_cost::calculate_landed_cost;
use super::resolver::RateResolver;

pub const DEFAULT_YEAR: i32 = 2025;
pub const DEFAULT_CANDIDATE_TIMEOUT: Duration = Duration::from_secs(20);

/// Inputs for a cross-origin comparison.
#[derive(Clone, Debug)]
pub struct ComparisonRequest {
    pub hs_code: String,
    pub destination: String,
    pub mode: Mode,
    pub weight_kg: f64,
    pub product_value: f64,
    pub year: i32,
    /// Candidate origins; defaults to every supported country except the
    /// destination.
    pub candidates: Option<Vec<String>>,
    pub product_description: Option<String>,
    pub candidate_timeout: Duration,
}

impl ComparisonRequest {
    pub fn new(
        hs_code: impl Into<String>,
        destination: impl Into<String>,
        mode: Mode,
        weight_kg: f64,
        product_value: f64,
    ) -> Self {
        Self {
            hs_code: hs_code.into(),
            destination: destination.into(),
            mode,
            weight_kg,
            product_value,
            year: DEFAULT_YEAR,
            candidates: None,
            product_description: None,
            candidate_timeout: DEFAULT_CANDIDATE_TIMEOUT,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.product_description = Some(description.into());
        self
    }

    pub fn with_candidate_timeout(mut self, timeout: Duration) -> Self {
        self.candidate_timeout = timeout;
        self
    }
}

/// Why a candidate origin produced no row.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SkipReason {
    /// The resolver exhausted every fallback tier.
    NoData,
    /// The candidate itself was unusable (unknown country, no route, …).
    InvalidInput(String),
    /// The per-candidate deadline elapsed.
    TimedOut,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedOrigin {
    pub origin: String,
    pub reason: SkipReason,
}

/// Cost-ranked comparison outcome. `rows` is sorted ascending by total
/// landed cost; skipped candidates are always reported, never dropped.
#[derive(Clone, Debug, Serialize)]
pub struct ComparisonReport {
    pub rows: Vec<ComparisonRow>,
    pub skipped: Vec<SkippedOrigin>,
}

impl ComparisonReport {
    pub fn cheapest(&self) -> Option<&ComparisonRow> {
        self.rows.first()
    }

    pub fn costliest(&self) -> Option<&ComparisonRow> {
        self.rows.last()
    }

    /// Absolute delta between the costliest and cheapest options.
    pub fn savings(&self) -> Option<f64> {
        match (self.cheapest(), self.costliest()) {
            (Some(cheapest), Some(costliest)) => Some(round2(
                costliest.cost.total_landed_cost - cheapest.cost.total_landed_cost,
            )),
            _ => None,
        }
    }
}

enum CandidateOutcome {
    Row(Box<ComparisonRow>),
    Skipped(SkipReason),
}

/// Compare landed cost across candidate origins for one destination.
///
/// Request-level input errors (bad HS code, unknown destination) fail the
/// whole call; per-candidate failures become skip entries.
pub async fn compare_origins(
    resolver: Arc<RateResolver>,
    request: &ComparisonRequest,
) -> Result<ComparisonReport, CostError> {
    let hs = Hs6::parse(&request.hs_code)?;
    let destination = normalize_country(&request.destination);
    Country::resolve(&destination)?;

    let candidates: Vec<String> = match &request.candidates {
        Some(list) => list.iter().map(|name| normalize_country(name)).collect(),
        None => FREIGHT_COUNTRIES
            .iter()
            .filter(|name| **name != destination)
            .map(|name| name.to_string())
            .collect(),
    };

    let mut handles = Vec::with_capacity(candidates.len());
    for origin in &candidates {
        let resolver = Arc::clone(&resolver);
        let origin = origin.clone();
        let destination = destination.clone();
        let hs = hs.clone();
        let description = request.product_description.clone();
        let (mode, weight_kg, product_value, year) = (
            request.mode,
            request.weight_kg,
            request.product_value,
            request.year,
        );
        let deadline = request.candidate_timeout;

        handles.push(tokio::spawn(async move {
            match timeout(
                deadline,
                evaluate_candidate(
                    resolver,
                    origin,
                    destination,
                    hs,
                    mode,
                    weight_kg,
                    product_value,
                    year,
                    description,
                ),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => CandidateOutcome::Skipped(SkipReason::TimedOut),
            }
        }));
    }

    // Collect in input order so the stable sort below breaks ties the
    // same way on every run.
    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for (origin, handle) in candidates.into_iter().zip(handles) {
        match handle.await {
            Ok(CandidateOutcome::Row(row)) => rows.push(*row),
            Ok(CandidateOutcome::Skipped(reason)) => {
                skipped.push(SkippedOrigin { origin, reason });
            }
            Err(err) => {
                warn!(%origin, %err, "candidate task failed");
                skipped.push(SkippedOrigin {
                    origin,
                    reason: SkipReason::InvalidInput(err.to_string()),
                });
            }
        }
    }

    rows.sort_by(|a, b| {
        a.cost
            .total_landed_cost
            .partial_cmp(&b.cost.total_landed_cost)
            .unwrap_or(Ordering::Equal)
    });

    Ok(ComparisonReport { rows, skipped })
}

#[allow(clippy::too_many_arguments)]
async fn evaluate_candidate(
    resolver: Arc<RateResolver>,
    origin: String,
    destination: String,
    hs: Hs6,
    mode: Mode,
    weight_kg: f64,
    product_value: f64,
    year: i32,
    description: Option<String>,
) -> CandidateOutcome {
    if origin == destination {
        return CandidateOutcome::Skipped(SkipReason::InvalidInput(
            "origin equals destination".to_string(),
        ));
    }

    // No point paying for a resolver round-trip when the lane itself is
    // unsupported.
    if let Err(err) = route_distance(&origin, &destination, mode) {
        return CandidateOutcome::Skipped(SkipReason::InvalidInput(err.to_string()));
    }

    let quote = match resolver.resolve(&hs, &destination, &origin, year).await {
        Ok(Some(quote)) => quote,
        Ok(None) => return CandidateOutcome::Skipped(SkipReason::NoData),
        Err(err) => {
            return CandidateOutcome::Skipped(SkipReason::InvalidInput(err.to_string()));
        }
    };

    match calculate_landed_cost(
        &origin,
        &destination,
        mode,
        weight_kg,
        product_value,
        quote.tariff_rate,
    ) {
        Ok(cost) => CandidateOutcome::Row(Box::new(ComparisonRow {
            origin,
            product_description: description,
            hs_code: quote.hs_code,
            applied_tariff: quote.tariff_rate,
            mfn_rate: quote.mfn_rate,
            preference_margin: quote.preference_margin,
            has_preference: quote.has_preference,
            source: quote.source,
            cost,
        })),
        Err(err) => CandidateOutcome::Skipped(SkipReason::InvalidInput(err.to_string())),
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),
    #[error("no classification candidates for '{0}'")]
    NoCandidates(String),
    #[error(transparent)]
    Cost(#[from] CostError),
}

/// A comparison produced from a free-text product description.
#[derive(Clone, Debug)]
pub struct ClassifiedComparison {
    pub candidate: HsCandidate,
    pub report: ComparisonReport,
}

/// Classify a product description, then compare origins with the top
/// candidate HS code. The `base` request supplies route and shipment
/// facts; its HS code is replaced by the classifier's pick.
pub async fn classify_and_compare(
    classifier: &dyn HsClassifier,
    resolver: Arc<RateResolver>,
    description: &str,
    base: &ComparisonRequest,
) -> Result<ClassifiedComparison, PipelineError> {
    let mut candidates = classifier.classify(description).await?;
    if candidates.is_empty() {
        return Err(PipelineError::NoCandidates(description.to_string()));
    }
    let top = candidates.remove(0);

    let request = ComparisonRequest {
        hs_code: top.hs_code.clone(),
        product_description: Some(description.to_string()),
        ..base.clone()
    };
    let report = compare_origins(resolver, &request).await?;

    Ok(ClassifiedComparison {
        candidate: top,
        report,
    })
}

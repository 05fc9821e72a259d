//! HS classification collaborator interface.
//!
//! Turning a free-text product description into candidate HS codes is an
//! external concern (semantic search + reranking); the cost engine only
//! consumes the ranked output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One ranked classification candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HsCandidate {
    pub hs_code: String,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier returned malformed output: {0}")]
    Malformed(String),
}

/// Classifies a product description into ranked HS code candidates,
/// best first.
#[async_trait]
pub trait HsClassifier: Send + Sync {
    async fn classify(&self, product_description: &str) -> Result<Vec<HsCandidate>, ClassifyError>;
}

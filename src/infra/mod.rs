//! Backing data sources and their caches.

pub mod cache;
pub mod dataset;
pub mod wits;

pub use cache::{load_rate_cache, save_rate_cache, RateCache, RATE_CACHE_TTL};
pub use dataset::{DatasetError, DatasetRecord, TariffDataset};
pub use wits::{WitsClient, WitsClientError};

//! Persistent on-disk caching for category tariff rates with TTL tracking.

use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::OnceLock,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const RATE_CACHE_FILENAME: &str = "category_rates.json";

/// Cache TTL: 7 days. Aggregate tariff rates are yearly figures and
/// change only when WITS republishes.
pub const RATE_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Cached category-rate lookups with TTL tracking.
///
/// Keys are full query strings (`reporter:partner:year:group:indicator`);
/// values are the resolved rate in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateCache {
    /// Unix timestamp (seconds) when this cache was created.
    pub cached_at: u64,
    pub entries: HashMap<String, f64>,
}

impl RateCache {
    /// Create an empty cache stamped with the current time.
    pub fn new() -> Self {
        let cached_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            cached_at,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: String, rate: f64) {
        self.entries.insert(key, rate);
    }

    /// Check if cache has expired (older than TTL).
    pub fn is_expired(&self) -> bool {
        self.age() > RATE_CACHE_TTL
    }

    /// Get cache age as Duration.
    pub fn age(&self) -> Duration {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Duration::from_secs(now.saturating_sub(self.cached_at))
    }

    /// Human-readable age string.
    pub fn age_string(&self) -> String {
        let secs = self.age().as_secs();
        if secs < 60 {
            format!("{secs}s")
        } else if secs < 3600 {
            format!("{}m", secs / 60)
        } else if secs < 86400 {
            format!("{}h", secs / 3600)
        } else {
            format!("{}d", secs / 86400)
        }
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the cache file path (in app data directory).
fn cache_path() -> PathBuf {
    static PATH: OnceLock<PathBuf> = OnceLock::new();
    PATH.get_or_init(|| {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tariff-cost-scanner");

        // Ensure directory exists
        let _ = fs::create_dir_all(&base);

        base.join(RATE_CACHE_FILENAME)
    })
    .clone()
}

/// Load the rate cache from disk, if it exists and is not expired.
pub fn load_rate_cache() -> Option<RateCache> {
    let path = cache_path();

    if !path.exists() {
        debug!(path = %path.display(), "no rate cache on disk");
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str::<RateCache>(&content) {
            Ok(cache) => {
                if cache.is_expired() {
                    debug!(age = %cache.age_string(), "rate cache expired");
                    return None;
                }
                debug!(
                    entries = cache.entries.len(),
                    age = %cache.age_string(),
                    "loaded rate cache"
                );
                Some(cache)
            }
            Err(err) => {
                warn!(%err, "failed to parse rate cache");
                None
            }
        },
        Err(err) => {
            warn!(%err, "failed to read rate cache");
            None
        }
    }
}

/// Save the rate cache to disk.
pub fn save_rate_cache(cache: &RateCache) -> Result<(), std::io::Error> {
    let path = cache_path();
    let content = serde_json::to_string(cache)?;
    fs::write(&path, content)?;
    debug!(
        entries = cache.entries.len(),
        path = %path.display(),
        "saved rate cache"
    );
    Ok(())
}

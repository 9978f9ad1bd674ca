//! Package discovery cache
//!
//! Template identifiers on the wire must be fully qualified with a package
//! id. The hosting package for a `(module, entity)` pair is discovered once
//! by probing and then cached for the process lifetime.

use dashmap::DashMap;

#[derive(Default)]
pub struct PackageCache {
    resolved: DashMap<(String, String), String>,
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, module: &str, entity: &str) -> Option<String> {
        self.resolved
            .get(&(module.to_string(), entity.to_string()))
            .map(|entry| entry.clone())
    }

    pub fn insert(&self, module: &str, entity: &str, package_id: String) {
        self.resolved
            .insert((module.to_string(), entity.to_string()), package_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_round_trip() {
        let cache = PackageCache::new();
        assert_eq!(cache.get("Exchange", "OrderBook"), None);
        cache.insert("Exchange", "OrderBook", "pkg123".into());
        assert_eq!(cache.get("Exchange", "OrderBook"), Some("pkg123".into()));
        assert_eq!(cache.get("Exchange", "Order"), None);
    }
}

use std::sync::RwLock;

use hashbrown::HashMap;

use crate::sync::{read, write};

/// Platform -> "some emulator can run it". Unknown platforms read as unavailable.
#[derive(Debug, Default)]
pub struct AvailabilityCache {
    platforms: RwLock<HashMap<String, bool>>,
}

impl AvailabilityCache {
    pub fn is_available(&self, platform: &str) -> bool {
        read(&self.platforms).get(platform).copied().unwrap_or(false)
    }

    /// Replace the whole table.
    pub fn replace(&self, platforms: HashMap<String, bool>) {
        *write(&self.platforms) = platforms;
    }

    /// Sorted `(platform, available)` pairs.
    pub fn snapshot(&self) -> Vec<(String, bool)> {
        let mut entries: Vec<(String, bool)> = read(&self.platforms)
            .iter()
            .map(|(platform, available)| (platform.clone(), *available))
            .collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_platform_is_unavailable() {
        let cache = AvailabilityCache::default();
        assert!(!cache.is_available("nes"));

        let mut table = HashMap::new();
        table.insert("nes".to_string(), true);
        table.insert("wii".to_string(), false);
        cache.replace(table);

        assert!(cache.is_available("nes"));
        assert!(!cache.is_available("wii"));
        assert_eq!(cache.snapshot()[0], ("nes".to_string(), true));
    }
}

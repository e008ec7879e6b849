//! Tidepool Providers - reference search indexes
//!
//! Ships the providers the harness knows about out of the box and the
//! registry that builds them.

#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]

pub mod providers;

use std::sync::Arc;

pub use providers::{DemoFeedProvider, MagnetoProvider, TorrentApiProvider};
use tidepool_core::{ProviderContext, ProviderRegistry, SearchProvider};

/// Registry holding every built-in provider, in a stable order.
pub fn builtin_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry
        .register("Magneto", |ctx: &ProviderContext| {
            Ok(Arc::new(MagnetoProvider::from_env(ctx)?) as Arc<dyn SearchProvider>)
        })
        .register("TorrentApi", |ctx: &ProviderContext| {
            Ok(Arc::new(TorrentApiProvider::from_env(ctx)?) as Arc<dyn SearchProvider>)
        })
        .register("DemoFeed", |ctx: &ProviderContext| {
            Ok(Arc::new(DemoFeedProvider::new(ctx)?) as Arc<dyn SearchProvider>)
        });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_order() {
        let registry = builtin_registry();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["Magneto", "TorrentApi", "DemoFeed"]);
    }

    #[test]
    fn test_demo_feed_is_filtered_from_conformance() {
        let enumeration = builtin_registry().list_providers(&ProviderContext::default());
        assert!(enumeration.setup_errors.is_empty());
        assert_eq!(enumeration.providers.len(), 3);

        let qualifying: Vec<&str> = enumeration.qualifying().map(|p| p.name()).collect();
        assert_eq!(qualifying, vec!["Magneto", "TorrentApi"]);
    }
}

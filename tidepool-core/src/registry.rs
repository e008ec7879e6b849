//! Provider registry: named factories enumerated at harness startup.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::provider::{ProviderContext, ProviderError, SearchProvider};

/// Constructor for one provider.
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderContext) -> Result<Arc<dyn SearchProvider>, ProviderError> + Send + Sync>;

/// A provider that could not be constructed.
#[derive(Debug)]
pub struct SetupError {
    pub provider: String,
    pub reason: String,
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed to initialize: {}", self.provider, self.reason)
    }
}

/// Result of enumerating the registry.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub providers: Vec<Arc<dyn SearchProvider>>,
    pub setup_errors: Vec<SetupError>,
}

impl Enumeration {
    /// Providers eligible for a conformance suite.
    pub fn qualifying(&self) -> impl Iterator<Item = &Arc<dyn SearchProvider>> {
        self.providers
            .iter()
            .filter(|provider| provider.capabilities().qualifies_for_conformance())
    }
}

struct RegistryEntry {
    name: String,
    factory: ProviderFactory,
}

/// Table of known providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    entries: Vec<Arc<RegistryEntry>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider constructor under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ProviderContext) -> Result<Arc<dyn SearchProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.push(Arc::new(RegistryEntry {
            name: name.into(),
            factory: Arc::new(factory),
        }));
        self
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instantiates every registered provider.
    ///
    /// A constructor that fails or panics is recorded as a setup error for
    /// that provider; the others are still built.
    pub fn list_providers(&self, context: &ProviderContext) -> Enumeration {
        let mut enumeration = Enumeration::default();

        for entry in &self.entries {
            let built = catch_unwind(AssertUnwindSafe(|| (entry.factory)(context)));
            match built {
                Ok(Ok(provider)) => {
                    tracing::debug!("Registered provider {} ({})", provider.name(), provider.id());
                    enumeration.providers.push(provider);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Provider {} failed to initialize: {}", entry.name, e);
                    enumeration.setup_errors.push(SetupError {
                        provider: entry.name.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    tracing::warn!("Provider {} panicked during construction", entry.name);
                    enumeration.setup_errors.push(SetupError {
                        provider: entry.name.clone(),
                        reason: "constructor panicked".to_string(),
                    });
                }
            }
        }

        enumeration
    }
}

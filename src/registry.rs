use std::collections::HashMap;
use std::sync::Arc;

use crate::model::Provider;
use crate::provider::CloudProvider;

/// Registry of available cloud providers.
///
/// # Example
///
/// ```ignore
/// let mut registry = ProviderRegistry::new();
/// provider::register_all(&mut registry);
///
/// let azure = registry.get(Provider::Azure).unwrap();
/// println!("{} has {} queries", azure.provider(), azure.queries().len());
/// ```
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn CloudProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider.
    ///
    /// If a provider for the same cloud already exists, it will be replaced.
    pub fn register<P: CloudProvider + 'static>(&mut self, provider: P) {
        self.providers.insert(provider.provider(), Arc::new(provider));
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn CloudProvider>> {
        self.providers.get(&provider).cloned()
    }

    /// All registered providers, ordered by provider id.
    pub fn providers(&self) -> Vec<Arc<dyn CloudProvider>> {
        let mut providers: Vec<_> = self.providers.values().cloned().collect();
        providers.sort_by_key(|p| p.provider());
        providers
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Reader contract and per-name provider cache.
//!
//! File-format readers (GeoTIFF groups, GeoPackage feature classes) live
//! outside this crate. They implement [`ProviderSource`]: given a provider
//! name and the dataset names actually required by the equations that
//! reference it, return a populated [`Provider`] or a descriptive error.
//! [`ProviderCache`] builds every provider once and shares it afterwards.
use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::{
    errors::{MprError, MprResult},
    provider::Provider,
};

/// Source of providers, implemented by file-format readers.
pub trait ProviderSource {
    /// Build provider `name` holding at least the datasets in `required`.
    ///
    /// # Errors
    /// - [`MprError::UnknownProvider`] if `name` cannot be resolved.
    /// - [`MprError::MissingDataset`] if a required dataset is absent.
    /// - [`MprError::Io`] for unreadable files.
    fn load(&self, name: &str, required: &BTreeSet<String>) -> MprResult<Provider>;
}

/// Source over providers that already live in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    providers: BTreeMap<String, Provider>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }
}

impl ProviderSource for InMemorySource {
    fn load(&self, name: &str, required: &BTreeSet<String>) -> MprResult<Provider> {
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| MprError::UnknownProvider { provider: name.to_string() })?;
        for dataset in required {
            provider.dataset(dataset)?;
        }
        Ok(provider.clone())
    }
}

/// Providers built once per name and shared by all equations.
#[derive(Debug, Default)]
pub struct ProviderCache {
    providers: BTreeMap<String, Provider>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return provider `name`, loading it from `source` on first request.
    pub fn get_or_load(
        &mut self, source: &dyn ProviderSource, name: &str, required: &BTreeSet<String>,
    ) -> MprResult<&mut Provider> {
        if !self.providers.contains_key(name) {
            let provider = source.load(name, required)?;
            info!(
                provider = name,
                kind = provider.kind_label(),
                shape = ?provider.shape(),
                datasets = provider.datasets().len(),
                "provider loaded"
            );
            self.providers.insert(name.to_string(), provider);
        }
        self.get_mut(name)
    }

    /// Load every provider named in `requirements` (name → dataset names).
    pub fn load_all(
        &mut self, source: &dyn ProviderSource, requirements: &BTreeMap<String, BTreeSet<String>>,
    ) -> MprResult<()> {
        for (name, required) in requirements {
            self.get_or_load(source, name, required)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> MprResult<&Provider> {
        self.providers
            .get(name)
            .ok_or_else(|| MprError::UnknownProvider { provider: name.to_string() })
    }

    pub fn get_mut(&mut self, name: &str) -> MprResult<&mut Provider> {
        self.providers
            .get_mut(name)
            .ok_or_else(|| MprError::UnknownProvider { provider: name.to_string() })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

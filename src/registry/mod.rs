//! Remote registry metadata retrieval.
//!
//! Each ecosystem has a native registrar; registrars compose into an ordered
//! fallback chain that tries each source in sequence and returns the first
//! success. The generic aggregator (deps.dev) sits at the end of the chain
//! for the ecosystems it covers.

mod advisory;
mod aggregator;
mod maven;
mod npm;
mod nuget;
mod packagist;
mod pypi;
mod rubygems;
mod store;

pub use advisory::AdvisoryClient;
pub use aggregator::AggregatorRegistrar;
pub use maven::MavenRegistrar;
pub use npm::NpmRegistrar;
pub use nuget::NugetRegistrar;
pub use packagist::PackagistRegistrar;
pub use pypi::PypiRegistrar;
pub use rubygems::RubygemsRegistrar;
pub use store::LibraryStore;

use crate::error::{DepTrailError, RegistryErrorKind, Result};
use crate::model::LibraryInfo;
use std::time::Duration;

/// Registry client configuration. Base URLs are overridable for tests.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Fixed delay between consecutive calls to rate-limited registries
    pub request_delay: Duration,
    pub npm_url: String,
    pub maven_search_url: String,
    pub maven_repo_url: String,
    pub nuget_url: String,
    pub pypi_url: String,
    pub rubygems_url: String,
    pub packagist_url: String,
    pub aggregator_url: String,
    pub advisory_url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            request_delay: Duration::from_millis(500),
            npm_url: "https://registry.npmjs.org".to_string(),
            maven_search_url: "https://search.maven.org/solrsearch/select".to_string(),
            maven_repo_url: "https://repo1.maven.org/maven2".to_string(),
            nuget_url: "https://api.nuget.org/v3/registration5-semver1".to_string(),
            pypi_url: "https://pypi.org/pypi".to_string(),
            rubygems_url: "https://rubygems.org/api/v1".to_string(),
            packagist_url: "https://repo.packagist.org/p2".to_string(),
            aggregator_url: "https://api.deps.dev/v3alpha".to_string(),
            advisory_url: "https://api.osv.dev".to_string(),
        }
    }
}

/// Fetch a JSON document, mapping HTTP failures onto the registry error
/// taxonomy. 404 is [`RegistryErrorKind::NotFound`].
pub(crate) fn get_json(config: &RegistryConfig, url: &str) -> Result<serde_json::Value> {
    let client = reqwest::blocking::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| DepTrailError::registry(url, RegistryErrorKind::NetworkError(e.to_string())))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| DepTrailError::registry(url, RegistryErrorKind::NetworkError(e.to_string())))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(DepTrailError::registry(
            url,
            RegistryErrorKind::NotFound(url.to_string()),
        ));
    }
    if !response.status().is_success() {
        return Err(DepTrailError::registry(
            url,
            RegistryErrorKind::ApiError(format!("registry returned {}", response.status())),
        ));
    }
    response
        .json()
        .map_err(|e| DepTrailError::registry(url, RegistryErrorKind::InvalidResponse(e.to_string())))
}

/// POST a JSON body and parse the JSON reply, same error mapping as
/// [`get_json`].
pub(crate) fn post_json<B: serde::Serialize>(
    config: &RegistryConfig,
    url: &str,
    body: &B,
) -> Result<serde_json::Value> {
    let client = reqwest::blocking::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| DepTrailError::registry(url, RegistryErrorKind::NetworkError(e.to_string())))?;

    let response = client
        .post(url)
        .json(body)
        .send()
        .map_err(|e| DepTrailError::registry(url, RegistryErrorKind::NetworkError(e.to_string())))?;

    if !response.status().is_success() {
        return Err(DepTrailError::registry(
            url,
            RegistryErrorKind::ApiError(format!("registry returned {}", response.status())),
        ));
    }
    response
        .json()
        .map_err(|e| DepTrailError::registry(url, RegistryErrorKind::InvalidResponse(e.to_string())))
}

/// Fetch a text document, same error mapping as [`get_json`].
pub(crate) fn get_text(config: &RegistryConfig, url: &str) -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| DepTrailError::registry(url, RegistryErrorKind::NetworkError(e.to_string())))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| DepTrailError::registry(url, RegistryErrorKind::NetworkError(e.to_string())))?;

    if !response.status().is_success() {
        return Err(DepTrailError::registry(
            url,
            RegistryErrorKind::ApiError(format!("registry returned {}", response.status())),
        ));
    }
    response
        .text()
        .map_err(|e| DepTrailError::registry(url, RegistryErrorKind::InvalidResponse(e.to_string())))
}

/// One remote metadata source.
pub trait Registrar: Send + Sync {
    /// Short source label for logging
    fn source(&self) -> &'static str;

    /// Fetch library metadata from this source, failable
    fn retrieve_from_registry(&self, name: &str) -> Result<LibraryInfo>;
}

/// Ordered fallback over registrars: each is tried in sequence, the first
/// success wins, failures are logged and the next source is consulted.
pub struct RegistrarChain {
    registrars: Vec<Box<dyn Registrar>>,
}

impl RegistrarChain {
    #[must_use]
    pub fn new(registrars: Vec<Box<dyn Registrar>>) -> Self {
        Self { registrars }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrars.is_empty()
    }

    /// Retrieve metadata for a library name through the chain.
    pub fn retrieve(&self, name: &str) -> Result<LibraryInfo> {
        for registrar in &self.registrars {
            match registrar.retrieve_from_registry(name) {
                Ok(info) => {
                    tracing::debug!(source = registrar.source(), name, "registry hit");
                    return Ok(info);
                }
                Err(err) => {
                    tracing::warn!(
                        source = registrar.source(),
                        name,
                        error = %err,
                        "registrar failed, trying next source"
                    );
                }
            }
        }
        Err(DepTrailError::registry(
            name,
            RegistryErrorKind::ChainExhausted(name.to_string()),
        ))
    }
}

/// The fallback chain for one ecosystem plugin: the native registrar first,
/// then the generic aggregator where it covers the ecosystem.
#[must_use]
pub fn chain_for(plugin_name: &str, config: &RegistryConfig) -> RegistrarChain {
    let mut registrars: Vec<Box<dyn Registrar>> = Vec::new();
    match plugin_name {
        "npm" => {
            registrars.push(Box::new(NpmRegistrar::new(config.clone())));
            registrars.push(Box::new(AggregatorRegistrar::new(config.clone(), "npm")));
        }
        "maven" => {
            registrars.push(Box::new(MavenRegistrar::new(config.clone())));
            registrars.push(Box::new(AggregatorRegistrar::new(config.clone(), "maven")));
        }
        "nuget" => {
            registrars.push(Box::new(NugetRegistrar::new(config.clone())));
            registrars.push(Box::new(AggregatorRegistrar::new(config.clone(), "nuget")));
        }
        "pypi" => {
            registrars.push(Box::new(PypiRegistrar::new(config.clone())));
            registrars.push(Box::new(AggregatorRegistrar::new(config.clone(), "pypi")));
        }
        "composer" => {
            registrars.push(Box::new(PackagistRegistrar::new(config.clone())));
        }
        "gem" => {
            registrars.push(Box::new(RubygemsRegistrar::new(config.clone())));
        }
        _ => {}
    }
    RegistrarChain::new(registrars)
}

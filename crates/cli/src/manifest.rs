use std::{env, fs, path::Path};

use anyhow::Context as _;
use jobpay_types::{Currency, ServiceCatalog, TokenPackCatalog};
use serde::{Deserialize, Serialize};
use url::Url;

/// JobPay manifest file (jobpay.yaml).
///
/// Secrets should be referenced as `${VAR}` placeholders resolved from the
/// environment at startup rather than committed to the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default = "default_currency")]
    pub currency: Currency,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub catalogs: CatalogsConfig,
}

impl Manifest {
    /// Load the manifest from the specified jobpay.yaml file path.
    pub fn load(manifest_file_path: &Path) -> anyhow::Result<Self> {
        if !manifest_file_path.exists() {
            anyhow::bail!(
                "jobpay.yaml not found at {}. Please create a jobpay.yaml file in your project root.",
                manifest_file_path.display()
            );
        }
        let content = fs::read_to_string(manifest_file_path)
            .with_context(|| format!("failed to read {}", manifest_file_path.display()))?;
        let manifest: Manifest = serde_yml::from_str(&content)
            .with_context(|| format!("failed to parse {}", manifest_file_path.display()))?;
        Ok(manifest)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Public origin providers call back into; must be reachable from the
    /// internet in production.
    pub public_base_url: Url,
    /// Customer-facing landing page for successful payments.
    pub success_url: Url,
    /// Customer-facing landing page for failed payments.
    pub failure_url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: "./jobpay.sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub payunit: PayunitConfig,
    pub monetbil: MonetbilConfig,
    pub campay: CampayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayunitConfig {
    pub api_user: String,
    pub api_password: String,
    pub api_key: String,
    #[serde(default = "default_payunit_url")]
    pub base_url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonetbilConfig {
    pub service_key: String,
    pub service_secret: String,
    #[serde(default = "default_monetbil_url")]
    pub base_url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampayConfig {
    pub app_username: String,
    pub app_password: String,
    #[serde(default = "default_campay_url")]
    pub base_url: Url,
}

/// Optional catalog overrides; anything absent falls back to the built-in
/// tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogsConfig {
    #[serde(default)]
    pub services: Option<ServiceCatalog>,
    #[serde(default)]
    pub packs: Option<TokenPackCatalog>,
}

impl CatalogsConfig {
    pub fn effective_services(&self) -> ServiceCatalog {
        match &self.services {
            Some(catalog) if !catalog.is_empty() => catalog.clone(),
            _ => ServiceCatalog::builtin(),
        }
    }

    pub fn effective_packs(&self) -> TokenPackCatalog {
        match &self.packs {
            Some(catalog) if !catalog.is_empty() => catalog.clone(),
            _ => TokenPackCatalog::builtin(),
        }
    }
}

/// Resolve a `${VAR}` placeholder against the environment; plain values pass
/// through untouched.
pub fn resolve_secret(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim();
    if let Some(name) = trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        return env::var(name).with_context(|| format!("environment variable {name} is not set"));
    }
    Ok(trimmed.to_string())
}

fn default_currency() -> Currency {
    Currency::Xaf
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_payunit_url() -> Url {
    // Safe: literal URL.
    Url::parse("https://gateway.payunit.net/api/").unwrap()
}

fn default_monetbil_url() -> Url {
    Url::parse("https://api.monetbil.com/").unwrap()
}

fn default_campay_url() -> Url {
    Url::parse("https://www.campay.net/api/").unwrap()
}

// Site Configuration
// Per-tenant settings resolved once at startup and shared read-only across requests.
// Integration metafields are typed: a site either declares an integration or it doesn't.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::models::content_entry::ContentType;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum SiteConfigError {
    #[error("Failed to read site configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid site configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Site '{site}': {message}")]
    Invalid { site: String, message: String },

    #[error("No site configured")]
    Empty,
}

pub type Result<T> = std::result::Result<T, SiteConfigError>;

// ============================================================================
// Integration Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpSettings {
    pub api_url: String,
    pub api_key: String,
    #[serde(default)]
    pub default_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoliaIndex {
    /// Logical name used by templates and middlewares (e.g. "products")
    pub name: String,
    /// Physical index prefix; the ERP locale is appended at query time
    pub index: String,
    /// Template page rendered when a record of this index matches the URL
    #[serde(default)]
    pub template_handle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoliaSettings {
    pub application_id: String,
    pub api_key: String,
    #[serde(default)]
    pub indices: Vec<AlgoliaIndex>,
}

impl AlgoliaSettings {
    pub fn find_index(&self, name: &str) -> Option<&AlgoliaIndex> {
        self.indices.iter().find(|index| index.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metafields {
    #[serde(default)]
    pub erp: Option<ErpSettings>,
    #[serde(default)]
    pub algolia: Option<AlgoliaSettings>,
}

// ============================================================================
// Site
// ============================================================================

fn default_locale() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub handle: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default)]
    pub locales: Vec<String>,
    #[serde(default)]
    pub prefix_default_locale: bool,
    /// Serve snippets through `<esi:include>` directives instead of inlining them
    #[serde(default)]
    pub edge_side_includes: bool,
    #[serde(default)]
    pub metafields: Metafields,
    #[serde(default)]
    pub content_types: Vec<ContentType>,
}

impl Site {
    pub fn erp(&self) -> Option<&ErpSettings> {
        self.metafields.erp.as_ref()
    }

    pub fn algolia(&self) -> Option<&AlgoliaSettings> {
        self.metafields.algolia.as_ref()
    }

    pub fn has_erp(&self) -> bool {
        self.metafields.erp.is_some()
    }

    /// All locales served by the site, default first
    pub fn all_locales(&self) -> Vec<&str> {
        let mut locales = vec![self.default_locale.as_str()];
        for locale in &self.locales {
            if locale != &self.default_locale {
                locales.push(locale.as_str());
            }
        }
        locales
    }

    pub fn is_locale(&self, candidate: &str) -> bool {
        self.all_locales().contains(&candidate)
    }

    pub fn content_type(&self, slug: &str) -> Option<&ContentType> {
        self.content_types.iter().find(|content_type| content_type.slug == slug)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: String| SiteConfigError::Invalid {
            site: self.handle.clone(),
            message,
        };

        if self.handle.trim().is_empty() {
            return Err(invalid("handle is required".to_string()));
        }

        if !self.locales.is_empty() && !self.locales.contains(&self.default_locale) {
            return Err(invalid(format!(
                "default locale '{}' is not listed in locales",
                self.default_locale
            )));
        }

        if let Some(erp) = self.erp() {
            Url::parse(&erp.api_url)
                .map_err(|e| invalid(format!("erp.api_url is not a valid URL: {}", e)))?;
            if erp.api_key.is_empty() {
                return Err(invalid("erp.api_key is required".to_string()));
            }
        }

        if let Some(algolia) = self.algolia() {
            if algolia.application_id.is_empty() || algolia.api_key.is_empty() {
                return Err(invalid(
                    "algolia.application_id and algolia.api_key are required".to_string(),
                ));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Site Registry
// ============================================================================

/// Read-only lookup of configured sites by request host
#[derive(Debug, Clone)]
pub struct SiteRegistry {
    sites: Vec<Arc<Site>>,
}

impl SiteRegistry {
    pub fn new(sites: Vec<Site>) -> Result<Self> {
        if sites.is_empty() {
            return Err(SiteConfigError::Empty);
        }

        for site in &sites {
            site.validate()?;
        }

        Ok(Self {
            sites: sites.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let sites: Vec<Site> = serde_json::from_str(json)?;
        Self::new(sites)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Resolve a site from a `Host` header value; unknown hosts fall back to the first site
    pub fn find(&self, host: Option<&str>) -> Arc<Site> {
        let domain = host.map(|h| h.split(':').next().unwrap_or(h).to_ascii_lowercase());

        if let Some(domain) = domain {
            if let Some(site) = self
                .sites
                .iter()
                .find(|site| site.domains.iter().any(|d| d.eq_ignore_ascii_case(&domain)))
            {
                return site.clone();
            }
        }

        self.sites[0].clone()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

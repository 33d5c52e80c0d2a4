pub mod site;

use std::env;
use std::time::Duration;
use anyhow::Result;

pub use site::{AlgoliaIndex, AlgoliaSettings, ErpSettings, Metafields, Site, SiteConfigError, SiteRegistry};

/// Two weeks
const DEFAULT_SESSION_TTL_SECS: u64 = 14 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub sites_path: String,
    pub snippets_dir: String,
    pub pages_dir: String,
    pub erp_timeout: Duration,
    /// Overrides `https://{application_id}-dsn.algolia.net` (local mocks, proxies)
    pub algolia_host: Option<String>,
    pub secure_cookies: bool,
    /// Sessions idle longer than this are evicted
    pub session_ttl: Duration,
    pub session_sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            sites_path: env::var("SITES_CONFIG").unwrap_or_else(|_| "./sites.json".to_string()),
            snippets_dir: env::var("SNIPPETS_DIR").unwrap_or_else(|_| "./snippets".to_string()),
            pages_dir: env::var("PAGES_DIR").unwrap_or_else(|_| "./pages".to_string()),
            erp_timeout: Duration::from_secs(
                env::var("ERP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            ),
            algolia_host: env::var("ALGOLIA_HOST").ok().filter(|h| !h.is_empty()),
            secure_cookies: env::var("SECURE_COOKIES")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            session_ttl: Duration::from_secs(
                env::var("SESSION_TTL_SECS")
                    .unwrap_or_else(|_| DEFAULT_SESSION_TTL_SECS.to_string())
                    .parse()?,
            ),
            session_sweep_interval: Duration::from_secs(
                env::var("SESSION_SWEEP_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?,
            ),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn load_sites(&self) -> Result<SiteRegistry> {
        let registry = SiteRegistry::from_file(&self.sites_path)?;
        tracing::info!("Loaded {} site(s) from {}", registry.len(), self.sites_path);
        Ok(registry)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            sites_path: "./sites.json".to_string(),
            snippets_dir: "./snippets".to_string(),
            pages_dir: "./pages".to_string(),
            erp_timeout: Duration::from_secs(10),
            algolia_host: None,
            secure_cookies: false,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            session_sweep_interval: Duration::from_secs(300),
        }
    }
}

pub mod algolia_service;
pub mod content_entry_service;
pub mod erp;
pub mod locale;
pub mod session_store;

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, Site};
use crate::models::request_context::RequestContext;

pub use algolia_service::{AlgoliaService, SearchError, SearchQuery, SearchResults};
pub use content_entry_service::{ContentEntryError, ContentEntryService, InMemoryContentEntryService};
pub use erp::{CustomerLifecycle, ErpClient, ErpError, ErpRecord, ErpService, SignupOutcome};
pub use session_store::SessionStore;

/// Long-lived pieces shared by every request: HTTP client, content store and
/// integration settings that don't depend on the site.
#[derive(Clone)]
pub struct ServiceRegistry {
    http_client: Client,
    content_entries: Arc<dyn ContentEntryService>,
    erp_timeout: Duration,
    algolia_host: Option<String>,
}

impl ServiceRegistry {
    pub fn new(
        content_entries: Arc<dyn ContentEntryService>,
        config: &AppConfig,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .connect_timeout(config.erp_timeout)
            .build()?;

        Ok(Self {
            http_client,
            content_entries,
            erp_timeout: config.erp_timeout,
            algolia_host: config.algolia_host.clone(),
        })
    }

    pub fn content_entries(&self) -> Arc<dyn ContentEntryService> {
        self.content_entries.clone()
    }

    /// Services bound to the request's site and locale
    pub fn build_instance(&self, ctx: &RequestContext) -> Services {
        Services {
            site: ctx.site.clone(),
            locale: ctx.locale.clone(),
            http_client: self.http_client.clone(),
            content_entries: self.content_entries.clone(),
            erp_timeout: self.erp_timeout,
            algolia_host: self.algolia_host.clone(),
        }
    }
}

/// Request-scoped service facade
pub struct Services {
    site: Arc<Site>,
    locale: String,
    http_client: Client,
    content_entries: Arc<dyn ContentEntryService>,
    erp_timeout: Duration,
    algolia_host: Option<String>,
}

impl Services {
    pub fn site(&self) -> &Site {
        &self.site
    }

    /// `None` when the site does not declare the ERP integration
    pub fn erp(&self) -> erp::erp_client::Result<Option<ErpService>> {
        let settings = match self.site.erp() {
            Some(settings) => settings,
            None => return Ok(None),
        };

        let client = ErpClient::new(settings, self.http_client.clone(), self.erp_timeout)?;
        Ok(Some(ErpService::new(client, settings.clone())))
    }

    /// `None` when the site does not declare the Algolia integration
    pub fn algolia(&self) -> Option<AlgoliaService> {
        self.site.algolia().map(|settings| {
            AlgoliaService::new(
                settings.clone(),
                self.locale.clone(),
                self.http_client.clone(),
                self.algolia_host.clone(),
            )
        })
    }

    pub fn content_entry(&self) -> &dyn ContentEntryService {
        self.content_entries.as_ref()
    }
}

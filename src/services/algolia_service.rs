// Algolia Search Service
// Per-site search over the configured indices through the Algolia REST API.
// Physical index names carry the ERP locale suffix (e.g. `shop_product_fr_FR`).

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{AlgoliaIndex, AlgoliaSettings};
use crate::services::locale::erp_locale;

/// Characters kept verbatim in an index path segment
const INDEX_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_').remove(b'-').remove(b'.');

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Unknown search index: {0}")]
    UnknownIndex(String),

    #[error("Search API error ({0}): {1}")]
    Api(StatusCode, String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<String>,
    pub page: u32,
    #[serde(rename = "hitsPerPage")]
    pub hits_per_page: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            filters: None,
            page: 0,
            hits_per_page: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub hits: Vec<Value>,
    #[serde(rename = "nbHits", default)]
    pub nb_hits: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(rename = "nbPages", default)]
    pub nb_pages: u32,
    #[serde(rename = "hitsPerPage", default)]
    pub hits_per_page: u32,
}

pub struct AlgoliaService {
    settings: AlgoliaSettings,
    locale: String,
    host: String,
    http_client: Client,
}

impl AlgoliaService {
    pub fn new(
        settings: AlgoliaSettings,
        locale: impl Into<String>,
        http_client: Client,
        host: Option<String>,
    ) -> Self {
        let host = host
            .unwrap_or_else(|| format!("https://{}-dsn.algolia.net", settings.application_id))
            .trim_end_matches('/')
            .to_string();

        Self {
            settings,
            locale: locale.into(),
            host,
            http_client,
        }
    }

    pub fn index_name(&self, index: &AlgoliaIndex) -> String {
        match erp_locale(&self.locale) {
            Some(suffix) => format!("{}_{}", index.index, suffix),
            None => index.index.clone(),
        }
    }

    /// Indices whose records are rendered through a template page
    pub fn templatized_indices(&self) -> impl Iterator<Item = &AlgoliaIndex> {
        self.settings
            .indices
            .iter()
            .filter(|index| index.template_handle.is_some())
    }

    pub async fn search(&self, name: &str, query: &SearchQuery) -> Result<SearchResults> {
        let index = self
            .settings
            .find_index(name)
            .ok_or_else(|| SearchError::UnknownIndex(name.to_string()))?;

        let url = format!(
            "{}/1/indexes/{}/query",
            self.host,
            utf8_percent_encode(&self.index_name(index), INDEX_SEGMENT)
        );

        let response = self
            .http_client
            .post(&url)
            .header("X-Algolia-Application-Id", self.settings.application_id.as_str())
            .header("X-Algolia-API-Key", self.settings.api_key.as_str())
            .json(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchError::Api(status, error_text));
        }

        Ok(response.json().await?)
    }

    pub async fn find_by_key(&self, name: &str, url_key: &str) -> Result<Option<Value>> {
        let query = SearchQuery {
            filters: Some(format!("url_key:\"{}\"", url_key.replace('"', "\\\""))),
            hits_per_page: 1,
            ..SearchQuery::default()
        };

        let results = self.search(name, &query).await?;

        Ok(results
            .hits
            .into_iter()
            .find(|hit| hit.get("url_key").and_then(Value::as_str) == Some(url_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AlgoliaSettings {
        AlgoliaSettings {
            application_id: "42".to_string(),
            api_key: "42".to_string(),
            indices: vec![
                AlgoliaIndex {
                    name: "products".to_string(),
                    index: "shop_product".to_string(),
                    template_handle: Some("product".to_string()),
                },
                AlgoliaIndex {
                    name: "facets".to_string(),
                    index: "shop_facet".to_string(),
                    template_handle: None,
                },
            ],
        }
    }

    #[test]
    fn test_index_name_uses_erp_locale() {
        let service = AlgoliaService::new(settings(), "fr", Client::new(), None);
        let index = settings().indices[0].clone();
        assert_eq!(service.index_name(&index), "shop_product_fr_FR");

        let service = AlgoliaService::new(settings(), "xx", Client::new(), None);
        assert_eq!(service.index_name(&index), "shop_product");
    }

    #[test]
    fn test_default_host() {
        let service = AlgoliaService::new(settings(), "en", Client::new(), None);
        assert_eq!(service.host, "https://42-dsn.algolia.net");

        let service = AlgoliaService::new(settings(), "en", Client::new(), Some("http://127.0.0.1:9/".to_string()));
        assert_eq!(service.host, "http://127.0.0.1:9");
    }

    #[test]
    fn test_templatized_indices() {
        let service = AlgoliaService::new(settings(), "en", Client::new(), None);
        let names: Vec<&str> = service.templatized_indices().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["products"]);
    }

    #[tokio::test]
    async fn test_unknown_index() {
        let service = AlgoliaService::new(settings(), "en", Client::new(), None);
        let result = service.search("orders", &SearchQuery::default()).await;
        assert!(matches!(result, Err(SearchError::UnknownIndex(_))));
    }

    #[test]
    fn test_query_serialization() {
        let query = SearchQuery {
            query: "shoe".to_string(),
            ..SearchQuery::default()
        };
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["hitsPerPage"], 20);
        assert!(json.get("filters").is_none());
    }
}

//! Index refresh and document removal.
//!
//! A refresh points the configured Fusion web datasource at a set of URLs
//! and starts a crawl job:
//!
//! 1. `GET {app}/connectors/datasources/{datasource}`
//! 2. rewrite `properties.startLinks` / `properties.maxItem`, `PUT` it back
//! 3. `POST {app}/jobs/datasource:{datasource}/actions` with `{"action":"start"}`
//!
//! Deletes go straight to the index pipeline. Nothing here surfaces an error
//! to the caller: failures are logged and reported as `false` or a status
//! code.

use anyhow::{bail, Context, Result};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::backend::{create_client, ClientTarget};
use crate::models::{Connector, Operation};
use crate::params::ParamMap;
use crate::query::CompiledRequest;
use crate::resolver::QueryConfigResolver;
use crate::store::{ConfigSnapshot, ConfigStore};

/// Result of a delete request: the backend status, or 400 for a
/// configuration problem and 502 when the backend could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub status_code: u16,
}

impl DeleteOutcome {
    pub const DELETED: u16 = 204;

    pub fn is_deleted(&self) -> bool {
        self.status_code == Self::DELETED
    }
}

/// Absolute `http(s)://host/...` URL check used for page removal.
pub fn is_page_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// Crawl start links: absolute URLs are kept, anything else is joined with
/// the recrawl domain.
pub fn start_links(domain: &str, urls: &[String]) -> Vec<String> {
    urls.iter()
        .map(|url| {
            if url.starts_with("http://") || url.starts_with("https://") {
                url.clone()
            } else {
                format!(
                    "{}/{}",
                    domain.trim_end_matches('/'),
                    url.trim_start_matches('/')
                )
            }
        })
        .collect()
}

/// Loose truthiness for the job `accepted` flag: `false`, `0`, `""`, `"0"`,
/// `null` and empty containers are all "not accepted".
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub struct IndexRefreshWorkflow {
    store: Arc<ConfigStore>,
}

impl IndexRefreshWorkflow {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// Recrawls `urls` through the datasource bound to `query_id`. `true`
    /// only when the crawl job was accepted.
    pub async fn refresh_index(&self, query_id: &str, urls: &[String]) -> bool {
        let snapshot = self.store.snapshot();
        match self.try_refresh(&snapshot, query_id, urls).await {
            Ok(accepted) => {
                if accepted {
                    tracing::info!(query_id, count = urls.len(), "crawl job accepted");
                } else {
                    tracing::warn!(query_id, urls = %urls.join(", "), "crawl job not accepted");
                }
                accepted
            }
            Err(e) => {
                tracing::error!(
                    query_id,
                    urls = %urls.join(", "),
                    error = %format!("{:#}", e),
                    "failed to re-index urls"
                );
                false
            }
        }
    }

    /// Refresh through the recrawl query id. `false` when none is set.
    pub async fn refresh_content(&self, urls: &[String]) -> bool {
        let query_id = self.store.snapshot().config.recrawl.query_id.trim().to_string();
        if query_id.is_empty() {
            tracing::debug!("recrawl query id is not configured; skipping refresh");
            return false;
        }
        self.refresh_index(&query_id, urls).await
    }

    async fn try_refresh(
        &self,
        snapshot: &ConfigSnapshot,
        query_id: &str,
        urls: &[String],
    ) -> Result<bool> {
        let (_, connector) = QueryConfigResolver::new(snapshot).resolve_connector(query_id)?;
        let recrawl = &snapshot.config.recrawl;
        let datasource = recrawl.datasource_name.trim();
        if datasource.is_empty() {
            bail!("recrawl.datasource_name is not configured");
        }

        let ds_client = create_client(
            connector,
            ClientTarget::App(format!("connectors/datasources/{}", datasource)),
        )?;
        let raw = ds_client
            .execute(&CompiledRequest::get("", ParamMap::new()), Operation::General)
            .await?;
        if !raw.is_ok() {
            bail!(
                "datasource '{}' lookup returned {} {}",
                datasource,
                raw.status,
                raw.status_message
            );
        }

        let mut datasource_config = raw
            .json()
            .with_context(|| format!("datasource '{}' configuration is not JSON", datasource))?;

        let Some(properties) = datasource_config
            .get_mut("properties")
            .and_then(Value::as_object_mut)
            .filter(|p| !p.is_empty())
        else {
            tracing::warn!(datasource, "datasource has no properties; nothing to refresh");
            return Ok(false);
        };
        properties.insert(
            "startLinks".to_string(),
            json!(start_links(&recrawl.domain, urls)),
        );
        properties.insert("maxItem".to_string(), json!(urls.len()));

        let raw = ds_client
            .execute(
                &CompiledRequest::json(Method::PUT, "", datasource_config),
                Operation::Index,
            )
            .await?;
        if !raw.is_ok() {
            bail!(
                "datasource '{}' update returned {} {}",
                datasource,
                raw.status,
                raw.status_message
            );
        }

        self.start_job(connector, datasource).await
    }

    async fn start_job(&self, connector: &Connector, datasource: &str) -> Result<bool> {
        let client = create_client(
            connector,
            ClientTarget::App(format!("jobs/datasource:{}/actions", datasource)),
        )?;
        let raw = client
            .execute(
                &CompiledRequest::json(Method::POST, "", json!({ "action": "start" })),
                Operation::Index,
            )
            .await?;
        if !raw.is_ok() {
            bail!(
                "crawl job for '{}' returned {} {}",
                datasource,
                raw.status,
                raw.status_message
            );
        }
        let job = raw.json().context("crawl job response is not JSON")?;
        Ok(job.get("accepted").is_some_and(is_truthy))
    }

    /// Removes the document `path` from the index behind `query_id`.
    pub async fn delete_document(&self, query_id: &str, path: &str) -> DeleteOutcome {
        let snapshot = self.store.snapshot();
        let resolved = QueryConfigResolver::new(&snapshot).resolve_connector(query_id);
        let connector = match resolved {
            Ok((_, connector)) => connector,
            Err(e) => {
                tracing::error!(query_id, document = path, error = %e, "delete not configured");
                return DeleteOutcome { status_code: 400 };
            }
        };

        let collection = connector.collection.trim();
        let pipeline = snapshot
            .config
            .recrawl
            .index_pipeline
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(collection);
        if collection.is_empty() || pipeline.is_empty() {
            tracing::error!(
                query_id,
                connector = %connector.id,
                "delete needs a collection and an index pipeline"
            );
            return DeleteOutcome { status_code: 400 };
        }

        let target = ClientTarget::Root(format!(
            "index-pipelines/{}/collections/{}/index",
            pipeline, collection
        ));
        let client = match create_client(connector, target) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(query_id, error = %e, "delete not configured");
                return DeleteOutcome { status_code: 400 };
            }
        };

        let body = json!([
            { "id": path },
            { "commands": [
                { "name": "delete", "params": [] },
                { "name": "commit", "params": [] }
            ]}
        ]);

        match client
            .execute(&CompiledRequest::json(Method::POST, "", body), Operation::Index)
            .await
        {
            Ok(raw) => {
                let outcome = DeleteOutcome {
                    status_code: raw.status,
                };
                if outcome.is_deleted() {
                    tracing::info!(query_id, document = path, "document deleted from index");
                } else {
                    tracing::error!(
                        query_id,
                        document = path,
                        status = raw.status,
                        message = %raw.status_message,
                        body = %raw.body,
                        "document was not deleted"
                    );
                }
                outcome
            }
            Err(e) => {
                tracing::error!(query_id, document = path, error = %e, "delete request failed");
                DeleteOutcome { status_code: 502 }
            }
        }
    }

    /// Removes a page by its public URL through the recrawl query id.
    pub async fn delete_page(&self, url: &str) -> DeleteOutcome {
        if !is_page_url(url) {
            tracing::warn!(url, "page url must be an absolute http(s) url");
            return DeleteOutcome { status_code: 400 };
        }
        let query_id = self.store.snapshot().config.recrawl.query_id.trim().to_string();
        if query_id.is_empty() {
            tracing::error!(url, "recrawl query id is not configured");
            return DeleteOutcome { status_code: 400 };
        }
        self.delete_document(&query_id, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_start_links_join_relative_urls() {
        let urls = vec![
            "/en/news/1".to_string(),
            "fr/page".to_string(),
            "https://other.example.com/x".to_string(),
        ];
        assert_eq!(
            start_links("https://www.example.com", &urls),
            vec![
                "https://www.example.com/en/news/1",
                "https://www.example.com/fr/page",
                "https://other.example.com/x",
            ]
        );
    }

    #[test]
    fn test_page_url_validation() {
        assert!(is_page_url("https://www.example.com/en/page"));
        assert!(is_page_url("http://localhost/a"));
        assert!(!is_page_url("/en/page"));
        assert!(!is_page_url("ftp://example.com/file"));
        assert!(!is_page_url("not a url"));
    }

    #[test]
    fn test_accepted_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("0")));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!([])));
    }

    #[test]
    fn test_delete_outcome_serializes_status_code() {
        let outcome = DeleteOutcome { status_code: 204 };
        assert!(outcome.is_deleted());
        assert_eq!(
            serde_json::to_value(outcome).unwrap(),
            json!({ "status_code": 204 })
        );
    }

    #[tokio::test]
    async fn test_unbound_query_id_fails_without_network() {
        let workflow = IndexRefreshWorkflow::new(Arc::new(ConfigStore::new(Config::default())));
        assert!(!workflow.refresh_index("refresh_index", &["/a".to_string()]).await);
        assert_eq!(
            workflow.delete_document("refresh_index", "/a").await,
            DeleteOutcome { status_code: 400 }
        );
        assert!(!workflow.refresh_content(&["/a".to_string()]).await);
    }

    #[tokio::test]
    async fn test_delete_page_rejects_relative_url() {
        let workflow = IndexRefreshWorkflow::new(Arc::new(ConfigStore::new(Config::default())));
        assert_eq!(workflow.delete_page("/en/page").await.status_code, 400);
    }
}

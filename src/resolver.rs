//! Query-id → connector + query definition lookup.
//!
//! Resolution is a pure lookup against one [`ConfigSnapshot`]; it never
//! touches the network. A binding whose connector is missing falls back to
//! the connector named [`FALLBACK_CONNECTOR`].

use crate::error::ConfigError;
use crate::models::{Connector, QueryConnectorBinding, QueryDefinition};
use crate::store::ConfigSnapshot;

pub const FALLBACK_CONNECTOR: &str = "solr";

/// The records a query-id resolved to.
#[derive(Debug, Clone)]
pub struct ResolvedQuery<'a> {
    pub binding: &'a QueryConnectorBinding,
    pub connector: &'a Connector,
    pub definition: &'a QueryDefinition,
}

pub struct QueryConfigResolver<'a> {
    snapshot: &'a ConfigSnapshot,
}

impl<'a> QueryConfigResolver<'a> {
    pub fn new(snapshot: &'a ConfigSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn resolve(&self, query_id: &str) -> Result<ResolvedQuery<'a>, ConfigError> {
        let (binding, connector) = self.resolve_connector(query_id)?;
        let definition = self
            .snapshot
            .query(&binding.query)
            .ok_or_else(|| ConfigError::MissingQueryDefinition(binding.query.clone()))?;

        Ok(ResolvedQuery {
            binding,
            connector,
            definition,
        })
    }

    /// Binding and connector only; the refresh workflow needs no query
    /// definition.
    pub fn resolve_connector(
        &self,
        query_id: &str,
    ) -> Result<(&'a QueryConnectorBinding, &'a Connector), ConfigError> {
        let snapshot: &'a ConfigSnapshot = self.snapshot;
        let binding = snapshot
            .binding(query_id)
            .ok_or_else(|| ConfigError::MissingBinding(query_id.to_string()))?;

        let connector = snapshot
            .connector(&binding.connector)
            .or_else(|| snapshot.connector(FALLBACK_CONNECTOR))
            .ok_or_else(|| ConfigError::MissingConnector(binding.connector.clone()))?;

        Ok((binding, connector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn snapshot(extra: &str) -> ConfigSnapshot {
        let content = format!(
            r#"
[connectors.solr]
kind = "solr"
host = "localhost"

[queries.news]
bundle = "article"

[query_connectors.news]
connector = "solr"
query = "news"

[query_connectors.events]
connector = "gone"
query = "news"
{}"#,
            extra
        );
        ConfigSnapshot::new(1, parse_config(&content).unwrap())
    }

    #[test]
    fn test_resolve_bound_query() {
        let snap = snapshot("");
        let resolved = QueryConfigResolver::new(&snap).resolve("news").unwrap();
        assert_eq!(resolved.connector.id, "solr");
        assert_eq!(resolved.definition.id, "news");
    }

    #[test]
    fn test_missing_binding() {
        let snap = snapshot("");
        let err = QueryConfigResolver::new(&snap).resolve("nope").unwrap_err();
        assert_eq!(err, ConfigError::MissingBinding("nope".into()));
    }

    #[test]
    fn test_missing_connector_falls_back_to_solr() {
        let snap = snapshot("");
        let resolved = QueryConfigResolver::new(&snap).resolve("events").unwrap();
        assert_eq!(resolved.connector.id, "solr");
    }

    #[test]
    fn test_missing_connector_without_fallback() {
        let mut config = snapshot("").config;
        config.connectors.clear();
        let snap = ConfigSnapshot::new(2, config);
        let err = QueryConfigResolver::new(&snap).resolve("events").unwrap_err();
        assert_eq!(err, ConfigError::MissingConnector("gone".into()));
    }

    #[test]
    fn test_missing_query_definition() {
        let mut config = snapshot("").config;
        config.queries.clear();
        let snap = ConfigSnapshot::new(2, config);
        let err = QueryConfigResolver::new(&snap).resolve("news").unwrap_err();
        assert_eq!(err, ConfigError::MissingQueryDefinition("news".into()));
    }
}

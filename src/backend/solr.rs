//! Solr URL layout.

use super::{incomplete, join_path, ClientTarget, SearchBackend};
use crate::error::ConfigError;
use crate::models::{BackendKind, Connector};

/// Plain Solr: handlers live directly below the collection (or core).
pub struct SolrBackend;

impl SearchBackend for SolrBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Solr
    }

    fn base_path(&self, connector: &Connector, target: &ClientTarget) -> Result<String, ConfigError> {
        match target {
            ClientTarget::Query => {
                let core = if connector.collection.is_empty() {
                    connector.core.as_str()
                } else {
                    connector.collection.as_str()
                };
                if core.is_empty() {
                    return Err(incomplete(connector, "solr connectors need a collection or core"));
                }
                Ok(join_path(&[&connector.path, core]))
            }
            // Solr has no application level.
            ClientTarget::App(path) | ClientTarget::Root(path) => {
                Ok(join_path(&[&connector.path, path]))
            }
            ClientTarget::Host(path) => Ok(join_path(&[path])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::connector;

    #[test]
    fn test_query_path_prefers_collection() {
        let mut c = connector(BackendKind::Solr);
        c.path = "/solr".into();
        assert_eq!(
            SolrBackend.base_path(&c, &ClientTarget::Query).unwrap(),
            "/solr/site"
        );

        c.collection.clear();
        assert_eq!(
            SolrBackend.base_path(&c, &ClientTarget::Query).unwrap(),
            "/solr/default"
        );

        c.core.clear();
        assert!(SolrBackend.base_path(&c, &ClientTarget::Query).is_err());
    }
}

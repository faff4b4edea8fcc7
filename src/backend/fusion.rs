//! Fusion URL layout.

use super::{incomplete, join_path, ClientTarget, SearchBackend};
use crate::error::ConfigError;
use crate::models::{BackendKind, Connector};

/// Fusion: queries go through an application's query pipeline; datasource
/// and job resources hang off the application; index pipelines sit at the
/// API root.
pub struct FusionBackend;

impl SearchBackend for FusionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fusion
    }

    fn base_path(&self, connector: &Connector, target: &ClientTarget) -> Result<String, ConfigError> {
        if connector.app.is_empty() {
            return Err(incomplete(connector, "fusion connectors need an app"));
        }
        let app = join_path(&[&connector.path, "apps", &connector.app]);

        match target {
            ClientTarget::Query => {
                if connector.core.is_empty() || connector.collection.is_empty() {
                    return Err(incomplete(
                        connector,
                        "fusion queries need a query pipeline (core) and a collection",
                    ));
                }
                Ok(join_path(&[
                    &app,
                    "query-pipelines",
                    &connector.core,
                    "collections",
                    &connector.collection,
                ]))
            }
            ClientTarget::App(path) => Ok(join_path(&[&app, path])),
            ClientTarget::Root(path) => Ok(join_path(&[&connector.path, path])),
            ClientTarget::Host(path) => Ok(join_path(&[path])),
        }
    }
}

//! Configuration records the search core is driven by.
//!
//! Every record is deserialized straight from the TOML configuration file
//! (see [`crate::config`]) and is immutable once loaded. Records are looked up
//! by id through a [`crate::store::ConfigSnapshot`].

use serde::Deserialize;
use std::time::Duration;

/// Which physical search engine a connector talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Solr,
    Fusion,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Solr => "solr",
            BackendKind::Fusion => "fusion",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basic-auth credentials embedded in the backend URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
    }
}

/// Kind of outbound call, used to pick the deadline from [`Timeouts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    General,
    Query,
    Index,
    Optimize,
    Finalize,
}

/// Per-operation deadlines, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Falls back to `timeout` when unset.
    #[serde(default)]
    pub query: Option<u64>,
    #[serde(default = "default_index_timeout")]
    pub index: u64,
    #[serde(default = "default_optimize_timeout")]
    pub optimize: u64,
    #[serde(default = "default_finalize_timeout")]
    pub finalize: u64,
}

fn default_timeout() -> u64 {
    5
}
fn default_index_timeout() -> u64 {
    5
}
fn default_optimize_timeout() -> u64 {
    10
}
fn default_finalize_timeout() -> u64 {
    30
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            query: None,
            index: default_index_timeout(),
            optimize: default_optimize_timeout(),
            finalize: default_finalize_timeout(),
        }
    }
}

impl Timeouts {
    pub fn seconds(&self, operation: Operation) -> u64 {
        match operation {
            Operation::General => self.timeout,
            Operation::Query => self.query.unwrap_or(self.timeout),
            Operation::Index => self.index,
            Operation::Optimize => self.optimize,
            Operation::Finalize => self.finalize,
        }
    }

    pub fn for_operation(&self, operation: Operation) -> Duration {
        Duration::from_secs(self.seconds(operation))
    }
}

/// How to reach one physical search backend instance.
#[derive(Debug, Clone, Deserialize)]
pub struct Connector {
    /// Filled from the table key when the config is loaded.
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "kind")]
    pub backend: BackendKind,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base path prefix, e.g. `/solr` or `/api`.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub signals_path: String,
    #[serde(default)]
    pub collection: String,
    /// Fusion application name.
    #[serde(default)]
    pub app: String,
    /// Solr core, or the Fusion query pipeline.
    #[serde(default)]
    pub core: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub timeouts: Timeouts,
}

fn default_scheme() -> String {
    "http".to_string()
}
fn default_port() -> u16 {
    8983
}

/// A `field:direction` sort entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: String,
}

impl SortSpec {
    /// Parses `field:direction`. Entries without a direction yield `None`.
    pub fn parse(raw: &str) -> Option<SortSpec> {
        let (field, direction) = raw.split_once(':')?;
        let (field, direction) = (field.trim(), direction.trim());
        if field.is_empty() || direction.is_empty() {
            return None;
        }
        Some(SortSpec {
            field: field.to_string(),
            direction: direction.to_string(),
        })
    }
}

/// Backend-agnostic description of a search behavior.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryDefinition {
    #[serde(skip)]
    pub id: String,
    /// Bundle filter; blank means "use the query id".
    #[serde(default)]
    pub bundle: String,
    /// Ordered `field:direction` entries.
    #[serde(default)]
    pub sort: Vec<String>,
    #[serde(default)]
    pub boost_field: String,
    /// Returned fields appended to the default field list.
    #[serde(default)]
    pub field_list: Vec<String>,
    /// Facet fields this query exposes.
    #[serde(default)]
    pub facet_list: Vec<String>,
    /// Raw filter-query strings.
    #[serde(default)]
    pub filter_query_list: Vec<String>,
    #[serde(default)]
    pub query_field_list: Vec<String>,
    /// Ordered `old:new` field renames applied to runtime filters.
    #[serde(default)]
    pub renamed_facet_fields: Vec<String>,
}

impl QueryDefinition {
    /// Sort specs in declared order, skipping malformed entries.
    pub fn sort_specs(&self) -> Vec<SortSpec> {
        self.sort.iter().filter_map(|s| SortSpec::parse(s)).collect()
    }

    /// Rename pairs in declared order, skipping malformed entries.
    pub fn renames(&self) -> Vec<(String, String)> {
        self.renamed_facet_fields
            .iter()
            .filter_map(|raw| {
                let (from, to) = raw.split_once(':')?;
                let (from, to) = (from.trim(), to.trim());
                (!from.is_empty() && !to.is_empty()).then(|| (from.to_string(), to.to_string()))
            })
            .collect()
    }

    pub fn has_facet(&self, field: &str) -> bool {
        self.facet_list.iter().any(|f| f == field)
    }

    /// Effective bundle: the configured filter, else the query id.
    pub fn bundle_or<'a>(&'a self, query_id: &'a str) -> &'a str {
        if self.bundle.trim().is_empty() {
            query_id
        } else {
            self.bundle.trim()
        }
    }
}

/// Maps a request query-id onto a connector and a query definition.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConnectorBinding {
    #[serde(skip)]
    pub query_id: String,
    pub connector: String,
    pub query: String,
}

/// A request parameter applied to every compiled select request.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalParameter {
    pub name: String,
    pub value: String,
}

/// A facet field a query definition can opt into through its facet list.
#[derive(Debug, Clone, Deserialize)]
pub struct FacetDeclaration {
    pub label: String,
    pub field: String,
    #[serde(default = "default_min_count")]
    pub min_count: u32,
    #[serde(default = "default_facet_limit")]
    pub limit: i64,
}

fn default_min_count() -> u32 {
    1
}
fn default_facet_limit() -> i64 {
    100
}

/// Governs the index refresh and delete workflow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecrawlSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Public origin the crawler can reach, without a trailing slash.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub datasource_name: String,
    /// Query id whose binding names the refresh connector.
    #[serde(default)]
    pub query_id: String,
    /// Index pipeline used for deletes; defaults to the connector collection.
    #[serde(default)]
    pub index_pipeline: Option<String>,
}

/// Global search settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub omit_header: bool,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

fn default_language() -> String {
    "en".to_string()
}
fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            omit_header: false,
            debug_mode: false,
            default_language: default_language(),
            languages: default_languages(),
        }
    }
}

impl Settings {
    pub fn is_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l == language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_spec_requires_direction() {
        assert_eq!(
            SortSpec::parse("start_date:desc"),
            Some(SortSpec {
                field: "start_date".into(),
                direction: "desc".into()
            })
        );
        assert_eq!(SortSpec::parse("label"), None);
        assert_eq!(SortSpec::parse("label:"), None);
    }

    #[test]
    fn test_query_timeout_falls_back_to_general() {
        let t = Timeouts::default();
        assert_eq!(t.seconds(Operation::Query), 5);
        assert_eq!(t.seconds(Operation::Finalize), 30);

        let t = Timeouts {
            query: Some(2),
            ..Timeouts::default()
        };
        assert_eq!(t.for_operation(Operation::Query), Duration::from_secs(2));
    }

    #[test]
    fn test_renames_skip_malformed() {
        let def = QueryDefinition {
            renamed_facet_fields: vec!["type:bundle".into(), "broken".into(), ":x".into()],
            ..Default::default()
        };
        assert_eq!(def.renames(), vec![("type".to_string(), "bundle".to_string())]);
    }

    #[test]
    fn test_bundle_defaults_to_query_id() {
        let def = QueryDefinition::default();
        assert_eq!(def.bundle_or("news"), "news");
        let def = QueryDefinition {
            bundle: "article".into(),
            ..Default::default()
        };
        assert_eq!(def.bundle_or("news"), "article");
    }
}

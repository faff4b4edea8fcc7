#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use solr_fusion::store::ConfigStore;

/// Writes a configuration whose connectors all point at `port` on
/// localhost and loads it into a store.
pub fn setup_store(port: u16, debug_mode: bool) -> (TempDir, Arc<ConfigStore>) {
    setup_store_with(port, debug_mode, "")
}

/// Like [`setup_store`], with `extra` TOML appended to the configuration.
pub fn setup_store_with(port: u16, debug_mode: bool, extra: &str) -> (TempDir, Arc<ConfigStore>) {
    let tmp = TempDir::new().unwrap();
    let path = write_config(&tmp, port, debug_mode, extra);
    let store = ConfigStore::from_path(&path).unwrap();
    (tmp, Arc::new(store))
}

pub fn write_config(tmp: &TempDir, port: u16, debug_mode: bool, extra: &str) -> PathBuf {
    let mut config_content = format!(
        r#"[settings]
debug_mode = {debug_mode}
default_language = "en"
languages = ["en", "fr"]

[connectors.solr]
kind = "solr"
host = "127.0.0.1"
port = {port}
path = "/solr"
collection = "site"

[connectors.fusion]
kind = "fusion"
host = "127.0.0.1"
port = {port}
path = "/api"
signals_path = "/api/signals"
app = "web"
core = "site-qp"
collection = "site"

[connectors.fusion.credentials]
username = "admin"
password = "secret"

[queries.site]
facet_list = ["bundle"]
renamed_facet_fields = ["type:bundle"]

[queries.news]
bundle = "article"
facet_list = ["bundle", "tags"]
renamed_facet_fields = ["type:bundle"]

[queries.suggest]

[query_connectors.search]
connector = "solr"
query = "site"

[query_connectors.admin_search]
connector = "solr"
query = "site"

[query_connectors.news]
connector = "solr"
query = "news"

[query_connectors.suggest]
connector = "solr"
query = "suggest"

[query_connectors.fusion_news]
connector = "fusion"
query = "news"

[query_connectors.refresh_index]
connector = "fusion"
query = "site"

[[facets]]
label = "Type"
field = "bundle"

[recrawl]
enabled = true
domain = "https://www.example.com"
datasource_name = "web-crawl"
query_id = "refresh_index"
"#
    );
    config_content.push_str(extra);

    let path = tmp.path().join("search.toml");
    fs::write(&path, config_content).unwrap();
    path
}

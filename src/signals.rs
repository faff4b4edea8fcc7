//! Click and query signal forwarding to Fusion.
//!
//! Browsers post signals tagged with a `bundle`; the bundle names a query
//! connector binding whose connector says where the signals collection
//! lives. Each signal is stamped with an id, the client IP and the Fusion
//! app before it is forwarded.

use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::backend::{create_client, join_path, ClientTarget};
use crate::models::{Connector, Operation};
use crate::query::CompiledRequest;
use crate::store::{ConfigSnapshot, ConfigStore};

pub const MSG_NO_CONNECTION: &str = "Bad Request. No query connection configuration was found.";
pub const MSG_SIGNALS_NO_RESPONSE: &str = "Bad Request. No response.";
pub const MSG_SUCCESS: &str = "Success.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalsOutcome {
    /// Status to answer the caller with.
    #[serde(skip)]
    pub http_status: u16,
    /// Backend status on success, else the caller-facing status.
    pub status_code: u16,
    pub status_message: String,
}

impl SignalsOutcome {
    fn failed(message: &str) -> Self {
        Self {
            http_status: 400,
            status_code: 400,
            status_message: message.to_string(),
        }
    }
}

pub struct SignalsForwarder {
    store: Arc<ConfigStore>,
}

impl SignalsForwarder {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// Forwards one signal object or an array of them.
    pub async fn forward(&self, payload: Value, client_ip: &str) -> SignalsOutcome {
        let snapshot = self.store.snapshot();

        let bundle = match &payload {
            Value::Array(items) => items.first().and_then(|s| s.get("bundle")),
            Value::Object(_) => payload.get("bundle"),
            _ => None,
        }
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

        let Some(connector) = signals_connector(&snapshot, &bundle) else {
            tracing::warn!(bundle = %bundle, "no query connector for signals bundle");
            return SignalsOutcome::failed(MSG_NO_CONNECTION);
        };

        let body = match payload {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| stamp(item, client_ip, &connector.app))
                    .collect(),
            ),
            item => stamp(item, client_ip, &connector.app),
        };

        let target = ClientTarget::Host(join_path(&[&connector.signals_path, &connector.app]));
        let client = match create_client(connector, target) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(connector = %connector.id, error = %e, "signals connector incomplete");
                return SignalsOutcome::failed(MSG_NO_CONNECTION);
            }
        };

        let mut request = CompiledRequest::json(Method::POST, "", body);
        request.params.append("commit", "true").append("async", "true");

        match client.execute(&request, Operation::General).await {
            Ok(raw) => {
                tracing::debug!(bundle = %bundle, status = raw.status, "signals forwarded");
                SignalsOutcome {
                    http_status: 200,
                    status_code: raw.status,
                    status_message: MSG_SUCCESS.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(bundle = %bundle, error = %e, "signals request failed");
                SignalsOutcome::failed(MSG_SIGNALS_NO_RESPONSE)
            }
        }
    }
}

/// The connector bound to `bundle`. Signals never use the fallback
/// connector.
fn signals_connector<'a>(snapshot: &'a ConfigSnapshot, bundle: &str) -> Option<&'a Connector> {
    if bundle.is_empty() {
        return None;
    }
    let binding = snapshot.binding(bundle)?;
    snapshot.connector(&binding.connector)
}

/// Adds `id`, `params.ip_address` and `params.app_id`, drops `bundle`.
fn stamp(signal: Value, client_ip: &str, app_id: &str) -> Value {
    let mut object = match signal {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    object.insert(
        "id".to_string(),
        Value::String(uuid::Uuid::new_v4().to_string()),
    );
    let params = object
        .entry("params")
        .or_insert_with(|| Value::Object(Map::new()));
    if !params.is_object() {
        *params = Value::Object(Map::new());
    }
    if let Value::Object(params) = params {
        params.insert("ip_address".to_string(), Value::String(client_ip.to_string()));
        params.insert("app_id".to_string(), Value::String(app_id.to_string()));
    }
    object.remove("bundle");
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    #[test]
    fn test_stamp_sets_id_and_params() {
        let signal = json!({"bundle": "news", "type": "click", "params": {"query": "rust"}});
        let stamped = stamp(signal, "10.0.0.1", "web");

        assert!(stamped.get("bundle").is_none());
        assert_eq!(stamped["type"], "click");
        assert_eq!(stamped["params"]["query"], "rust");
        assert_eq!(stamped["params"]["ip_address"], "10.0.0.1");
        assert_eq!(stamped["params"]["app_id"], "web");
        assert_eq!(stamped["id"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_stamp_replaces_scalar_params() {
        let stamped = stamp(json!({"params": "x"}), "::1", "web");
        assert_eq!(stamped["params"]["app_id"], "web");
    }

    #[tokio::test]
    async fn test_unknown_bundle_is_rejected() {
        let forwarder = SignalsForwarder::new(Arc::new(ConfigStore::new(Config::default())));
        let outcome = forwarder
            .forward(json!([{"bundle": "news"}]), "127.0.0.1")
            .await;
        assert_eq!(outcome.http_status, 400);
        assert_eq!(outcome.status_message, MSG_NO_CONNECTION);

        let outcome = forwarder.forward(json!("junk"), "127.0.0.1").await;
        assert_eq!(outcome.status_code, 400);
    }
}

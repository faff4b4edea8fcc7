//! Backend response normalization.
//!
//! Solr and Fusion replies are folded into one canonical JSON contract:
//!
//! - **search**: `{statusCode, statusMessage, responseHeader, headers, body,
//!   facetCounts, facetTranslations, highlighting, debugQuery?, fusionQueryId?}`
//! - **suggestion**: `{statusCode, statusMessage, responseHeader: [], headers,
//!   body: [term, ...], debugQuery?}`
//! - **error**: `{statusCode, statusMessage, statusDescription?, debugQuery?}`
//!
//! A non-200 reply is never reinterpreted: its status and reason phrase are
//! passed through, together with a best-effort `statusDescription` pulled
//! out of the error body. `debugQuery` is only ever emitted in debug mode.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::backend::RawResponse;
use crate::error::SearchError;
use crate::models::{BackendKind, FacetDeclaration, QueryDefinition};
use crate::translate::{TranslatedTerm, TranslationService};

const FUSION_QUERY_ID_HEADER: &str = "x-fusion-query-id";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub status_code: u16,
    pub status_message: String,
    pub response_header: Value,
    pub headers: Vec<String>,
    pub body: Value,
    pub facet_counts: Value,
    pub facet_translations: Vec<TranslatedTerm>,
    pub highlighting: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion_query_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    pub status_code: u16,
    pub status_message: String,
    pub response_header: Vec<Value>,
    pub headers: Vec<String>,
    pub body: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_query: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_query: Option<String>,
}

impl ErrorResponse {
    pub fn new(status_code: u16, status_message: impl Into<String>) -> Self {
        Self {
            status_code,
            status_message: status_message.into(),
            status_description: None,
            debug_query: None,
        }
    }
}

/// The canonical response in one of its three shapes.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CanonicalResponse {
    Search(SearchResponse),
    Suggest(SuggestResponse),
    Error(ErrorResponse),
}

impl CanonicalResponse {
    pub fn status_code(&self) -> u16 {
        match self {
            CanonicalResponse::Search(r) => r.status_code,
            CanonicalResponse::Suggest(r) => r.status_code,
            CanonicalResponse::Error(r) => r.status_code,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Per-request inputs of [`ResponseNormalizer::normalize`].
pub struct ResponseContext<'a> {
    pub definition: &'a QueryDefinition,
    pub facets: &'a [FacetDeclaration],
    pub language: &'a str,
    pub default_language: &'a str,
    pub backend: BackendKind,
    /// Compiled request URI, without credentials.
    pub debug_query: &'a str,
}

pub struct ResponseNormalizer<'a> {
    translations: &'a dyn TranslationService,
    debug_mode: bool,
}

impl<'a> ResponseNormalizer<'a> {
    pub fn new(translations: &'a dyn TranslationService, debug_mode: bool) -> Self {
        Self {
            translations,
            debug_mode,
        }
    }

    fn debug_query(&self, uri: &str) -> Option<String> {
        self.debug_mode.then(|| uri.to_string())
    }

    /// Normalizes a select reply.
    pub fn normalize(
        &self,
        raw: &RawResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<CanonicalResponse, SearchError> {
        if !raw.is_ok() {
            return Ok(CanonicalResponse::Error(self.backend_error(raw, ctx.debug_query)));
        }

        let body = decode_object(raw)?;

        let mut facet_counts = body.get("facet_counts").cloned().unwrap_or_else(|| json!({}));
        if let Some(fields) = facet_counts
            .get_mut("facet_fields")
            .and_then(Value::as_object_mut)
        {
            let allowed = allowed_facet_keys(ctx.definition, ctx.facets);
            fields.retain(|key, _| allowed.iter().any(|a| a == key));
        }

        let term_ids = facet_term_ids(&facet_counts, ctx.language);
        let facet_translations =
            self.translations
                .translate(&term_ids, ctx.language, ctx.default_language);

        let mut response = body.get("response").cloned().unwrap_or_else(|| json!({}));
        if let Some(docs) = response.get_mut("docs").and_then(Value::as_array_mut) {
            for doc in docs.iter_mut() {
                process_doc(doc, ctx.language);
            }
        }

        let fusion_query_id = (ctx.backend == BackendKind::Fusion).then(|| fusion_query_id(raw));

        Ok(CanonicalResponse::Search(SearchResponse {
            status_code: raw.status,
            status_message: raw.status_message.clone(),
            response_header: body
                .get("responseHeader")
                .cloned()
                .unwrap_or_else(|| json!([])),
            headers: raw.headers.clone(),
            body: response,
            facet_counts,
            facet_translations,
            highlighting: body.get("highlighting").cloned().unwrap_or_else(|| json!("")),
            debug_query: self.debug_query(ctx.debug_query),
            fusion_query_id,
        }))
    }

    /// Normalizes a suggestion reply into a flat term list.
    pub fn normalize_suggestion(
        &self,
        raw: &RawResponse,
        debug_query: &str,
    ) -> Result<CanonicalResponse, SearchError> {
        if !raw.is_ok() {
            return Ok(CanonicalResponse::Error(self.backend_error(raw, debug_query)));
        }

        let body = decode_object(raw)?;

        Ok(CanonicalResponse::Suggest(SuggestResponse {
            status_code: raw.status,
            status_message: raw.status_message.clone(),
            response_header: Vec::new(),
            headers: raw.headers.clone(),
            body: suggest_terms(&body),
            debug_query: self.debug_query(debug_query),
        }))
    }

    /// Error-shaped response for a non-200 reply.
    pub fn backend_error(&self, raw: &RawResponse, debug_query: &str) -> ErrorResponse {
        ErrorResponse {
            status_code: raw.status,
            status_message: raw.status_message.clone(),
            status_description: Some(error_description(&raw.body)),
            debug_query: self.debug_query(debug_query),
        }
    }
}

fn decode_object(raw: &RawResponse) -> Result<Map<String, Value>, SearchError> {
    match serde_json::from_str::<Value>(&raw.body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SearchError::Normalization(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(SearchError::Normalization(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Facet keys a query may expose: its listed fields, plus the labels of
/// declared facets on those fields.
fn allowed_facet_keys(definition: &QueryDefinition, facets: &[FacetDeclaration]) -> Vec<String> {
    let mut allowed: Vec<String> = definition.facet_list.clone();
    for facet in facets {
        if definition.has_facet(&facet.field) && !allowed.contains(&facet.label) {
            allowed.push(facet.label.clone());
        }
    }
    allowed
}

/// Term ids of every facet except the one keyed by the request language.
/// Handles both `json.nl=map` objects and flat `[term, count, ...]` arrays.
fn facet_term_ids(facet_counts: &Value, language: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let Some(fields) = facet_counts.get("facet_fields").and_then(Value::as_object) else {
        return ids;
    };
    for (key, terms) in fields {
        if key == language {
            continue;
        }
        match terms {
            Value::Object(map) => ids.extend(map.keys().cloned()),
            Value::Array(flat) => ids.extend(flat.iter().step_by(2).filter_map(scalar_string)),
            _ => {}
        }
    }
    ids
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_or_self(value: &Value) -> Value {
    match value {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

fn process_doc(doc: &mut Value, language: &str) {
    let Some(fields) = doc.as_object_mut() else {
        return;
    };

    if !fields.get("url").is_some_and(|u| !u.is_null()) {
        fields.insert("url".to_string(), json!(""));
    }
    fields.insert("elevated".to_string(), json!(false));

    let content_language = fields
        .get("Content_Language")
        .or_else(|| fields.get("content_language"))
        .map(first_or_self)
        .unwrap_or_else(|| json!([language]));
    fields.insert("content_language".to_string(), content_language);
}

/// Flattens `suggest.<dictionary>.<query>.suggestions[].term`.
fn suggest_terms(body: &Map<String, Value>) -> Vec<String> {
    let mut terms = Vec::new();
    let Some(dictionaries) = body.get("suggest").and_then(Value::as_object) else {
        return terms;
    };
    for dictionary in dictionaries.values().filter_map(Value::as_object) {
        for group in dictionary.values() {
            let Some(suggestions) = group.get("suggestions").and_then(Value::as_array) else {
                continue;
            };
            terms.extend(
                suggestions
                    .iter()
                    .filter_map(|s| s.get("term"))
                    .filter_map(Value::as_str)
                    .map(str::to_string),
            );
        }
    }
    terms
}

/// Correlation id from the `x-fusion-query-id` header, or `""`. Only the
/// segment between the first and second colon of the header line is kept.
pub fn fusion_query_id(raw: &RawResponse) -> String {
    raw.header_line(FUSION_QUERY_ID_HEADER)
        .and_then(|line| line.split(':').nth(1))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

/// Best-effort description of a backend error body.
///
/// Tries the Solr error envelope (`error.msg`) first, then the Fusion
/// envelope (`cause.message`, which may embed a Solr envelope, else `code`).
/// Returns `""` when neither matches.
pub fn error_description(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return String::new();
    };

    if let Some(msg) = solr_error_msg(&value) {
        return msg;
    }

    if let Some(message) = value.pointer("/cause/message").and_then(Value::as_str) {
        if let Some(embedded) = embedded_solr_error(message) {
            return embedded;
        }
    }

    value.get("code").and_then(scalar_string).unwrap_or_default()
}

fn solr_error_msg(value: &Value) -> Option<String> {
    value
        .pointer("/error/msg")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Finds a JSON object inside free text and reads its `error.msg`.
fn embedded_solr_error(message: &str) -> Option<String> {
    message.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&message[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => solr_error_msg(&value),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::StaticTranslations;
    use std::collections::BTreeMap;

    fn raw(status: u16, message: &str, body: Value) -> RawResponse {
        RawResponse {
            status,
            status_message: message.into(),
            headers: vec![
                format!("HTTP/1.1 {} {}", status, message),
                "content-type: application/json".into(),
                "x-fusion-query-id: 9f1c: extra".into(),
            ],
            body: body.to_string(),
        }
    }

    fn definition() -> QueryDefinition {
        QueryDefinition {
            facet_list: vec!["bundle".into(), "tags".into()],
            ..Default::default()
        }
    }

    fn translations() -> StaticTranslations<'static> {
        let mut terms = BTreeMap::new();
        terms.insert(
            "12".to_string(),
            BTreeMap::from([("en".to_string(), "News".to_string())]),
        );
        StaticTranslations::new(terms)
    }

    fn search_body() -> Value {
        json!({
            "responseHeader": {"status": 0, "QTime": 3},
            "response": {
                "numFound": 3,
                "docs": [
                    {"id": "a", "url": "/a", "Content_Language": ["fr"]},
                    {"id": "b", "content_language": ["de", "en"]},
                    {"id": "c"}
                ]
            },
            "facet_counts": {
                "facet_fields": {
                    "en": {"en": 3},
                    "Type": {"12": 2},
                    "tags": {"12": 1},
                    "secret_field": {"x": 9}
                }
            },
            "highlighting": {"a": {"content": ["<em>x</em>"]}}
        })
    }

    fn ctx<'a>(def: &'a QueryDefinition, facets: &'a [FacetDeclaration], backend: BackendKind) -> ResponseContext<'a> {
        ResponseContext {
            definition: def,
            facets,
            language: "en",
            default_language: "en",
            backend,
            debug_query: "http://solr:8983/solr/site/select?q=x",
        }
    }

    #[test]
    fn test_normalize_search() {
        let t = translations();
        let def = definition();
        let facets = vec![FacetDeclaration {
            label: "Type".into(),
            field: "bundle".into(),
            min_count: 1,
            limit: 10,
        }];
        let normalizer = ResponseNormalizer::new(&t, false);
        let out = normalizer
            .normalize(&raw(200, "OK", search_body()), &ctx(&def, &facets, BackendKind::Solr))
            .unwrap();
        let json = out.to_json();

        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["responseHeader"]["QTime"], 3);
        let fields = json["facetCounts"]["facet_fields"].as_object().unwrap();
        let mut keys: Vec<&String> = fields.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["Type", "tags"]);

        assert_eq!(
            json["facetTranslations"],
            json!([{"id": "12", "name": "News", "language": "en"}])
        );

        let docs = json["body"]["docs"].as_array().unwrap();
        assert_eq!(docs[0]["content_language"], "fr");
        assert_eq!(docs[1]["content_language"], "de");
        assert_eq!(docs[2]["content_language"], json!(["en"]));
        assert_eq!(docs[2]["url"], "");
        assert!(docs.iter().all(|d| d["elevated"] == json!(false)));

        assert_eq!(json["highlighting"]["a"]["content"][0], "<em>x</em>");
        assert!(json.get("debugQuery").is_none());
        assert!(json.get("fusionQueryId").is_none());
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let t = translations();
        let def = definition();
        let normalizer = ResponseNormalizer::new(&t, true);
        let out = normalizer
            .normalize(
                &raw(200, "OK", json!({"response": {"numFound": 0, "docs": []}})),
                &ctx(&def, &[], BackendKind::Fusion),
            )
            .unwrap();
        let json = out.to_json();
        assert_eq!(json["responseHeader"], json!([]));
        assert_eq!(json["highlighting"], "");
        assert_eq!(json["debugQuery"], "http://solr:8983/solr/site/select?q=x");
        assert_eq!(json["fusionQueryId"], "9f1c");
    }

    #[test]
    fn test_undecodable_body_is_412() {
        let t = translations();
        let def = definition();
        let normalizer = ResponseNormalizer::new(&t, false);
        let mut response = raw(200, "OK", json!({}));
        response.body = "a:2:{i:0;".into();
        let err = normalizer
            .normalize(&response, &ctx(&def, &[], BackendKind::Solr))
            .unwrap_err();
        assert_eq!(err.status_code(), 412);
    }

    #[test]
    fn test_non_200_passes_through() {
        let t = translations();
        let def = definition();
        let body = json!({"error": {"msg": "undefined field foo", "code": 400}});

        let quiet = ResponseNormalizer::new(&t, false)
            .normalize(&raw(503, "Service Unavailable", body.clone()), &ctx(&def, &[], BackendKind::Solr))
            .unwrap()
            .to_json();
        assert_eq!(quiet["statusCode"], 503);
        assert_eq!(quiet["statusMessage"], "Service Unavailable");
        assert_eq!(quiet["statusDescription"], "undefined field foo");
        assert!(quiet.get("debugQuery").is_none());

        let debug = ResponseNormalizer::new(&t, true)
            .normalize(&raw(503, "Service Unavailable", body), &ctx(&def, &[], BackendKind::Solr))
            .unwrap()
            .to_json();
        assert!(debug.get("debugQuery").is_some());
    }

    #[test]
    fn test_error_description_strategies() {
        assert_eq!(
            error_description(r#"{"error":{"msg":"bad sort"}}"#),
            "bad sort"
        );
        assert_eq!(
            error_description(
                r#"{"cause":{"message":"Solr said {\"error\":{\"msg\":\"no such core\"}} while querying"}}"#
            ),
            "no such core"
        );
        assert_eq!(
            error_description(r#"{"code":"Unauthorized","cause":{"message":"denied"}}"#),
            "Unauthorized"
        );
        assert_eq!(error_description("<html>502</html>"), "");
    }

    #[test]
    fn test_suggestion_terms_flattened() {
        let t = translations();
        let body = json!({
            "suggest": {"dict": {"term": {"numFound": 2, "suggestions": [{"term": "foo"}, {"term": "bar"}]}}}
        });
        let out = ResponseNormalizer::new(&t, false)
            .normalize_suggestion(&raw(200, "OK", body), "uri")
            .unwrap()
            .to_json();
        assert_eq!(out["body"], json!(["foo", "bar"]));
        assert_eq!(out["responseHeader"], json!([]));
        assert!(out.get("debugQuery").is_none());
    }

    #[test]
    fn test_flat_facet_arrays() {
        let counts = json!({"facet_fields": {"Type": ["12", 4, "13", 1], "en": ["en", 5]}});
        assert_eq!(facet_term_ids(&counts, "en"), vec!["12", "13"]);
    }
}

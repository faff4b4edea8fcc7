//! Select and suggestion request compilation.
//!
//! [`RequestBuilder`] turns a [`QueryDefinition`] plus the caller's runtime
//! parameters into a backend-agnostic [`CompiledRequest`]. Compilation runs
//! in two passes:
//!
//! 1. [`RequestBuilder::build_select`] assembles a [`SelectQuery`]: defaults,
//!    global parameters, paging, sort, boost, runtime filter groups, bundle
//!    and language scoping, query fields and facets.
//! 2. Post-processing: every query id except `admin_search` gets a `q.alt`
//!    built from its filter queries; `admin_search` instead runs
//!    [`SelectQuery::apply_tagged_exclusion`], which tags each filter query
//!    with its key and switches facet fields from `{!key=..}` to `{!ex=..}`.
//!
//! A handful of query ids carry fixed behavior; they are listed in
//! [`query_ids`].

use regex::Regex;
use reqwest::Method;
use std::sync::OnceLock;

use crate::error::SearchError;
use crate::models::{FacetDeclaration, GlobalParameter, QueryDefinition, Settings, SortSpec};
use crate::params::ParamMap;
use crate::store::ConfigSnapshot;

/// Query ids with hard-wired compile rules.
pub mod query_ids {
    /// Open site search: no bundle filter; empty text is rejected.
    pub const SEARCH: &str = "search";
    /// Administrative report: no bundle or language filter, OR-joined
    /// filter groups, 100 rows, tagged facet exclusion.
    pub const ADMIN_SEARCH: &str = "admin_search";
    /// Typeahead suggestions.
    pub const SUGGEST: &str = "suggest";
    /// `date_sort=previous` switches to past events.
    pub const EVENT: &str = "event";
    pub const BLOG_POST: &str = "blog_post";
    pub const BLOG_CHANNEL: &str = "blog_channel";
    /// Accepts `fq` as a category filter.
    pub const BLOG_POST_CHANNEL: &str = "blog_post_channel";
    /// Accepts `fq` as an author filter.
    pub const BLOG_AUTHOR_LIST: &str = "blog_author_list";

    /// Query ids that are never pinned to a bundle.
    pub fn is_open(query_id: &str) -> bool {
        query_id == SEARCH || query_id == ADMIN_SEARCH
    }

    /// Query ids that force `q.op=AND`.
    pub fn forces_and(query_id: &str) -> bool {
        query_id == BLOG_POST || query_id == BLOG_CHANNEL
    }

    /// Filter-query key the runtime `fq` parameter is stored under.
    pub fn extra_filter_key(query_id: &str) -> Option<&'static str> {
        match query_id {
            BLOG_POST_CHANNEL => Some("taxonomy_blog_post_category"),
            BLOG_AUTHOR_LIST => Some("post_authors"),
            _ => None,
        }
    }
}

pub const PAGE_SIZE: u64 = 10;
pub const ADMIN_PAGE_SIZE: u64 = 100;
pub const MATCH_ALL: &str = "*";
pub const LANGUAGE_FACET_LIMIT: i64 = 50;
const PREVIOUS_DATE_SORT: &str = "previous";
const SUGGEST_HANDLER: &str = "suggest";
const SELECT_HANDLER: &str = "select";

/// Fields always requested ahead of a query's own field list.
pub const DEFAULT_FIELDS: &[&str] = &[
    "id",
    "entity_id",
    "entity_type",
    "bundle",
    "bundle_name",
    "label",
    "ss_language",
    "score",
    "[elevated]",
    "is_comment_count",
    "ds_created",
    "ds_changed",
    "source",
    "path",
    "url",
    "is_uid",
    "tos_name",
    "dc_title",
];

/// Parameters applied to every select request before global parameters.
const DEFAULT_PARAMS: &[(&str, &str)] = &[
    ("mm", "1"),
    ("pf", "content^2.0"),
    ("ps", "15"),
    ("hl", "true"),
    ("hl.fl", "content"),
    ("hl.snippets", "3"),
    ("hl.mergeContiguous", "true"),
    ("f.content.hl.alternateField", "teaser"),
    ("f.content.hl.maxAlternateFieldLength", "256"),
];

// ============ Compiled request ============

/// A wire-level request, relative to a backend client's base URL.
#[derive(Debug, Clone)]
pub struct CompiledRequest {
    pub method: Method,
    /// Path below the client base; empty addresses the base itself.
    pub handler: String,
    pub headers: Vec<(String, String)>,
    pub params: ParamMap,
    pub body: Option<serde_json::Value>,
}

impl CompiledRequest {
    pub fn get(handler: impl Into<String>, params: ParamMap) -> Self {
        Self {
            method: Method::GET,
            handler: handler.into(),
            headers: Vec::new(),
            params,
            body: None,
        }
    }

    pub fn json(method: Method, handler: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method,
            handler: handler.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            params: ParamMap::new(),
            body: Some(body),
        }
    }
}

// ============ Runtime parameters ============

/// Per-request inputs supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RuntimeParams {
    /// Raw free text (`q`, or `keys` for the admin report).
    pub text: String,
    /// Raw `field:value` filter tokens (`f`).
    pub filters: Vec<String>,
    /// Resolved language, or `*` for every language on `admin_search`.
    pub language: String,
    pub page: u64,
    pub date_sort: Option<String>,
    /// Raw `fq`, honored only by the blog listing query ids.
    pub extra_filter_query: Option<String>,
}

impl RuntimeParams {
    /// Non-numeric pages count as page 0; negative pages use their
    /// absolute value.
    pub fn parse_page(raw: Option<&str>) -> u64 {
        raw.and_then(|p| p.trim().parse::<f64>().ok())
            .filter(|p| p.is_finite())
            .map(|p| p.abs().trunc() as u64)
            .unwrap_or(0)
    }
}

fn tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex compiles"))
}

/// Removes HTML tags.
pub fn strip_tags(raw: &str) -> String {
    tag_regex().replace_all(raw, "").into_owned()
}

/// Tag-stripped free text. Form-decoded only when it carries no `%`, so
/// already-encoded input is left alone.
pub fn clean_text(raw: &str) -> String {
    let text = strip_tags(raw);
    // Without a `%` the only form encoding left to undo is `+`.
    let text = if text.contains('%') {
        text
    } else {
        text.replace('+', " ")
    };
    text.trim().to_string()
}

/// Escapes `&`, `<` and `>`. Quotes, `+` and `-` pass through.
pub fn escape_html_noquotes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_html(value: &str) -> String {
    escape_html_noquotes(value)
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

// ============ Select query ============

/// A named filter query (`fq`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterQuery {
    pub key: String,
    pub query: String,
    pub tags: Vec<String>,
}

impl FilterQuery {
    pub fn render(&self) -> String {
        if self.tags.is_empty() {
            self.query.clone()
        } else {
            format!("{{!tag={}}}{}", self.tags.join(","), self.query)
        }
    }
}

/// How a facet field's local parameter is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetLocal {
    /// `{!key=label}field`: labels the facet in the response.
    Key,
    /// `{!ex=tag}field`: excludes filter queries tagged `tag` from the count.
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetField {
    pub key: String,
    pub field: String,
    pub min_count: u32,
    pub limit: i64,
    pub local: FacetLocal,
}

impl FacetField {
    pub fn render(&self) -> String {
        let local = match self.local {
            FacetLocal::Key => "key",
            FacetLocal::Exclude => "ex",
        };
        format!("{{!{}={}}}{}", local, self.key, self.field)
    }
}

/// An uncompiled select query. Public so callers can inspect the filter and
/// facet structure before it is flattened into parameters.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub query_id: String,
    pub text: String,
    pub params: ParamMap,
    pub sorts: Vec<SortSpec>,
    pub fields: Vec<String>,
    pub filters: Vec<FilterQuery>,
    pub facets: Vec<FacetField>,
}

impl SelectQuery {
    fn new(query_id: &str, text: String) -> Self {
        Self {
            query_id: query_id.to_string(),
            text,
            params: ParamMap::new(),
            sorts: Vec::new(),
            fields: Vec::new(),
            filters: Vec::new(),
            facets: Vec::new(),
        }
    }

    /// Adds a filter query. A later filter under the same key replaces the
    /// earlier one in place.
    pub fn add_filter_query(&mut self, key: impl Into<String>, query: impl Into<String>) {
        let key = key.into();
        let query = query.into();
        match self.filters.iter_mut().find(|f| f.key == key) {
            Some(existing) => existing.query = query,
            None => self.filters.push(FilterQuery {
                key,
                query,
                tags: Vec::new(),
            }),
        }
    }

    pub fn filter_query(&self, key: &str) -> Option<&FilterQuery> {
        self.filters.iter().find(|f| f.key == key)
    }

    /// Every filter query's text, parenthesized and AND-joined.
    pub fn q_alt(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        Some(
            self.filters
                .iter()
                .map(|f| format!("({})", f.query))
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    /// Tags each filter query with its own key and turns every facet field
    /// into an exclusion of that tag, so a facet's counts ignore the
    /// filter built from it.
    pub fn apply_tagged_exclusion(&mut self) {
        for filter in &mut self.filters {
            if !filter.tags.contains(&filter.key) {
                filter.tags.push(filter.key.clone());
            }
        }
        for facet in &mut self.facets {
            facet.local = FacetLocal::Exclude;
        }
    }

    pub fn into_request(self) -> CompiledRequest {
        let mut params = self.params;

        if !self.sorts.is_empty() {
            let sort = self
                .sorts
                .iter()
                .map(|s| format!("{} {}", s.field, s.direction))
                .collect::<Vec<_>>()
                .join(",");
            params.set("sort", sort);
        }

        if !self.fields.is_empty() {
            params.set("fl", self.fields.join(","));
        }

        params.set("q", self.text);

        for filter in &self.filters {
            params.append("fq", filter.render());
        }

        if !self.facets.is_empty() {
            params.set("facet", "true");
            for facet in &self.facets {
                params.append("facet.field", facet.render());
                params.append(
                    format!("f.{}.facet.mincount", facet.field),
                    facet.min_count.to_string(),
                );
                params.append(format!("f.{}.facet.limit", facet.field), facet.limit.to_string());
            }
        }

        CompiledRequest::get(SELECT_HANDLER, params)
    }
}

// ============ Builder ============

/// Compiles query definitions against the records of one snapshot.
pub struct RequestBuilder<'a> {
    settings: &'a Settings,
    parameters: &'a [GlobalParameter],
    facets: &'a [FacetDeclaration],
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        settings: &'a Settings,
        parameters: &'a [GlobalParameter],
        facets: &'a [FacetDeclaration],
    ) -> Self {
        Self {
            settings,
            parameters,
            facets,
        }
    }

    pub fn from_snapshot(snapshot: &'a ConfigSnapshot) -> Self {
        Self::new(
            &snapshot.config.settings,
            &snapshot.config.parameters,
            &snapshot.config.facets,
        )
    }

    /// Compiles a select request, including the `q.alt` / tagged-exclusion
    /// post-processing pass.
    pub fn build(
        &self,
        query_id: &str,
        definition: &QueryDefinition,
        runtime: &RuntimeParams,
    ) -> Result<CompiledRequest, SearchError> {
        let mut query = self.build_select(query_id, definition, runtime)?;

        if query_id == query_ids::ADMIN_SEARCH {
            query.apply_tagged_exclusion();
        } else if let Some(q_alt) = query.q_alt() {
            query.params.set("q.alt", q_alt);
        }

        Ok(query.into_request())
    }

    /// Assembles the select query without the post-processing pass.
    pub fn build_select(
        &self,
        query_id: &str,
        definition: &QueryDefinition,
        runtime: &RuntimeParams,
    ) -> Result<SelectQuery, SearchError> {
        let bundle = definition.bundle_or(query_id);
        let text = clean_text(&runtime.text);
        if text.is_empty() && bundle == query_ids::SEARCH {
            return Err(SearchError::MissingQueryText);
        }
        let text = if text.is_empty() {
            MATCH_ALL.to_string()
        } else {
            text
        };

        let is_admin = query_id == query_ids::ADMIN_SEARCH;
        let mut query = SelectQuery::new(query_id, text);

        // Defaults, then global parameters
        query
            .params
            .append("wt", "json")
            .append("json.nl", "map")
            .append("omitHeader", self.settings.omit_header.to_string());
        for (name, value) in DEFAULT_PARAMS {
            query.params.append(*name, *value);
        }
        query.params.append("facet.mincount", "1");
        for parameter in self.parameters {
            query.params.append(parameter.name.clone(), parameter.value.clone());
        }

        // Paging
        let rows = if is_admin { ADMIN_PAGE_SIZE } else { PAGE_SIZE };
        query.params.set("start", runtime.page.saturating_mul(rows).to_string());
        query.params.set("rows", rows.to_string());

        if !definition.boost_field.trim().is_empty() {
            query.params.append("bf", definition.boost_field.trim());
        }

        let previous_events = query_id == query_ids::EVENT
            && runtime.date_sort.as_deref() == Some(PREVIOUS_DATE_SORT);
        query.sorts = if previous_events {
            vec![SortSpec {
                field: "start_date".to_string(),
                direction: "desc".to_string(),
            }]
        } else {
            definition.sort_specs()
        };

        if query_ids::forces_and(query_id) {
            query.params.append("q.op", "AND");
        }

        let mut fields: Vec<String> = Vec::new();
        for field in DEFAULT_FIELDS
            .iter()
            .map(|f| f.to_string())
            .chain(definition.field_list.iter().map(|f| f.trim().to_string()))
        {
            if !field.is_empty() && !fields.contains(&field) {
                fields.push(field);
            }
        }
        query.fields = fields;

        // Runtime filter groups
        let renames = definition.renames();
        for (field, values) in group_filters(&runtime.filters, &renames) {
            let key = escape_html(&field);
            let joiner = if is_admin { " OR " } else { " AND " };
            let values: Vec<String> = values.iter().map(|v| escape_html_noquotes(v)).collect();
            let fq = if values.len() > 1 {
                format!("{}:({})", key, values.join(joiner))
            } else {
                format!("{}:{}", key, values[0])
            };
            query.add_filter_query(key, fq);
        }

        if !query_ids::is_open(query_id) {
            query.add_filter_query("bundle", format!("bundle:{}", bundle));
        }

        if previous_events {
            query.add_filter_query("event_sort", "end_date:[* TO NOW]");
        } else {
            let entries = definition
                .filter_query_list
                .iter()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty());
            for (index, filter) in entries.enumerate() {
                query.add_filter_query(format!("filters_{}", index), filter);
            }
        }

        // Query fields
        for field in definition.query_field_list.iter().map(|f| f.trim()) {
            if field.is_empty() {
                continue;
            }
            query.params.append("qf", field);
            if field == "content_language" {
                query
                    .params
                    .append("qf", format!("content_{}", runtime.language));
            }
        }

        // Language scoping
        let mut language_key = runtime.language.clone();
        if !is_admin {
            query.add_filter_query(
                "content_language",
                format!("content_language:({})", runtime.language),
            );
            query.add_filter_query(
                "Content_Language",
                format!("Content_Language:({})", runtime.language),
            );
        } else if runtime.language == MATCH_ALL {
            language_key = "content_language".to_string();
        }

        // Facets
        for field in ["Content_Language", "content_language"] {
            query.facets.push(FacetField {
                key: language_key.clone(),
                field: field.to_string(),
                min_count: 1,
                limit: LANGUAGE_FACET_LIMIT,
                local: FacetLocal::Key,
            });
        }
        for facet in self.facets {
            if definition.has_facet(&facet.field) {
                query.facets.push(FacetField {
                    key: facet.label.clone(),
                    field: facet.field.clone(),
                    min_count: facet.min_count,
                    limit: facet.limit,
                    local: FacetLocal::Key,
                });
            }
        }

        if let (Some(key), Some(extra)) = (
            query_ids::extra_filter_key(query_id),
            runtime.extra_filter_query.as_deref(),
        ) {
            let extra = strip_tags(extra);
            if !extra.trim().is_empty() {
                query.add_filter_query(key, extra.trim());
            }
        }

        Ok(query)
    }

    /// Compiles a typeahead request.
    pub fn build_suggest(&self, text: &str) -> CompiledRequest {
        let text = clean_text(text);
        let text = if text.is_empty() {
            MATCH_ALL.to_string()
        } else {
            text
        };
        let mut params = ParamMap::new();
        params
            .append("wt", "json")
            .append("omitHeader", self.settings.omit_header.to_string())
            .append("suggest", "true")
            .append("suggest.q", text);
        CompiledRequest::get(SUGGEST_HANDLER, params)
    }
}

/// Splits `field:value` tokens, applies renames in order, quotes values and groups
/// them by field in first-seen order. Blank tokens and tokens without a
/// colon are dropped.
fn group_filters(filters: &[String], renames: &[(String, String)]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for token in filters.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
        let Some((field, value)) = token.split_once(':') else {
            tracing::debug!(token, "dropping filter token without a field");
            continue;
        };
        // Renames apply in order, so `a:b` followed by `b:c` moves `a` to `c`.
        let field = renames
            .iter()
            .fold(field, |current, (from, to)| {
                if from == current {
                    to.as_str()
                } else {
                    current
                }
            });
        let value = format!("\"{}\"", value);

        match groups.iter_mut().find(|(f, _)| f == field) {
            Some((_, values)) => values.push(value),
            None => groups.push((field.to_string(), vec![value])),
        }
    }

    groups
}

//! The caller-facing search pipeline.
//!
//! [`SearchService::search`] runs resolve → build → dispatch → normalize
//! against one configuration snapshot and always produces a
//! [`CanonicalResponse`]. Pipeline failures become error-shaped responses:
//!
//! | Failure | Status | Message |
//! |---------|--------|---------|
//! | missing binding / connector / query | 400 | generic configuration message |
//! | empty text on `search` | 400 | missing query parameter |
//! | transport failure | 400 | "check connection details" |
//! | backend non-200 | passthrough | backend reason + `statusDescription` |
//! | undecodable 200 body | 412 | deserialize failure |
//!
//! Details that would name a record or expose a backend error are only
//! logged.

use std::sync::Arc;

use crate::backend::{create_client, ClientTarget};
use crate::error::SearchError;
use crate::models::{Operation, Settings};
use crate::normalize::{error_description, CanonicalResponse, ErrorResponse, ResponseContext, ResponseNormalizer};
use crate::query::{query_ids, RequestBuilder, RuntimeParams, MATCH_ALL};
use crate::resolver::QueryConfigResolver;
use crate::store::{ConfigSnapshot, ConfigStore};
use crate::translate::{StaticTranslations, TranslationService};

/// Query-string inputs of one search call.
#[derive(Debug, Clone, Default)]
pub struct SearchInput {
    pub q: Option<String>,
    /// Admin report free text; replaces `q` on `admin_search`.
    pub keys: Option<String>,
    pub filters: Vec<String>,
    pub page: Option<String>,
    pub language: Option<String>,
    pub content_language: Option<String>,
    pub fq: Option<String>,
    pub date_sort: Option<String>,
}

impl SearchInput {
    /// Builds the input from decoded query-string pairs. Repeated `f`
    /// parameters (also spelled `f[]` or `f[0]`) accumulate.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut input = SearchInput::default();
        for (name, value) in pairs {
            match name {
                "q" => input.q = Some(value.to_string()),
                "keys" => input.keys = Some(value.to_string()),
                "page" => input.page = Some(value.to_string()),
                "language" => input.language = Some(value.to_string()),
                "content_language" => input.content_language = Some(value.to_string()),
                "fq" => input.fq = Some(value.to_string()),
                "date_sort" => input.date_sort = Some(value.to_string()),
                n if n == "f" || (n.starts_with("f[") && n.ends_with(']')) => {
                    input.filters.push(value.to_string())
                }
                _ => {}
            }
        }
        input
    }

    pub fn with_query(q: impl Into<String>) -> Self {
        Self {
            q: Some(q.into()),
            ..Default::default()
        }
    }
}

/// Request language: `language` when it is a configured language, else the
/// default. `admin_search` covers every language (`*`) unless
/// `content_language` names a configured one.
pub fn resolve_language(settings: &Settings, query_id: &str, input: &SearchInput) -> String {
    if query_id == query_ids::ADMIN_SEARCH {
        return match input.content_language.as_deref() {
            Some(lang) if !lang.is_empty() && settings.is_language(lang) => lang.to_string(),
            _ => MATCH_ALL.to_string(),
        };
    }
    match input.language.as_deref() {
        Some(lang) if settings.is_language(lang) => lang.to_string(),
        _ => settings.default_language.clone(),
    }
}

pub struct SearchService {
    store: Arc<ConfigStore>,
    translations: Option<Arc<dyn TranslationService>>,
}

impl SearchService {
    /// Translations come from the `[translations]` table of the current
    /// snapshot.
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            translations: None,
        }
    }

    pub fn with_translations(store: Arc<ConfigStore>, translations: Arc<dyn TranslationService>) -> Self {
        Self {
            store,
            translations: Some(translations),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub async fn search(&self, query_id: &str, input: &SearchInput) -> CanonicalResponse {
        let snapshot = self.store.snapshot();
        match self.run(&snapshot, query_id, input).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    SearchError::Config(e) => {
                        tracing::warn!(query_id, error = %e, "query configuration not resolved")
                    }
                    SearchError::MissingQueryText => {
                        tracing::debug!(query_id, "search rejected without query text")
                    }
                    SearchError::Transport(_) => {}
                    SearchError::Normalization(e) => {
                        tracing::error!(query_id, error = %e, "failed to decode backend response")
                    }
                }
                CanonicalResponse::Error(ErrorResponse::new(err.status_code(), err.public_message()))
            }
        }
    }

    /// Typeahead lookup. Empty text yields `None` without any backend call.
    pub async fn suggest(&self, text: &str) -> Option<CanonicalResponse> {
        if text.trim().is_empty() {
            return None;
        }
        Some(
            self.search(query_ids::SUGGEST, &SearchInput::with_query(text))
                .await,
        )
    }

    async fn run(
        &self,
        snapshot: &ConfigSnapshot,
        query_id: &str,
        input: &SearchInput,
    ) -> Result<CanonicalResponse, SearchError> {
        let resolved = QueryConfigResolver::new(snapshot).resolve(query_id)?;
        let config = &snapshot.config;
        let settings = &config.settings;

        let fallback = StaticTranslations::borrowed(&config.translations);
        let translations: &dyn TranslationService = match &self.translations {
            Some(t) => t.as_ref(),
            None => &fallback,
        };
        let normalizer = ResponseNormalizer::new(translations, settings.debug_mode);
        let builder = RequestBuilder::from_snapshot(snapshot);

        if query_id == query_ids::SUGGEST {
            let request = builder.build_suggest(input.q.as_deref().unwrap_or(""));
            let client = create_client(resolved.connector, ClientTarget::Query)?;
            let uri = client.uri(&request);
            let raw = client
                .execute(&request, Operation::Query)
                .await
                .inspect_err(|e| tracing::error!(query_id, uri = %uri, error = %e, "suggestion request failed"))?;
            return normalizer.normalize_suggestion(&raw, &uri);
        }

        let language = resolve_language(settings, query_id, input);
        let text = if query_id == query_ids::ADMIN_SEARCH {
            input.keys.clone()
        } else {
            input.q.clone()
        };
        let runtime = RuntimeParams {
            text: text.unwrap_or_default(),
            filters: input.filters.clone(),
            language: language.clone(),
            page: RuntimeParams::parse_page(input.page.as_deref()),
            date_sort: input.date_sort.clone(),
            extra_filter_query: input.fq.clone(),
        };

        let request = builder.build(query_id, resolved.definition, &runtime)?;
        let client = create_client(resolved.connector, ClientTarget::Query)?;
        let uri = client.uri(&request);

        tracing::info!(
            query_id,
            connector = %resolved.connector.id,
            backend = %client.kind(),
            language = %language,
            "executing search"
        );

        let raw = client
            .execute(&request, Operation::Query)
            .await
            .inspect_err(|e| tracing::error!(query_id, uri = %uri, error = %e, "search request failed"))?;

        if !raw.is_ok() {
            tracing::error!(
                query_id,
                status = raw.status,
                message = %raw.status_message,
                description = %error_description(&raw.body),
                query = %uri,
                "backend returned an error"
            );
        }

        normalizer.normalize(
            &raw,
            &ResponseContext {
                definition: resolved.definition,
                facets: &config.facets,
                language: &language,
                default_language: &settings.default_language,
                backend: client.kind(),
                debug_query: &uri,
            },
        )
    }
}

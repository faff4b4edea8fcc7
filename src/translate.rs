//! Facet term translation.
//!
//! Facet values returned by the backend are term ids; [`TranslationService`]
//! maps them onto display labels. The crate ships [`StaticTranslations`],
//! backed by the `[translations]` table of the configuration file:
//!
//! ```toml
//! [translations.12]
//! en = "News"
//! fr = "Actualités"
//! ```

use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Term id → language → label.
pub type TermLabels = BTreeMap<String, BTreeMap<String, String>>;

/// A display label for one facet term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedTerm {
    pub id: String,
    pub name: String,
    /// Language the label is in: the requested one, or the default.
    pub language: String,
}

pub trait TranslationService: Send + Sync {
    /// Labels for `term_ids`. Unknown ids are skipped. Each label is in
    /// `language` when a translation exists, else in `default_language`.
    fn translate(&self, term_ids: &[String], language: &str, default_language: &str)
        -> Vec<TranslatedTerm>;
}

/// Translations loaded from configuration, either owned or borrowed from a
/// config snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticTranslations<'a> {
    terms: Cow<'a, TermLabels>,
}

impl StaticTranslations<'static> {
    pub fn new(terms: TermLabels) -> Self {
        Self {
            terms: Cow::Owned(terms),
        }
    }
}

impl<'a> StaticTranslations<'a> {
    pub fn borrowed(terms: &'a TermLabels) -> Self {
        Self {
            terms: Cow::Borrowed(terms),
        }
    }
}

impl TranslationService for StaticTranslations<'_> {
    fn translate(
        &self,
        term_ids: &[String],
        language: &str,
        default_language: &str,
    ) -> Vec<TranslatedTerm> {
        let mut out: Vec<TranslatedTerm> = Vec::new();
        for id in term_ids {
            if out.iter().any(|t| &t.id == id) {
                continue;
            }
            let Some(labels) = self.terms.get(id) else {
                continue;
            };
            let resolved = labels
                .get(language)
                .map(|name| (name, language))
                .or_else(|| labels.get(default_language).map(|name| (name, default_language)));
            if let Some((name, used)) = resolved {
                out.push(TranslatedTerm {
                    id: id.clone(),
                    name: name.clone(),
                    language: used.to_string(),
                });
            }
        }
        out
    }
}

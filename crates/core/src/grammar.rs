//! Grammar-checking service boundary.
//!
//! The concrete implementation talks to a LanguageTool server over HTTP.
//! The whole service is optional: when it is not configured, or a call
//! fails, dependent diagnostics are skipped rather than failing the request.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// One match reported by the grammar checker.
#[derive(Debug, Clone)]
pub struct GrammarMatch {
    /// Category identifier, e.g. "GRAMMAR" or "TYPOS".
    pub category: String,
    pub message: String,
    pub context: String,
    pub replacements: Vec<String>,
}

/// Categories the auditor counts against the grammar-error budget.
pub fn is_counted_category(category: &str) -> bool {
    matches!(category, "GRAMMAR" | "TYPOS")
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GrammarService: Send + Sync {
    async fn check(&self, text: &str) -> Result<Vec<GrammarMatch>>;
}

/// `GrammarService` backed by a LanguageTool server's `/v2/check` endpoint.
pub struct LanguageToolClient {
    http: reqwest::Client,
    base_url: String,
}

impl LanguageToolClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct LtResponse {
    #[serde(default)]
    matches: Vec<LtMatch>,
}

#[derive(Deserialize)]
struct LtMatch {
    message: String,
    rule: LtRule,
    context: LtContext,
    #[serde(default)]
    replacements: Vec<LtReplacement>,
}

#[derive(Deserialize)]
struct LtRule {
    category: LtCategory,
}

#[derive(Deserialize)]
struct LtCategory {
    id: String,
}

#[derive(Deserialize)]
struct LtContext {
    text: String,
}

#[derive(Deserialize)]
struct LtReplacement {
    value: String,
}

#[async_trait]
impl GrammarService for LanguageToolClient {
    async fn check(&self, text: &str) -> Result<Vec<GrammarMatch>> {
        let url = format!("{}/v2/check", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[("text", text), ("language", "en-US")])
            .send()
            .await
            .context("grammar check request failed")?
            .error_for_status()
            .context("grammar check returned an error status")?;

        let body: LtResponse = response
            .json()
            .await
            .context("grammar check returned unparseable JSON")?;

        Ok(body
            .matches
            .into_iter()
            .map(|m| GrammarMatch {
                category: m.rule.category.id,
                message: m.message,
                context: m.context.text,
                replacements: m.replacements.into_iter().take(2).map(|r| r.value).collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_grammar_and_typo_categories_count() {
        assert!(is_counted_category("GRAMMAR"));
        assert!(is_counted_category("TYPOS"));
        assert!(!is_counted_category("STYLE"));
        assert!(!is_counted_category("PUNCTUATION"));
        assert!(!is_counted_category("grammar"));
    }

    #[test]
    fn languagetool_response_parses() {
        let raw = r#"{
            "matches": [
                {
                    "message": "Possible agreement error",
                    "rule": {"category": {"id": "GRAMMAR"}},
                    "context": {"text": "He go to school"},
                    "replacements": [{"value": "goes"}, {"value": "went"}, {"value": "gone"}]
                }
            ]
        }"#;
        let parsed: LtResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.matches.len(), 1);
        assert_eq!(parsed.matches[0].rule.category.id, "GRAMMAR");
        assert_eq!(parsed.matches[0].replacements.len(), 3);
    }

    #[test]
    fn languagetool_response_tolerates_missing_fields() {
        let parsed: LtResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.matches.is_empty());
    }
}
